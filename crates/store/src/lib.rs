pub mod errors;
pub mod pipe;
pub mod state;

pub use errors::StoreError;
pub use pipe::{JsonLinesPipe, MemoryPipe, Pipe};
pub use state::{get_json, set_json, FileState, MemoryState, StateStore};
