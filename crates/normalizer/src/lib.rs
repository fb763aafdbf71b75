pub mod ids;
pub mod markup;
pub mod models;
pub mod payloads;
pub mod transform;

pub use models::{Record, RecordKind};
pub use payloads::PageEnvelope;
pub use transform::{
    convert_comment, convert_commit, convert_pull_request, convert_repo, convert_user,
    deactivate_review_request, extract_reviews, ConvertContext, ReviewExtraction,
};
