use sha2::{Digest, Sha256};

const ID_LEN: usize = 16;

/// Hashes `parts` into a short, stable hex identifier.
///
/// Parts are length-prefixed before hashing so that `["ab", "c"]` and
/// `["a", "bc"]` never collide. The same parts always produce the same id,
/// which lets records be re-emitted on every sync without duplicating them
/// downstream.
pub fn derive_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    let hex = format!("{:x}", hasher.finalize());
    hex[..ID_LEN].to_string()
}
