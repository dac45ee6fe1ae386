use md5::{Digest, Md5};

use crate::db::error::{DataError, DataResult};

/// Gravatar hash of an email address: trimmed, lower-cased, MD5 over the
/// UTF-8 bytes, lowercase hex. A blank address is rejected instead of
/// silently hashing the empty string.
pub fn gravatar_hash(email: &str) -> DataResult<String> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(DataError::MissingField("email"));
    }

    let mut hasher = Md5::new();
    hasher.update(normalized.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
