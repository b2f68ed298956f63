//! Content-addressed digest for preview deduplication.

use sha2::{Digest, Sha256};

/// Stable digest of the display-identity of a preview.
///
/// Absent fields hash differently from empty strings so `(url, None, None)` and
/// `(url, Some(""), Some(""))` do not collide.
pub fn content_hash(url: &str, title: Option<&str>, description: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    for field in [title, description] {
        hasher.update(b"\n");
        match field {
            Some(value) => {
                hasher.update(b"+");
                hasher.update(value.as_bytes());
            }
            None => hasher.update(b"-"),
        }
    }
    hex::encode(hasher.finalize())
}
