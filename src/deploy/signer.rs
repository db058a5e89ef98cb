//! Request signatures: `md5(secret ∥ code ∥ timestamp)` as lowercase hex.

use md5::{Digest, Md5};

/// Length of a hex-encoded 128-bit digest.
pub const SIGNATURE_HEX_LEN: usize = 32;

/// Compute the signature for a deploy of `code` at `timestamp`.
///
/// `timestamp` is the exact decimal string the caller sends; the signature
/// covers its textual form, not its numeric value.
pub fn sign(secret: &str, code: &str, timestamp: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(secret.as_bytes());
    hasher.update(code.as_bytes());
    hasher.update(timestamp.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a caller-supplied signature. Hex case is ignored.
pub fn verify(secret: &str, code: &str, timestamp: &str, supplied: &str) -> bool {
    if supplied.len() != SIGNATURE_HEX_LEN {
        return false;
    }
    let expected = sign(secret, code, timestamp);
    expected
        .bytes()
        .zip(supplied.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b.to_ascii_lowercase()))
        == 0
}
