use crate::error::Result;
use sha2::{Digest, Sha256};

/// SHA-256 fed chunk by chunk while bytes stream past.
#[derive(Default)]
pub struct Sha256Stream(Sha256);

impl Sha256Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    /// Lowercase hex digest.
    pub fn finish(self) -> String {
        hex::encode(self.0.finalize())
    }
}

/// Compares a computed digest with a configured one, ignoring case.
///
/// A configured value that is not hex at all is an error rather than a mismatch.
pub fn digest_matches(actual_hex: &str, expected_hex: &str) -> Result<bool> {
    hex::decode(expected_hex.trim())?;
    Ok(actual_hex.eq_ignore_ascii_case(expected_hex.trim()))
}
