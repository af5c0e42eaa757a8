use std::fmt::Write as _;

use sha1::{Digest, Sha1};

/// SHA-1 over a sequence of byte chunks, rendered as upper-case hex.
#[derive(Clone, Default)]
pub struct ContentHash {
    digest: Sha1,
}

impl ContentHash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    pub fn finish(self) -> String {
        to_hex(&self.digest.finalize())
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut hex, byte| {
            let _ = write!(hex, "{byte:02X}");
            hex
        })
}
