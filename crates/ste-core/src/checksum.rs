//! Chunk content tags.
//!
//! A tag is the first 16 bytes of the SHA-256 of a chunk's bytes. It is stored
//! in the plan next to the chunk status so a later pass can verify content.

use sha2::{Digest, Sha256};
use std::fmt;

/// Size of a content tag in bytes.
pub const TAG_LEN: usize = 16;

/// Fixed-size content-verification tag of one chunk.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentTag(pub [u8; TAG_LEN]);

impl ContentTag {
    /// Tag of a chunk that has not produced data (not started or failed).
    pub const EMPTY: ContentTag = ContentTag([0u8; TAG_LEN]);

    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&digest[..TAG_LEN]);
        ContentTag(tag)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentTag({})", self.to_hex())
    }
}
