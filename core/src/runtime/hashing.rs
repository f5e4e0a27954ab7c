//! SipHash-2-4 plumbing shared by every hash metamethod. The key is sampled
//! once per process from the OS RNG; after that it is read-only.

use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use siphasher::sip::SipHasher24;
use std::hash::Hasher;

static HASH_KEY: Lazy<(u64, u64)> = Lazy::new(|| {
    let mut key = [0u8; 16];
    OsRng.fill_bytes(&mut key);
    (
        u64::from_le_bytes(key[..8].try_into().unwrap()),
        u64::from_le_bytes(key[8..].try_into().unwrap()),
    )
});

/// A new SipHash-2-4 hasher seeded with the process-wide key.
pub fn hasher() -> SipHasher24 {
    let (k0, k1) = *HASH_KEY;
    SipHasher24::new_with_keys(k0, k1)
}

/// Hash a byte buffer with the process-wide key.
pub fn siphash(bytes: &[u8]) -> u64 {
    let mut h = hasher();
    h.write(bytes);
    h.finish()
}

/// Hash a sequence of 64-bit words with the process-wide key.
pub fn siphash_words(words: &[u64]) -> u64 {
    let mut h = hasher();
    for w in words {
        h.write_u64(*w);
    }
    h.finish()
}

/// Accumulates 32-bit grapheme IDs into 64-bit SipHash words, two at a time.
/// Used by the Text hash so that the same content hashes identically no
/// matter how it is split across rope nodes.
pub struct IdChunker {
    hasher: SipHasher24,
    pending: Option<i32>,
}

impl IdChunker {
    pub fn new() -> Self {
        Self { hasher: hasher(), pending: None }
    }

    pub fn push(&mut self, id: i32) {
        match self.pending.take() {
            Some(first) => {
                let word =
                    ((first as u32 as u64) << 32) | (id as u32 as u64);
                self.hasher.write_u64(word);
            }
            None => self.pending = Some(id),
        }
    }

    pub fn finish(mut self, length: u64) -> u64 {
        let last = self.pending.take().map(|id| id as u32 as u64).unwrap_or(0);
        self.hasher.write_u64(last);
        self.hasher.write_u64(length);
        self.hasher.finish()
    }
}

impl Default for IdChunker {
    fn default() -> Self {
        Self::new()
    }
}
