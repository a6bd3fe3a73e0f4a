//! CRC-64 content hashing of creation descriptors.

use std::hash::{Hash, Hasher};

use crc::{CRC_64_ECMA_182, Crc};

static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// CRC-64 of a key's canonical [`Hash`] byte stream.
///
/// Every field a descriptor feeds to its `Hash` impl takes part, so two
/// descriptors differing in any such field hash differently (barring CRC
/// collisions, see [`SharedHandleCache`](super::SharedHandleCache)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(u64);

impl ContentHash {
    pub fn from_key<K: Hash + ?Sized>(key: &K) -> Self {
        let mut hasher = Crc64Hasher::default();
        key.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Collects the hashed byte stream and checksums it on `finish`.
#[derive(Default)]
struct Crc64Hasher {
    bytes: Vec<u8>,
}

impl Hasher for Crc64Hasher {
    fn write(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn finish(&self) -> u64 {
        CRC64.checksum(&self.bytes)
    }
}
