//! Content-derived identifiers for sounds and banks.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Identifies a sound by the hash of its normalized name. Never recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundHandle(pub u64);

/// Identifies an open bank by the hash of the path it was registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BankHandle(pub u64);

impl SoundHandle {
    /// Hash a sound name. Any directory prefix is stripped first, so
    /// `sfx/ui/click` and `click` resolve to the same handle.
    pub fn from_name(name: &str) -> Self {
        SoundHandle(digest_u64(normalize_sound_name(name).as_bytes()))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl BankHandle {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        BankHandle(digest_u64(path.as_ref().to_string_lossy().as_bytes()))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SoundHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sound:{:016x}", self.0)
    }
}

impl fmt::Display for BankHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bank:{:016x}", self.0)
    }
}

/// Strip everything up to the last `/` or `\`.
pub fn normalize_sound_name(name: &str) -> &str {
    name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name)
}

fn digest_u64(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    let mut first = [0u8; 8];
    first.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(first)
}
