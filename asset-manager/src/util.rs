use thiserror::Error;

/// Constants & small helpers

// safety caps applied while parsing a bank index
pub const MAX_SOUNDS_PER_BANK: u64 = 65_536;
pub const MAX_SOUND_NAME_LEN: u64 = 1024;
// decompressed and compressed payloads are capped at 256 MB each
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024 * 1024;
pub const MAX_COMPRESSED_PAYLOAD_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed bank: {0}")]
    Malformed(String),
    #[error("unsupported sound format: {channels} channel(s), {bits_per_sample} bits per sample")]
    UnsupportedFormat { channels: u16, bits_per_sample: u16 },
    #[error("resource limits exceeded: {0}")]
    ResourceLimit(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Map a short read to `Malformed` so truncated banks are reported as such.
pub(crate) fn truncated(what: &str) -> impl FnOnce(std::io::Error) -> AssetError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            AssetError::Malformed(format!("truncated while reading {}", what))
        } else {
            AssetError::Io(e)
        }
    }
}
