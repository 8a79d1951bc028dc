//! Shared fixtures for the cross-crate scenario tests under `tests/`.

use asset_manager::{BankWriter, PcmFormat};
use std::path::Path;

/// Signed 16-bit samples as little-endian bank PCM.
pub fn pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Write a bank of 16-bit, 44.1 kHz sounds given as `(name, channels, samples)`.
pub fn write_bank16(path: &Path, sounds: &[(&str, u16, &[i16])]) {
    let mut writer = BankWriter::new();
    for (name, channels, samples) in sounds {
        writer.add_sound(*name, PcmFormat::new(*channels, 16, 44_100), pcm16(samples));
    }
    if let Err(e) = writer.write_to_path(path) {
        panic!("writing test bank {}: {}", path.display(), e);
    }
}
