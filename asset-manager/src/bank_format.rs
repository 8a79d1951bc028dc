//! On-disk bank layout (all integers little-endian):
//!
//! ```text
//! [sound_count: u64]
//! sound_count x { [name_length: u64][name bytes][channels: u16][bits_per_sample: u16][sample_rate: u32][data_offset: u64] }
//! payload records at data_offset: [compressed_size: u64][compressed bytes]
//! ```

use crate::codec::{Compressor, Stored};
use crate::handle::{normalize_sound_name, SoundHandle};
use crate::util::{
    truncated, AssetError, MAX_COMPRESSED_PAYLOAD_BYTES, MAX_SOUNDS_PER_BANK, MAX_SOUND_NAME_LEN,
};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const DESCRIPTOR_RECORD_LEN: usize = 16;

/// PCM layout of a sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
}

impl PcmFormat {
    pub fn new(channels: u16, bits_per_sample: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            bits_per_sample,
            sample_rate,
        }
    }

    /// Only 8-bit unsigned and 16-bit signed PCM with 1..=8 channels are mixable.
    pub fn validate(&self) -> Result<(), AssetError> {
        let bits_ok = self.bits_per_sample == 8 || self.bits_per_sample == 16;
        if !bits_ok || self.channels == 0 || self.channels > 8 {
            return Err(AssetError::UnsupportedFormat {
                channels: self.channels,
                bits_per_sample: self.bits_per_sample,
            });
        }
        if self.sample_rate == 0 {
            return Err(AssetError::Malformed("sample rate of zero".into()));
        }
        Ok(())
    }

    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

/// Fixed-size metadata record for one sound. Immutable once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundDescriptor {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub data_offset: u64,
}

impl SoundDescriptor {
    pub fn new(format: PcmFormat, data_offset: u64) -> Self {
        Self {
            channels: format.channels,
            bits_per_sample: format.bits_per_sample,
            sample_rate: format.sample_rate,
            data_offset,
        }
    }

    pub fn format(&self) -> PcmFormat {
        PcmFormat::new(self.channels, self.bits_per_sample, self.sample_rate)
    }

    pub fn frame_bytes(&self) -> usize {
        self.format().frame_bytes()
    }

    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_RECORD_LEN] {
        let mut out = [0u8; DESCRIPTOR_RECORD_LEN];
        out[0..2].copy_from_slice(&self.channels.to_le_bytes());
        out[2..4].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        out[4..8].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[8..16].copy_from_slice(&self.data_offset.to_le_bytes());
        out
    }

    pub fn from_bytes(b: &[u8; DESCRIPTOR_RECORD_LEN]) -> Self {
        Self {
            channels: u16::from_le_bytes([b[0], b[1]]),
            bits_per_sample: u16::from_le_bytes([b[2], b[3]]),
            sample_rate: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            data_offset: u64::from_le_bytes([b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]]),
        }
    }
}

/// One parsed index record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Name with the directory prefix stripped.
    pub name: String,
    pub handle: SoundHandle,
    pub descriptor: SoundDescriptor,
}

fn read_u64<R: Read>(reader: &mut R, what: &str) -> Result<u64, AssetError> {
    let mut b = [0u8; 8];
    reader.read_exact(&mut b).map_err(truncated(what))?;
    Ok(u64::from_le_bytes(b))
}

/// Parse the index at the start of a bank. Payload bytes are not touched.
/// `file_len` bounds every descriptor's payload offset.
pub fn read_index<R: Read>(reader: &mut R, file_len: u64) -> Result<Vec<IndexEntry>, AssetError> {
    let count = read_u64(reader, "sound count")?;
    if count > MAX_SOUNDS_PER_BANK {
        return Err(AssetError::ResourceLimit(format!(
            "bank declares {} sounds (max {})",
            count, MAX_SOUNDS_PER_BANK
        )));
    }

    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count {
        let name_len = read_u64(reader, "name length")?;
        if name_len == 0 || name_len > MAX_SOUND_NAME_LEN {
            return Err(AssetError::Malformed(format!(
                "sound #{} has invalid name length {}",
                i, name_len
            )));
        }
        let mut name_bytes = vec![0u8; name_len as usize];
        reader
            .read_exact(&mut name_bytes)
            .map_err(truncated("sound name"))?;
        let raw_name = String::from_utf8(name_bytes)
            .map_err(|_| AssetError::Malformed(format!("sound #{} name is not UTF-8", i)))?;
        let name = normalize_sound_name(&raw_name).to_string();
        if name.is_empty() {
            return Err(AssetError::Malformed(format!(
                "sound #{} name '{}' has no file component",
                i, raw_name
            )));
        }

        let mut record = [0u8; DESCRIPTOR_RECORD_LEN];
        reader
            .read_exact(&mut record)
            .map_err(truncated("sound descriptor"))?;
        let descriptor = SoundDescriptor::from_bytes(&record);
        descriptor.format().validate()?;
        if descriptor.data_offset.saturating_add(8) > file_len {
            return Err(AssetError::Malformed(format!(
                "payload of '{}' at offset {} is outside the file",
                name, descriptor.data_offset
            )));
        }

        entries.push(IndexEntry {
            handle: SoundHandle::from_name(&name),
            name,
            descriptor,
        });
    }
    Ok(entries)
}

/// Read the compressed payload record a descriptor points at.
pub fn read_payload_record<R: Read + Seek>(
    reader: &mut R,
    descriptor: &SoundDescriptor,
    file_len: u64,
) -> Result<Vec<u8>, AssetError> {
    reader.seek(SeekFrom::Start(descriptor.data_offset))?;
    let size = read_u64(reader, "payload size")?;
    if size > MAX_COMPRESSED_PAYLOAD_BYTES {
        return Err(AssetError::ResourceLimit(format!(
            "compressed payload of {} bytes",
            size
        )));
    }
    let end = descriptor
        .data_offset
        .saturating_add(8)
        .saturating_add(size);
    if end > file_len {
        return Err(AssetError::Malformed(format!(
            "payload at offset {} runs past end of file",
            descriptor.data_offset
        )));
    }
    let mut buf = vec![0u8; size as usize];
    reader
        .read_exact(&mut buf)
        .map_err(truncated("payload bytes"))?;
    Ok(buf)
}

struct PendingSound {
    name: String,
    format: PcmFormat,
    pcm: Vec<u8>,
}

/// Builds bank files. The index is written first, payload records follow in
/// insertion order.
pub struct BankWriter<C: Compressor = Stored> {
    sounds: Vec<PendingSound>,
    compressor: C,
}

impl BankWriter<Stored> {
    pub fn new() -> Self {
        Self::with_compressor(Stored)
    }
}

impl Default for BankWriter<Stored> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Compressor> BankWriter<C> {
    pub fn with_compressor(compressor: C) -> Self {
        Self {
            sounds: Vec::new(),
            compressor,
        }
    }

    /// Queue a sound. `pcm` is interleaved raw PCM in `format`.
    pub fn add_sound(&mut self, name: impl Into<String>, format: PcmFormat, pcm: Vec<u8>) -> &mut Self {
        self.sounds.push(PendingSound {
            name: name.into(),
            format,
            pcm,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, AssetError> {
        let index_len: u64 = 8 + self
            .sounds
            .iter()
            .map(|s| 8 + s.name.len() as u64 + DESCRIPTOR_RECORD_LEN as u64)
            .sum::<u64>();

        let mut payloads = Vec::with_capacity(self.sounds.len());
        for s in &self.sounds {
            s.format.validate()?;
            if s.name.is_empty() || s.name.len() as u64 > MAX_SOUND_NAME_LEN {
                return Err(AssetError::Malformed(format!("invalid sound name '{}'", s.name)));
            }
            payloads.push(self.compressor.compress(&s.pcm)?);
        }

        let mut out = Vec::new();
        out.extend_from_slice(&(self.sounds.len() as u64).to_le_bytes());
        let mut offset = index_len;
        for (s, payload) in self.sounds.iter().zip(&payloads) {
            out.extend_from_slice(&(s.name.len() as u64).to_le_bytes());
            out.extend_from_slice(s.name.as_bytes());
            out.extend_from_slice(&SoundDescriptor::new(s.format, offset).to_bytes());
            offset += 8 + payload.len() as u64;
        }
        for payload in &payloads {
            out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
            out.extend_from_slice(payload);
        }
        Ok(out)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), AssetError> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<(), AssetError> {
        let mut f = std::fs::File::create(path)?;
        self.write_to(&mut f)?;
        f.sync_all()?;
        Ok(())
    }
}
