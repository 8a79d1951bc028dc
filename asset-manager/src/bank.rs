use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bank_format::{read_index, read_payload_record, SoundDescriptor};
use crate::codec::Decompressor;
use crate::handle::{BankHandle, SoundHandle};
use crate::util::{AssetError, MAX_PAYLOAD_BYTES};

/// Decompressed PCM bytes. Shared read-only with the mixer once resident.
pub type SoundPayload = Arc<[u8]>;

#[derive(Debug, Clone)]
pub struct SoundEntry {
    pub name: String,
    pub descriptor: SoundDescriptor,
    pub payload: Option<SoundPayload>,
}

/// An open bank file and the sounds its index declares.
/// Dropping the bank closes the file and frees every payload it owns.
pub struct SoundBank {
    path: PathBuf,
    handle: BankHandle,
    file: File,
    file_len: u64,
    sounds: HashMap<SoundHandle, SoundEntry>,
}

impl SoundBank {
    /// Open a bank and parse its index. Payloads stay on disk until `load_payload`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let entries = read_index(&mut BufReader::new(&file), file_len)?;
        let mut sounds = HashMap::with_capacity(entries.len());
        for ent in entries {
            // a duplicate name later in the same index replaces the earlier one
            sounds.insert(
                ent.handle,
                SoundEntry {
                    name: ent.name,
                    descriptor: ent.descriptor,
                    payload: None,
                },
            );
        }

        Ok(SoundBank {
            path: path.to_path_buf(),
            handle: BankHandle::from_path(path),
            file,
            file_len,
            sounds,
        })
    }

    pub fn handle(&self) -> BankHandle {
        self.handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    pub fn contains(&self, sound: SoundHandle) -> bool {
        self.sounds.contains_key(&sound)
    }

    pub fn sound_handles(&self) -> impl Iterator<Item = SoundHandle> + '_ {
        self.sounds.keys().copied()
    }

    pub fn entry(&self, sound: SoundHandle) -> Option<&SoundEntry> {
        self.sounds.get(&sound)
    }

    pub fn descriptor(&self, sound: SoundHandle) -> Option<SoundDescriptor> {
        self.sounds.get(&sound).map(|e| e.descriptor)
    }

    pub fn payload(&self, sound: SoundHandle) -> Option<SoundPayload> {
        self.sounds.get(&sound).and_then(|e| e.payload.clone())
    }

    /// Total bytes of decompressed payloads currently held.
    pub fn resident_bytes(&self) -> usize {
        self.sounds
            .values()
            .filter_map(|e| e.payload.as_ref())
            .map(|p| p.len())
            .sum()
    }

    /// Read and decompress a sound's payload if it is not resident yet.
    /// Returns `Ok(None)` when the bank does not contain the sound.
    pub fn load_payload(
        &mut self,
        sound: SoundHandle,
        codec: &dyn Decompressor,
    ) -> Result<Option<SoundPayload>, AssetError> {
        let file_len = self.file_len;
        let Some(entry) = self.sounds.get_mut(&sound) else {
            return Ok(None);
        };
        if let Some(p) = &entry.payload {
            return Ok(Some(p.clone()));
        }

        let mut reader = &self.file;
        let compressed = read_payload_record(&mut reader, &entry.descriptor, file_len)?;
        let mut pcm = codec.decompress(&compressed, MAX_PAYLOAD_BYTES)?;

        // trailing partial frame is unusable
        let frame_bytes = entry.descriptor.frame_bytes();
        pcm.truncate(pcm.len() - pcm.len() % frame_bytes);

        let payload: SoundPayload = Arc::from(pcm);
        entry.payload = Some(payload.clone());
        Ok(Some(payload))
    }
}

impl std::fmt::Debug for SoundBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundBank")
            .field("path", &self.path)
            .field("handle", &self.handle)
            .field("sounds", &self.sounds.len())
            .finish()
    }
}
