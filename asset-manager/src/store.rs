//! Sound bank store: owns every registered bank and publishes an immutable
//! table of resident sounds for the real-time side.
//!
//! Control-thread API: `insert_bank`, `remove_bank`, `lookup_*`, `ensure_loaded`, `publish`.
//! Real-time API: `SoundTableReader::load`, which is lock-free and does not allocate.

use arc_swap::{ArcSwap, Guard};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bank::{SoundBank, SoundPayload};
use crate::bank_format::SoundDescriptor;
use crate::codec::{Decompressor, Stored};
use crate::handle::{BankHandle, SoundHandle};

/// A sound that is ready to mix.
#[derive(Debug, Clone)]
pub struct ResidentSound {
    pub descriptor: SoundDescriptor,
    pub payload: SoundPayload,
}

/// Immutable snapshot of resident sounds.
#[derive(Debug, Default)]
pub struct SoundTable {
    sounds: HashMap<SoundHandle, ResidentSound>,
}

impl SoundTable {
    pub fn get(&self, sound: SoundHandle) -> Option<&ResidentSound> {
        self.sounds.get(&sound)
    }

    pub fn contains(&self, sound: SoundHandle) -> bool {
        self.sounds.contains_key(&sound)
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }
}

/// Cloneable read side of the published table.
#[derive(Clone)]
pub struct SoundTableReader {
    current: Arc<ArcSwap<SoundTable>>,
}

impl SoundTableReader {
    pub fn load(&self) -> Guard<Arc<SoundTable>> {
        self.current.load()
    }
}

pub struct SoundBankStore {
    banks: HashMap<BankHandle, SoundBank>,
    // oldest first; used to fall back when the newest owner of a sound goes away
    registration_order: Vec<BankHandle>,
    owners: HashMap<SoundHandle, BankHandle>,
    codec: Box<dyn Decompressor>,
    current: Arc<ArcSwap<SoundTable>>,
    // replaced tables are dropped here, never on the reader side
    retired: Vec<Arc<SoundTable>>,
    dirty: bool,
}

impl Default for SoundBankStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundBankStore {
    pub fn new() -> Self {
        Self::with_codec(Box::new(Stored))
    }

    pub fn with_codec(codec: Box<dyn Decompressor>) -> Self {
        Self {
            banks: HashMap::new(),
            registration_order: Vec::new(),
            owners: HashMap::new(),
            codec,
            current: Arc::new(ArcSwap::from_pointee(SoundTable::default())),
            retired: Vec::new(),
            dirty: false,
        }
    }

    pub fn reader(&self) -> SoundTableReader {
        SoundTableReader {
            current: self.current.clone(),
        }
    }

    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    /// Number of distinct sounds resolvable across all banks.
    pub fn sound_count(&self) -> usize {
        self.owners.len()
    }

    pub fn contains_bank(&self, bank: BankHandle) -> bool {
        self.banks.contains_key(&bank)
    }

    pub fn bank(&self, bank: BankHandle) -> Option<&SoundBank> {
        self.banks.get(&bank)
    }

    pub fn owner_of(&self, sound: SoundHandle) -> Option<BankHandle> {
        self.owners.get(&sound).copied()
    }

    /// Add a bank. Its sounds take precedence over any earlier bank declaring
    /// the same names. Returns the bank previously registered under the same handle.
    pub fn insert_bank(&mut self, bank: SoundBank) -> Option<SoundBank> {
        let handle = bank.handle();
        let replaced = self.remove_bank(handle);
        for sound in bank.sound_handles() {
            if let Some(prev) = self.owners.insert(sound, handle) {
                debug!(%sound, from = %prev, to = %handle, "sound now provided by newer bank");
            }
        }
        self.registration_order.push(handle);
        self.banks.insert(handle, bank);
        self.dirty = true;
        replaced
    }

    /// Close a bank and discard its descriptors and payloads.
    pub fn remove_bank(&mut self, handle: BankHandle) -> Option<SoundBank> {
        let bank = self.banks.remove(&handle)?;
        self.registration_order.retain(|h| *h != handle);
        for sound in bank.sound_handles() {
            if self.owners.get(&sound) != Some(&handle) {
                continue;
            }
            let fallback = self
                .registration_order
                .iter()
                .rev()
                .copied()
                .find(|h| self.banks.get(h).is_some_and(|b| b.contains(sound)));
            match fallback {
                Some(h) => {
                    self.owners.insert(sound, h);
                }
                None => {
                    self.owners.remove(&sound);
                }
            }
        }
        self.dirty = true;
        Some(bank)
    }

    pub fn lookup_descriptor(&self, sound: SoundHandle) -> Option<SoundDescriptor> {
        let owner = self.owners.get(&sound)?;
        self.banks.get(owner)?.descriptor(sound)
    }

    /// Returns `None` until `ensure_loaded` has made the payload resident.
    pub fn lookup_payload(&self, sound: SoundHandle) -> Option<SoundPayload> {
        let owner = self.owners.get(&sound)?;
        self.banks.get(owner)?.payload(sound)
    }

    /// Decompress a sound's payload from its bank if needed. Returns whether
    /// the sound is resident afterwards. Missing sounds and unreadable
    /// payloads both yield `false`.
    pub fn ensure_loaded(&mut self, sound: SoundHandle) -> bool {
        let Some(owner) = self.owners.get(&sound).copied() else {
            return false;
        };
        let Some(bank) = self.banks.get_mut(&owner) else {
            return false;
        };
        if bank.payload(sound).is_some() {
            return true;
        }
        match bank.load_payload(sound, self.codec.as_ref()) {
            Ok(Some(payload)) => {
                debug!(%sound, bank = %owner, bytes = payload.len(), "payload resident");
                self.dirty = true;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(%sound, bank = %owner, error = %e, "failed to load payload");
                false
            }
        }
    }

    /// Swap in a new table if anything changed since the last publish, and
    /// free retired tables no reader still holds. Returns true if a new table
    /// was published.
    pub fn publish(&mut self) -> bool {
        let published = if self.dirty {
            let mut sounds = HashMap::with_capacity(self.owners.len());
            for (sound, owner) in &self.owners {
                let Some(bank) = self.banks.get(owner) else {
                    continue;
                };
                if let Some(entry) = bank.entry(*sound) {
                    if let Some(payload) = &entry.payload {
                        sounds.insert(
                            *sound,
                            ResidentSound {
                                descriptor: entry.descriptor,
                                payload: payload.clone(),
                            },
                        );
                    }
                }
            }
            let old = self.current.swap(Arc::new(SoundTable { sounds }));
            self.retired.push(old);
            self.dirty = false;
            true
        } else {
            false
        };
        self.collect_retired();
        published
    }

    fn collect_retired(&mut self) {
        self.retired.retain(|t| Arc::strong_count(t) > 1);
    }

    /// Tables replaced but still referenced by a reader.
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank_format::{BankWriter, PcmFormat};
    use std::path::Path;
    use tempfile::tempdir;

    fn write_bank(path: &Path, sounds: &[(&str, Vec<u8>)]) {
        let mut w = BankWriter::new();
        for (name, pcm) in sounds {
            w.add_sound(*name, PcmFormat::new(1, 16, 44_100), pcm.clone());
        }
        w.write_to_path(path).unwrap();
    }

    #[test]
    fn lookups_absent_until_loaded() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("a.bank");
        write_bank(&p, &[("beep", vec![1, 0, 2, 0])]);

        let mut store = SoundBankStore::new();
        store.insert_bank(SoundBank::open(&p).unwrap());
        let beep = SoundHandle::from_name("beep");

        assert!(store.lookup_descriptor(beep).is_some());
        assert!(store.lookup_payload(beep).is_none());
        assert!(store.ensure_loaded(beep));
        assert_eq!(&store.lookup_payload(beep).unwrap()[..], &[1, 0, 2, 0]);

        let unknown = SoundHandle::from_name("unknown");
        assert!(!store.ensure_loaded(unknown));
        assert!(store.lookup_descriptor(unknown).is_none());
    }

    #[test]
    fn snapshot_only_changes_on_publish() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("a.bank");
        write_bank(&p, &[("beep", vec![0; 4])]);

        let mut store = SoundBankStore::new();
        let reader = store.reader();
        store.insert_bank(SoundBank::open(&p).unwrap());
        let beep = SoundHandle::from_name("beep");
        store.ensure_loaded(beep);

        assert!(!reader.load().contains(beep));
        assert!(store.publish());
        assert!(reader.load().contains(beep));
        assert!(!store.publish());
    }

    #[test]
    fn last_registration_wins_and_falls_back_on_removal() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bank");
        let b = dir.path().join("b.bank");
        write_bank(&a, &[("beep", vec![1, 0])]);
        write_bank(&b, &[("beep", vec![2, 0, 3, 0])]);

        let mut store = SoundBankStore::new();
        store.insert_bank(SoundBank::open(&a).unwrap());
        store.insert_bank(SoundBank::open(&b).unwrap());
        let beep = SoundHandle::from_name("beep");
        assert_eq!(store.owner_of(beep), Some(BankHandle::from_path(&b)));
        assert_eq!(store.sound_count(), 1);

        store.ensure_loaded(beep);
        assert_eq!(store.lookup_payload(beep).unwrap().len(), 4);

        store.remove_bank(BankHandle::from_path(&b));
        assert_eq!(store.owner_of(beep), Some(BankHandle::from_path(&a)));
        assert!(store.lookup_payload(beep).is_none());
        store.ensure_loaded(beep);
        assert_eq!(store.lookup_payload(beep).unwrap().len(), 2);
    }

    #[test]
    fn removing_bank_clears_everything_it_owned() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("a.bank");
        write_bank(&p, &[("beep", vec![0; 4]), ("boop", vec![0; 2])]);

        let mut store = SoundBankStore::new();
        let reader = store.reader();
        store.insert_bank(SoundBank::open(&p).unwrap());
        let beep = SoundHandle::from_name("beep");
        store.ensure_loaded(beep);
        store.publish();
        assert!(reader.load().contains(beep));

        assert!(store.remove_bank(BankHandle::from_path(&p)).is_some());
        store.publish();
        assert_eq!(store.bank_count(), 0);
        assert_eq!(store.sound_count(), 0);
        assert!(store.lookup_descriptor(beep).is_none());
        assert!(store.lookup_payload(beep).is_none());
        assert!(reader.load().is_empty());
    }

    #[test]
    fn retired_table_survives_while_reader_holds_it() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("a.bank");
        write_bank(&p, &[("beep", vec![0; 4])]);

        let mut store = SoundBankStore::new();
        let reader = store.reader();
        store.insert_bank(SoundBank::open(&p).unwrap());
        store.ensure_loaded(SoundHandle::from_name("beep"));
        store.publish();

        let held = reader.load_full_for_test();
        store.remove_bank(BankHandle::from_path(&p));
        store.publish();
        assert_eq!(store.retired_len(), 1);
        assert_eq!(held.len(), 1);

        drop(held);
        store.publish();
        assert_eq!(store.retired_len(), 0);
    }

    impl SoundTableReader {
        fn load_full_for_test(&self) -> Arc<SoundTable> {
            self.current.load_full()
        }
    }
}
