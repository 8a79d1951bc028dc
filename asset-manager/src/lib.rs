//! Sound bank asset manager: bank file format, lazy payload loading, and the
//! store/lifecycle pair that serves sounds to the mixer.
pub mod bank;
pub mod bank_format;
pub mod codec;
pub mod handle;
pub mod lifecycle;
pub mod store;
pub mod util;

pub use bank::{SoundBank, SoundEntry, SoundPayload};
pub use bank_format::{BankWriter, IndexEntry, PcmFormat, SoundDescriptor};
pub use codec::{Compressor, Decompressor, Deflate, Stored};
pub use handle::{BankHandle, SoundHandle};
pub use lifecycle::{BankLifecycleManager, BankRequest, TickSummary};
pub use store::{ResidentSound, SoundBankStore, SoundTable, SoundTableReader};
pub use util::AssetError;
