//! Category-based sound mixing.
//!
//! `create` splits the system in two. `AudioSystem` stays on the control
//! thread: it owns the sound bank store, stages playback requests and makes
//! their sounds resident before forwarding them. `Mixer` goes to the audio
//! device (see `AudioSystem::start`) or is driven by hand in tests; it never
//! blocks or allocates while rendering.

pub mod category;
pub mod config;
pub mod messages;
pub mod mixer;
pub mod registry;
pub mod system;

pub use category::SoundCategory;
pub use config::{AudioConfig, BridgeConfig, CategoryVolumes, ConfigError, MixerConfig, OutputConfig};
pub use messages::{ActivationRequest, CompletionReport, EntityId, RemovalRequest};
pub use mixer::{Mixer, MixerStats};
pub use registry::{PlaybackInstance, PlaybackRegistry};
pub use system::{create, create_with_codec, AudioSystem, RequestSink, TickReport};

// re-exported so callers need only this crate for common types
pub use asset_manager::SoundHandle;
