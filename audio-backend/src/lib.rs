// Audio output backends. The mixer hands a render closure to `start`; the
// backend calls it on its real-time thread once per fixed-size block.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// The mock backend is always built: it drives the render closure on the caller's
// thread, which is what tests and headless tools need.
pub mod mock_backend;

#[cfg(feature = "cpal-backend")]
pub mod cpal_backend;

pub use mock_backend::{MockAudioBackend, MockDriver};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no output device available")]
    DeviceNotFound,
    #[error("unsupported stream format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to build output stream: {0}")]
    StreamCreationFailed(String),
    #[error("playback error: {0}")]
    PlaybackError(String),
    #[error("backend is already running")]
    AlreadyRunning,
    #[error("backend control channel closed")]
    ControlChannelClosed,
}

/// The render callback.
///
/// Called on the real-time audio thread with one interleaved i16 block of
/// exactly `buffer_size() * channels()` samples. It must not block or allocate.
pub type RenderFn = Box<dyn FnMut(&mut [i16]) + Send + 'static>;

/// Diagnostics events emitted by the backend (non-RT callbacks expected).
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    XRun { count: u32 },
    DeviceRemoved,
    Other(String),
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::XRun { count } => write!(f, "XRun(count={})", count),
            DiagnosticEvent::DeviceRemoved => write!(f, "DeviceRemoved"),
            DiagnosticEvent::Other(s) => write!(f, "Other({})", s),
        }
    }
}

/// Non-RT diagnostics callback type.
pub type DiagnosticsCb = Arc<dyn Fn(DiagnosticEvent) + Send + Sync + 'static>;

/// Output format requested at initialization. Not renegotiated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames_per_buffer: usize,
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            frames_per_buffer: 256,
        }
    }
}

impl StreamSpec {
    pub fn samples_per_buffer(&self) -> usize {
        self.frames_per_buffer * self.channels as usize
    }
}

/// Represents the effective configuration of an audio device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub spec: StreamSpec,
    pub device_name: Option<String>,
}

/// A trait for backends that can provide additional information about the audio device.
pub trait DeviceInfoProvider {
    fn get_device_name(&self) -> Option<&str>;
}

/// The core trait defining the audio backend's contract.
pub trait AudioBackend: Send {
    fn start(&mut self, render: RenderFn) -> Result<(), BackendError>;
    fn stop(&mut self) -> Result<(), BackendError>;
    fn is_running(&self) -> bool;
    fn sample_rate(&self) -> u32;
    /// Frames per render block.
    fn buffer_size(&self) -> usize;
    fn channels(&self) -> u16;
    /// Returns frames since stream start. 0 if never started.
    fn frames_since_start(&self) -> u64;
    /// Register or clear non-RT diagnostics callback.
    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>);

    fn as_device_info_provider(&self) -> Option<&dyn DeviceInfoProvider>;
}

/// Runtime helper to determine if the `mock-audio` feature was enabled at
/// compile time for this crate.
pub fn is_mock_backend_enabled() -> bool {
    cfg!(feature = "mock-audio") || !cfg!(feature = "cpal-backend")
}

/// Open the default backend for this build: the system output device, or the
/// mock when built with `mock-audio` or without `cpal-backend`.
pub fn create_audio_backend(spec: StreamSpec) -> Result<Box<dyn AudioBackend>, BackendError> {
    #[cfg(all(feature = "cpal-backend", not(feature = "mock-audio")))]
    {
        let backend = cpal_backend::CpalAudioBackend::new(spec)?;
        log_backend("cpal", &backend);
        Ok(Box::new(backend))
    }
    #[cfg(any(feature = "mock-audio", not(feature = "cpal-backend")))]
    {
        let backend = MockAudioBackend::with_spec(spec);
        log_backend("mock", &backend);
        Ok(Box::new(backend))
    }
}

fn log_backend(kind: &str, backend: &dyn AudioBackend) {
    tracing::info!(
        backend = kind,
        sample_rate = backend.sample_rate(),
        buffer_size = backend.buffer_size(),
        channels = backend.channels(),
        device = backend
            .as_device_info_provider()
            .and_then(|d| d.get_device_name())
            .unwrap_or("<unknown>"),
        "audio backend created"
    );
}
