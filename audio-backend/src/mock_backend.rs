use parking_lot::Mutex;
use std::sync::Arc;

use crate::DeviceInfoProvider;
use crate::{AudioBackend, BackendError, DeviceInfo, DiagnosticEvent, DiagnosticsCb, RenderFn, StreamSpec};

/// Deterministic backend: nothing runs until someone calls `render_blocks`,
/// which invokes the render closure on the caller's thread.
pub struct MockAudioBackend {
    info: DeviceInfo,
    state: Arc<Mutex<MockState>>,
    diagnostics: Option<DiagnosticsCb>,
}

struct MockState {
    render: Option<RenderFn>,
    block: Vec<i16>,
    frames: u64,
}

/// Cloneable handle that drives a `MockAudioBackend` after it has been
/// boxed and handed to its owner.
#[derive(Clone)]
pub struct MockDriver {
    spec: StreamSpec,
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Run the render closure `blocks` times and return everything it wrote.
    pub fn render_blocks(&self, blocks: usize) -> Result<Vec<i16>, BackendError> {
        let mut state = self.state.lock();
        let MockState {
            render,
            block,
            frames,
        } = &mut *state;
        let render = render
            .as_mut()
            .ok_or_else(|| BackendError::PlaybackError("mock backend not started".into()))?;
        let mut out = Vec::with_capacity(blocks * block.len());
        for _ in 0..blocks {
            block.fill(0);
            render(&mut block[..]);
            out.extend_from_slice(&block[..]);
            *frames += self.spec.frames_per_buffer as u64;
        }
        Ok(out)
    }

    pub fn spec(&self) -> StreamSpec {
        self.spec
    }
}

impl MockAudioBackend {
    pub fn new() -> Self {
        Self::with_spec(StreamSpec::default())
    }

    pub fn with_spec(spec: StreamSpec) -> Self {
        Self {
            info: DeviceInfo {
                spec,
                device_name: Some("mock-device".to_string()),
            },
            state: Arc::new(Mutex::new(MockState {
                render: None,
                block: vec![0; spec.samples_per_buffer()],
                frames: 0,
            })),
            diagnostics: None,
        }
    }

    pub fn driver(&self) -> MockDriver {
        MockDriver {
            spec: self.info.spec,
            state: self.state.clone(),
        }
    }

    pub fn render_blocks(&mut self, blocks: usize) -> Result<Vec<i16>, BackendError> {
        self.driver().render_blocks(blocks)
    }

    /// Deliver a diagnostics event as if the device reported it.
    pub fn emit_diagnostic(&self, event: DiagnosticEvent) {
        if let Some(cb) = &self.diagnostics {
            cb(event);
        }
    }
}

impl Default for MockAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for MockAudioBackend {
    fn start(&mut self, render: RenderFn) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.render.is_some() {
            return Err(BackendError::AlreadyRunning);
        }
        state.render = Some(render);
        state.frames = 0;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.state.lock().render = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.lock().render.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.info.spec.sample_rate
    }
    fn buffer_size(&self) -> usize {
        self.info.spec.frames_per_buffer
    }
    fn channels(&self) -> u16 {
        self.info.spec.channels
    }
    fn frames_since_start(&self) -> u64 {
        self.state.lock().frames
    }
    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>) {
        self.diagnostics = cb;
    }

    fn as_device_info_provider(&self) -> Option<&dyn DeviceInfoProvider> {
        Some(self)
    }
}

impl DeviceInfoProvider for MockAudioBackend {
    fn get_device_name(&self) -> Option<&str> {
        self.info.device_name.as_deref()
    }
}
