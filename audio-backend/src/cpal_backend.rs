use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedBufferSize,
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::{
    AudioBackend, BackendError, DeviceInfo, DeviceInfoProvider, DiagnosticEvent, DiagnosticsCb,
    RenderFn, StreamSpec,
};

/// Worker-thread-backed CPAL backend.
/// `CpalAudioBackend` is a Send handle that talks to the worker thread over a
/// control channel. The worker owns the device and the (non-Send) `Stream`.
pub struct CpalAudioBackend {
    info: DeviceInfo,
    frames: Arc<AtomicU64>,
    running: bool,
    ctrl_tx: Sender<CtrlMsg>,
    worker: Option<JoinHandle<()>>,
}

type Reply = Sender<Result<(), BackendError>>;

enum CtrlMsg {
    Start(RenderFn, Reply),
    Stop(Reply),
    SetDiagnostics(Option<DiagnosticsCb>),
    Shutdown,
}

struct Negotiated {
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl CpalAudioBackend {
    /// Open the default output device with the requested format. Fails if the
    /// device cannot provide the channel count and sample rate; there is no
    /// sample-rate conversion.
    pub fn new(spec: StreamSpec) -> Result<Self, BackendError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(BackendError::DeviceNotFound)?;
        let negotiated = negotiate(&device, spec)?;
        let device_name = device.name().ok();

        let (tx, rx) = unbounded::<CtrlMsg>();
        let frames = Arc::new(AtomicU64::new(0));
        let frames_worker = frames.clone();
        let worker = thread::Builder::new()
            .name("audio-backend".into())
            .spawn(move || worker_loop(device, negotiated, spec, rx, frames_worker))
            .map_err(|e| BackendError::PlaybackError(format!("spawn worker: {}", e)))?;

        Ok(Self {
            info: DeviceInfo { spec, device_name },
            frames,
            running: false,
            ctrl_tx: tx,
            worker: Some(worker),
        })
    }

    fn request(&self, make: impl FnOnce(Reply) -> CtrlMsg) -> Result<(), BackendError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.ctrl_tx
            .send(make(reply_tx))
            .map_err(|_| BackendError::ControlChannelClosed)?;
        reply_rx
            .recv()
            .map_err(|_| BackendError::ControlChannelClosed)?
    }
}

fn negotiate(device: &Device, spec: StreamSpec) -> Result<Negotiated, BackendError> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| BackendError::UnsupportedFormat(e.to_string()))?
        .filter(|r| {
            r.channels() == spec.channels
                && r.min_sample_rate().0 <= spec.sample_rate
                && r.max_sample_rate().0 >= spec.sample_rate
        })
        .collect::<Vec<_>>();

    // Prefer native i16, then f32.
    let chosen = ranges
        .iter()
        .find(|r| r.sample_format() == SampleFormat::I16)
        .or_else(|| ranges.iter().find(|r| r.sample_format() == SampleFormat::F32))
        .cloned()
        .ok_or_else(|| {
            BackendError::UnsupportedFormat(format!(
                "device cannot output {} channel(s) at {} Hz as i16 or f32",
                spec.channels, spec.sample_rate
            ))
        })?
        .with_sample_rate(SampleRate(spec.sample_rate));

    let mut config = chosen.config();
    let frames = spec.frames_per_buffer as u32;
    config.buffer_size = match chosen.buffer_size() {
        SupportedBufferSize::Range { min, max } if *min <= frames && frames <= *max => {
            BufferSize::Fixed(frames)
        }
        _ => BufferSize::Default,
    };

    Ok(Negotiated {
        config,
        sample_format: chosen.sample_format(),
    })
}

fn worker_loop(
    device: Device,
    negotiated: Negotiated,
    spec: StreamSpec,
    rx: Receiver<CtrlMsg>,
    frames: Arc<AtomicU64>,
) {
    let mut diagnostics: Option<DiagnosticsCb> = None;
    let mut stream_opt: Option<cpal::Stream> = None;

    while let Ok(msg) = rx.recv() {
        match msg {
            CtrlMsg::Start(render, reply) => {
                let result = if stream_opt.is_some() {
                    Err(BackendError::AlreadyRunning)
                } else {
                    frames.store(0, Ordering::Relaxed);
                    open_stream(&device, &negotiated, spec, render, frames.clone(), diagnostics.clone())
                        .map(|s| {
                            stream_opt = Some(s);
                        })
                };
                if let Err(e) = &result {
                    error!(error = %e, "failed to start output stream");
                }
                let _ = reply.send(result);
            }
            CtrlMsg::Stop(reply) => {
                let result = match stream_opt.take() {
                    Some(stream) => stream
                        .pause()
                        .map_err(|e| BackendError::PlaybackError(e.to_string())),
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
            CtrlMsg::SetDiagnostics(cb) => {
                diagnostics = cb;
            }
            CtrlMsg::Shutdown => {
                // stream_opt is dropped on return, which closes the stream
                return;
            }
        }
    }
}

fn open_stream(
    device: &Device,
    negotiated: &Negotiated,
    spec: StreamSpec,
    render: RenderFn,
    frames: Arc<AtomicU64>,
    diagnostics: Option<DiagnosticsCb>,
) -> Result<cpal::Stream, BackendError> {
    let stream = match negotiated.sample_format {
        SampleFormat::I16 => {
            build_stream::<i16>(device, &negotiated.config, spec, render, frames, diagnostics)?
        }
        SampleFormat::F32 => {
            build_stream::<f32>(device, &negotiated.config, spec, render, frames, diagnostics)?
        }
        other => {
            return Err(BackendError::UnsupportedFormat(format!("{:?}", other)));
        }
    };
    stream
        .play()
        .map_err(|e| BackendError::PlaybackError(e.to_string()))?;
    info!(
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        frames_per_buffer = spec.frames_per_buffer,
        format = ?negotiated.sample_format,
        "output stream started"
    );
    Ok(stream)
}

/// The device may ask for any number of samples per callback; the render
/// closure always sees whole `frames_per_buffer` blocks. The block buffer is
/// allocated here, before the stream starts.
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    spec: StreamSpec,
    mut render: RenderFn,
    frames: Arc<AtomicU64>,
    diagnostics: Option<DiagnosticsCb>,
) -> Result<cpal::Stream, BackendError>
where
    T: SizedSample + FromSample<i16>,
{
    let block_len = spec.samples_per_buffer();
    let channels = spec.channels as usize;
    let mut block = vec![0i16; block_len];
    let mut pos = block_len;

    let data_cb = move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
        for out in data.iter_mut() {
            if pos == block_len {
                let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    render(&mut block);
                }));
                if res.is_err() {
                    block.iter_mut().for_each(|s| *s = 0);
                }
                pos = 0;
            }
            *out = T::from_sample(block[pos]);
            pos += 1;
        }
        frames.fetch_add((data.len() / channels) as u64, Ordering::Relaxed);
    };

    let err_cb = move |err: cpal::StreamError| {
        warn!(error = %err, "output stream error");
        if let Some(cb) = &diagnostics {
            let event = match err {
                cpal::StreamError::DeviceNotAvailable => DiagnosticEvent::DeviceRemoved,
                other => DiagnosticEvent::Other(other.to_string()),
            };
            cb(event);
        }
    };

    device
        .build_output_stream(config, data_cb, err_cb, None)
        .map_err(|e| BackendError::StreamCreationFailed(e.to_string()))
}

impl AudioBackend for CpalAudioBackend {
    fn start(&mut self, render: RenderFn) -> Result<(), BackendError> {
        self.request(|reply| CtrlMsg::Start(render, reply))?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.request(CtrlMsg::Stop)?;
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
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
        self.frames.load(Ordering::Relaxed)
    }
    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>) {
        // takes effect on the next start
        let _ = self.ctrl_tx.send(CtrlMsg::SetDiagnostics(cb));
    }

    fn as_device_info_provider(&self) -> Option<&dyn DeviceInfoProvider> {
        Some(self)
    }
}

impl DeviceInfoProvider for CpalAudioBackend {
    fn get_device_name(&self) -> Option<&str> {
        self.info.device_name.as_deref()
    }
}

impl Drop for CpalAudioBackend {
    fn drop(&mut self) {
        let _ = self.ctrl_tx.send(CtrlMsg::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                debug!("audio backend worker panicked during shutdown");
            }
        }
    }
}
