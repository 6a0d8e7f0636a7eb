//! Live audio capture using CPAL (Cross-Platform Audio Library).
//!
//! Feature-gated backend implementing [`CaptureBackend`] for real devices.
//! The primary source opens the default input device; the secondary source
//! looks for a monitor/loopback device so system audio can be captured on
//! PipeWire/PulseAudio setups.

use crate::audio::source::{CaptureBackend, CaptureSource, SourceKind};
use crate::audio::wav::resample;
use crate::defaults;
use crate::error::{Result, TransliveError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// Device name fragments that identify loopback/monitor inputs.
const MONITOR_PATTERNS: &[&str] = &["monitor", "loopback", "stereo mix"];

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched under the Mutex in `CpalCaptureSource`,
/// so it never crosses thread boundaries concurrently.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// CPAL-backed capture backend.
pub struct CpalBackend {
    /// Explicit device name for the primary source, if configured.
    pub primary_device: Option<String>,
    /// Pipeline sample rate to deliver.
    pub sample_rate: u32,
}

impl CpalBackend {
    pub fn new(primary_device: Option<String>) -> Self {
        Self {
            primary_device,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }

    fn find_device(&self, kind: SourceKind) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match kind {
            SourceKind::Primary => {
                if let Some(name) = &self.primary_device {
                    let devices =
                        host.input_devices()
                            .map_err(|e| TransliveError::DeviceUnavailable {
                                source_kind: kind.as_str().to_string(),
                                message: format!("enumeration failed: {}", e),
                            })?;
                    for device in devices {
                        if device.name().is_ok_and(|n| n == *name) {
                            return Ok(device);
                        }
                    }
                    return Err(TransliveError::DeviceUnavailable {
                        source_kind: kind.as_str().to_string(),
                        message: format!("device {} not found", name),
                    });
                }
                host.default_input_device()
                    .ok_or_else(|| TransliveError::DeviceUnavailable {
                        source_kind: kind.as_str().to_string(),
                        message: "no default input device".to_string(),
                    })
            }
            SourceKind::Secondary => {
                let devices =
                    host.input_devices()
                        .map_err(|e| TransliveError::DeviceUnavailable {
                            source_kind: kind.as_str().to_string(),
                            message: format!("enumeration failed: {}", e),
                        })?;
                for device in devices {
                    if let Ok(name) = device.name() {
                        let lower = name.to_lowercase();
                        if MONITOR_PATTERNS.iter().any(|p| lower.contains(p)) {
                            return Ok(device);
                        }
                    }
                }
                Err(TransliveError::DeviceUnavailable {
                    source_kind: kind.as_str().to_string(),
                    message: "no monitor/loopback device found".to_string(),
                })
            }
        }
    }
}

impl CaptureBackend for CpalBackend {
    fn open(&self, kind: SourceKind) -> Result<Box<dyn CaptureSource>> {
        let device = self.find_device(kind)?;
        Ok(Box::new(CpalCaptureSource::new(
            device,
            kind,
            self.sample_rate,
        )))
    }
}

/// One live CPAL input stream appending float samples into a shared buffer.
pub struct CpalCaptureSource {
    device: cpal::Device,
    kind: SourceKind,
    stream: Arc<Mutex<Option<SendableStream>>>,
    buffer: Arc<Mutex<Vec<f32>>>,
    /// Rate the device actually delivers; drain resamples to `target_rate`.
    native_rate: Arc<Mutex<u32>>,
    target_rate: u32,
    active: bool,
}

impl CpalCaptureSource {
    fn new(device: cpal::Device, kind: SourceKind, target_rate: u32) -> Self {
        Self {
            device,
            kind,
            stream: Arc::new(Mutex::new(None)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            native_rate: Arc::new(Mutex::new(target_rate)),
            target_rate,
            active: false,
        }
    }

    fn build_stream(&self) -> Result<(cpal::Stream, u32)> {
        let kind = self.kind.as_str();
        let err_callback = move |err| {
            tracing::warn!(target: "audio", "capture stream error: {}", err);
        };

        // Preferred: f32 mono at the pipeline rate. PipeWire/PulseAudio
        // convert transparently when they can.
        let preferred = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.target_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok((stream, self.target_rate));
        }

        // Fallback: device-native config with software downmix; drain
        // resamples to the pipeline rate.
        let config = self
            .device
            .default_input_config()
            .map_err(|e| TransliveError::DeviceUnavailable {
                source_kind: kind.to_string(),
                message: format!("no supported input config: {}", e),
            })?;
        let native_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let buffer = Arc::clone(&self.buffer);
        let stream = self
            .device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        if channels <= 1 {
                            buf.extend_from_slice(data);
                        } else {
                            buf.extend(
                                data.chunks(channels)
                                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                            );
                        }
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| TransliveError::DeviceUnavailable {
                source_kind: kind.to_string(),
                message: format!("failed to build input stream: {}", e),
            })?;
        Ok((stream, native_rate))
    }
}

impl CaptureSource for CpalCaptureSource {
    fn start(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }
        let (stream, native_rate) = self.build_stream()?;
        stream.play().map_err(|e| TransliveError::DeviceUnavailable {
            source_kind: self.kind.as_str().to_string(),
            message: format!("failed to start stream: {}", e),
        })?;
        if let Ok(mut rate) = self.native_rate.lock() {
            *rate = native_rate;
        }
        if let Ok(mut slot) = self.stream.lock() {
            *slot = Some(SendableStream(stream));
        }
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Ok(mut slot) = self.stream.lock() {
            *slot = None; // dropping the stream stops capture
        }
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
        self.active = false;
        Ok(())
    }

    fn drain(&mut self) -> Vec<f32> {
        let raw = match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(_) => Vec::new(),
        };
        let native = self.native_rate.lock().map(|r| *r).unwrap_or(self.target_rate);
        if native == self.target_rate {
            raw
        } else {
            resample(&raw, native, self.target_rate)
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
