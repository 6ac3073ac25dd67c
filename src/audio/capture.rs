use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};

use super::{SampleSource, f32_to_i16};
use crate::config::AudioConfig;
use crate::container::{CHANNELS, SAMPLE_RATE};
use crate::error::{RecorderError, Result};

/// Microphone capture via cpal, opened at exactly 16kHz mono.
pub struct CpalSource {
    stream: Stream,
    receiver: Receiver<Vec<f32>>,
    pending: Vec<f32>,
    pending_pos: usize,
    poll_timeout: Duration,
}

impl CpalSource {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| RecorderError::Audio(format!("failed to enumerate input devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name().to_string())
                        .as_deref()
                        == Some(name.as_str())
                })
                .ok_or_else(|| RecorderError::Audio(format!("input device not found: {name}")))?
        } else {
            host.default_input_device().ok_or_else(|| {
                RecorderError::Audio("no default input device available".to_string())
            })?
        };

        let stream_config = StreamConfig {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            buffer_size: cpal::BufferSize::Default,
        };

        // bounded, the callback only ever try_sends
        let (tx, rx) = bounded::<Vec<f32>>(64);

        let err_fn = |err: cpal::StreamError| {
            tracing::error!("input stream error: {err}");
        };

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if tx.try_send(data.to_vec()).is_err() {
                        tracing::trace!("capture queue full, dropping {} samples", data.len());
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| {
                RecorderError::Audio(format!(
                    "failed to open input at {SAMPLE_RATE} Hz mono: {e}"
                ))
            })?;

        Ok(Self {
            stream,
            receiver: rx,
            pending: Vec::new(),
            pending_pos: 0,
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
        })
    }
}

impl SampleSource for CpalSource {
    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| RecorderError::Audio(format!("failed to start input stream: {e}")))
    }

    fn stop(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| RecorderError::Audio(format!("failed to pause input stream: {e}")))?;
        while self.receiver.try_recv().is_ok() {}
        self.pending.clear();
        self.pending_pos = 0;
        Ok(())
    }

    fn poll_block(&mut self, out: &mut [i16]) -> Result<usize> {
        if self.pending_pos >= self.pending.len() {
            match self.receiver.recv_timeout(self.poll_timeout) {
                Ok(block) => {
                    self.pending = block;
                    self.pending_pos = 0;
                }
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RecorderError::Audio("input stream closed".to_string()));
                }
            }
        }

        let available = &self.pending[self.pending_pos..];
        let n = available.len().min(out.len());
        for (dst, &s) in out.iter_mut().zip(&available[..n]) {
            *dst = f32_to_i16(s);
        }
        self.pending_pos += n;
        Ok(n)
    }
}

/// Names of all input devices cpal can see.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| RecorderError::Audio(format!("failed to enumerate input devices: {e}")))?;
    Ok(devices
        .filter_map(|d| d.description().ok().map(|desc| desc.name().to_string()))
        .collect())
}

#[must_use]
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| d.description().ok().map(|desc| desc.name().to_string()))
}
