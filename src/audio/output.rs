use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};

use super::{SampleSink, i16_to_f32};
use crate::config::AudioConfig;
use crate::container::{CHANNELS, SAMPLE_RATE};
use crate::error::{RecorderError, Result};

/// Blocks in flight between `play_block` and the output callback.
const QUEUE_DEPTH: usize = 4;

/// Speaker output via cpal, opened at exactly 16kHz mono.
pub struct CpalSink {
    stream: Stream,
    sender: Sender<Vec<i16>>,
    /// Second handle on the queue so `stop` can empty it.
    drain: Receiver<Vec<i16>>,
    queued: Arc<AtomicUsize>,
    flush: Arc<AtomicBool>,
    timeout: Duration,
}

impl CpalSink {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.output_device {
            host.output_devices()
                .map_err(|e| {
                    RecorderError::Audio(format!("failed to enumerate output devices: {e}"))
                })?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name().to_string())
                        .as_deref()
                        == Some(name.as_str())
                })
                .ok_or_else(|| RecorderError::Audio(format!("output device not found: {name}")))?
        } else {
            host.default_output_device().ok_or_else(|| {
                RecorderError::Audio("no default output device available".to_string())
            })?
        };

        let stream_config = StreamConfig {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = bounded::<Vec<i16>>(QUEUE_DEPTH);
        let queued = Arc::new(AtomicUsize::new(0));
        let flush = Arc::new(AtomicBool::new(false));

        let cb_rx = rx.clone();
        let cb_queued = Arc::clone(&queued);
        let cb_flush = Arc::clone(&flush);
        let mut current: Vec<i16> = Vec::new();
        let mut pos = 0usize;

        let err_fn = |err: cpal::StreamError| {
            tracing::error!("output stream error: {err}");
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    if cb_flush.swap(false, Ordering::AcqRel) {
                        current.clear();
                        pos = 0;
                    }
                    let mut played = 0usize;
                    for out in data.iter_mut() {
                        if pos >= current.len() {
                            match cb_rx.try_recv() {
                                Ok(next) => {
                                    current = next;
                                    pos = 0;
                                }
                                Err(_) => {
                                    *out = 0.0;
                                    continue;
                                }
                            }
                        }
                        *out = i16_to_f32(current[pos]);
                        pos += 1;
                        played += 1;
                    }
                    let _ = cb_queued.fetch_update(Ordering::AcqRel, Ordering::Acquire, |q| {
                        Some(q.saturating_sub(played))
                    });
                },
                err_fn,
                None,
            )
            .map_err(|e| {
                RecorderError::Audio(format!(
                    "failed to open output at {SAMPLE_RATE} Hz mono: {e}"
                ))
            })?;

        stream
            .play()
            .map_err(|e| RecorderError::Audio(format!("failed to start output stream: {e}")))?;

        Ok(Self {
            stream,
            sender: tx,
            drain: rx,
            queued,
            flush,
            timeout: Duration::from_millis(config.sink_timeout_ms),
        })
    }
}

impl SampleSink for CpalSink {
    fn play_block(&mut self, samples: &[i16], sample_rate: u32) -> Result<()> {
        if sample_rate != SAMPLE_RATE {
            return Err(RecorderError::Audio(format!(
                "output runs at {SAMPLE_RATE} Hz, got a {sample_rate} Hz block"
            )));
        }
        self.queued.fetch_add(samples.len(), Ordering::AcqRel);
        match self.sender.send_timeout(samples.to_vec(), self.timeout) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.queued.fetch_sub(samples.len(), Ordering::AcqRel);
                Err(match e {
                    SendTimeoutError::Timeout(_) => RecorderError::Audio(format!(
                        "output device did not accept a block within {:?}",
                        self.timeout
                    )),
                    SendTimeoutError::Disconnected(_) => {
                        RecorderError::Audio("output stream closed".to_string())
                    }
                })
            }
        }
    }

    fn is_busy(&self) -> bool {
        self.queued.load(Ordering::Acquire) > 0
    }

    fn stop(&mut self) -> Result<()> {
        while self.drain.try_recv().is_ok() {}
        self.flush.store(true, Ordering::Release);
        self.queued.store(0, Ordering::Release);
        tracing::debug!("output flushed");
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!("failed to pause output stream: {e}");
        }
    }
}

/// Names of all output devices cpal can see.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| RecorderError::Audio(format!("failed to enumerate output devices: {e}")))?;
    Ok(devices
        .filter_map(|d| d.description().ok().map(|desc| desc.name().to_string()))
        .collect())
}

#[must_use]
pub fn default_output_device_name() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .and_then(|d| d.description().ok().map(|desc| desc.name().to_string()))
}
