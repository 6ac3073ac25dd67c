use std::path::{Path, PathBuf};

use crate::audio::SampleSource;
use crate::config::Config;
use crate::container::{FinalSize, HeaderPolicy, MAX_PAYLOAD_BYTES, WavContainerWriter};
use crate::error::{RecorderError, Result};
use crate::preview::PreviewSink;
use crate::session::{
    IntentSource, Intents, SessionContext, Slot, StopReason, Tick, clock, display_name,
};
use crate::storage::{Storage, StorageHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub header_policy: HeaderPolicy,
    /// Capture stops on its own once this many chunks are written.
    pub max_chunks: u64,
}

impl CaptureSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            header_policy: config.capture.header_policy,
            max_chunks: config.capture.max_chunks(config.audio.chunk_samples),
        }
    }
}

/// What a finished capture produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub path: PathBuf,
    pub size: FinalSize,
    pub chunks: u64,
    pub reason: StopReason,
}

/// State of an in-progress capture.
pub struct Recording<H: StorageHandle> {
    writer: WavContainerWriter<H>,
    max_chunks: u64,
    chunk_len: usize,
}

impl<H: StorageHandle> Recording<H> {
    fn chunks_written(&self) -> u64 {
        self.writer.samples_written() / self.chunk_len as u64
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.writer.path()
    }
}

impl<S: Storage> SessionContext<S> {
    /// Enable the source and create the container; on any failure the session
    /// stays idle and the error is reported.
    pub fn start_capture(
        &mut self,
        path: &Path,
        settings: CaptureSettings,
        source: &mut impl SampleSource,
        preview: &mut impl PreviewSink,
    ) -> Result<()> {
        if let Err(e) = self.ensure_idle() {
            preview.report(&format!("cannot record: {e}"));
            return Err(e);
        }
        if settings.max_chunks == 0 {
            let e = RecorderError::Config("capture cap allows no chunks".to_string());
            preview.report(&format!("cannot record: {e}"));
            return Err(e);
        }

        if let Err(e) = source.start() {
            preview.report(&format!("cannot record: {e}"));
            return Err(e);
        }

        let chunk_len = self.buffer.chunk_len();
        let estimate = settings
            .max_chunks
            .saturating_mul(chunk_len as u64 * 2)
            .min(MAX_PAYLOAD_BYTES);
        let writer =
            match WavContainerWriter::open(&self.storage, path, settings.header_policy, estimate) {
                Ok(w) => w,
                Err(e) => {
                    if let Err(stop_err) = source.stop() {
                        tracing::warn!("failed to disable source: {stop_err}");
                    }
                    preview.report(&format!("cannot record: {e}"));
                    return Err(e);
                }
            };

        self.buffer.clear();
        self.downsampler.reset();
        self.slot = Slot::Capturing(Recording {
            writer,
            max_chunks: settings.max_chunks,
            chunk_len,
        });

        tracing::info!(
            "capture started: {} (cap {} chunks of {chunk_len})",
            path.display(),
            settings.max_chunks
        );
        preview.report(&format!("REC {}", display_name(path)));
        Ok(())
    }

    /// One capture iteration: at most one poll of the source and one write.
    pub fn capture_tick(
        &mut self,
        source: &mut impl SampleSource,
        intents: Intents,
        preview: &mut impl PreviewSink,
    ) -> Result<Tick<CaptureSummary>> {
        let Slot::Capturing(rec) = &mut self.slot else {
            return Ok(Tick::Idle);
        };

        if intents.stop {
            return self.finish_capture(StopReason::Requested, source, preview);
        }

        let remaining = rec.max_chunks.saturating_sub(rec.chunks_written());
        let limit = usize::try_from(remaining.saturating_mul(rec.chunk_len as u64))
            .unwrap_or(usize::MAX)
            .min(self.buffer.capacity());

        let polled = source.poll_block(self.buffer.spare_mut(limit));
        let n = match polled {
            Ok(n) => n,
            Err(e) => return Err(self.fail_capture(e, source, preview)),
        };
        if n == 0 {
            return Ok(Tick::Running);
        }
        self.buffer.commit(n);
        if self.buffer.len() < limit {
            return Ok(Tick::Running);
        }

        let filled = self.buffer.len();
        let written = rec.writer.append_chunk(self.buffer.encode_le(filled));
        if let Err(e) = written {
            return Err(self.fail_capture(e, source, preview));
        }

        let samples_written = rec.writer.samples_written();
        let chunks = rec.chunks_written();
        let cap_reached = chunks >= rec.max_chunks;
        let status = format!(
            "REC {} {} / {}",
            display_name(rec.path()),
            clock(samples_written),
            clock(rec.max_chunks * rec.chunk_len as u64)
        );
        tracing::debug!("chunk {chunks}/{} written", rec.max_chunks);

        self.downsampler.update(self.buffer.samples(), self.policy);
        preview.render_delta(self.downsampler.trace(), self.downsampler.changed(), &status);
        self.buffer.clear();

        if cap_reached {
            return self.finish_capture(StopReason::CapReached, source, preview);
        }
        Ok(Tick::Running)
    }

    /// Stop an active capture as if the user asked for it.
    pub fn stop_capture(
        &mut self,
        source: &mut impl SampleSource,
        preview: &mut impl PreviewSink,
    ) -> Result<Tick<CaptureSummary>> {
        self.finish_capture(StopReason::Requested, source, preview)
    }

    fn finish_capture(
        &mut self,
        reason: StopReason,
        source: &mut impl SampleSource,
        preview: &mut impl PreviewSink,
    ) -> Result<Tick<CaptureSummary>> {
        let Slot::Capturing(mut rec) = std::mem::replace(&mut self.slot, Slot::Idle) else {
            return Ok(Tick::Idle);
        };

        // whole chunks still buffered are kept, a partial tail is dropped
        let whole = self.buffer.complete_chunks() * rec.chunk_len;
        let flushed = if whole > 0 {
            rec.writer.append_chunk(self.buffer.encode_le(whole)).map(|_| ())
        } else {
            Ok(())
        };
        if self.buffer.len() > whole {
            tracing::debug!("dropping {} buffered samples", self.buffer.len() - whole);
        }
        self.buffer.clear();

        if let Err(e) = source.stop() {
            tracing::warn!("failed to disable source: {e}");
        }
        let finalized = rec.writer.finalize();

        let size = match (flushed, finalized) {
            (Ok(()), Ok(size)) => size,
            (Err(e), _) | (Ok(()), Err(e)) => {
                preview.report(&format!("capture failed: {e}"));
                tracing::error!("capture of {} failed: {e}", rec.path().display());
                return Err(e);
            }
        };

        let summary = CaptureSummary {
            path: rec.path().to_path_buf(),
            size,
            chunks: rec.chunks_written(),
            reason,
        };
        tracing::info!(
            "capture stopped ({reason:?}): {} chunks, {} payload bytes",
            summary.chunks,
            size.payload_bytes
        );
        preview.report(&format!(
            "saved {} ({})",
            display_name(&summary.path),
            clock(u64::from(size.payload_bytes) / 2)
        ));
        Ok(Tick::Finished(summary))
    }

    /// Tear down after a fatal error: finalize what was written, disable the
    /// source, go idle, report.
    fn fail_capture(
        &mut self,
        error: RecorderError,
        source: &mut impl SampleSource,
        preview: &mut impl PreviewSink,
    ) -> RecorderError {
        if let Slot::Capturing(mut rec) = std::mem::replace(&mut self.slot, Slot::Idle) {
            if let Err(e) = rec.writer.finalize() {
                tracing::warn!("finalize after failure also failed: {e}");
            }
            tracing::error!("capture of {} aborted: {error}", rec.path().display());
        }
        self.buffer.clear();
        if let Err(e) = source.stop() {
            tracing::warn!("failed to disable source: {e}");
        }
        preview.report(&format!("capture failed: {error}"));
        error
    }
}

/// Drive a started capture to completion, polling `intents` once per iteration.
pub fn run_capture<S: Storage>(
    ctx: &mut SessionContext<S>,
    source: &mut impl SampleSource,
    intents: &mut impl IntentSource,
    preview: &mut impl PreviewSink,
) -> Result<CaptureSummary> {
    loop {
        match ctx.capture_tick(source, intents.poll(), preview)? {
            Tick::Running => {}
            Tick::Finished(summary) => return Ok(summary),
            Tick::Idle => {
                return Err(RecorderError::Other("no capture in progress".to_string()));
            }
        }
    }
}
