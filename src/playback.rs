use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::SampleSink;
use crate::container::{SAMPLE_RATE, WavContainerReader};
use crate::error::{RecorderError, Result};
use crate::preview::PreviewSink;
use crate::session::{
    IntentSource, Intents, SessionContext, Slot, StopReason, Tick, clock, display_name,
};
use crate::storage::{Storage, StorageHandle};

/// How often `run_playback` checks whether the sink has drained.
const DRAIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub path: PathBuf,
    /// Payload bytes read from the container.
    pub bytes: u64,
    /// Blocks handed to the sink.
    pub chunks: u64,
    pub reason: StopReason,
}

/// State of an in-progress playback.
pub struct Playback<H: StorageHandle> {
    reader: WavContainerReader<H>,
    chunks_played: u64,
}

impl<S: Storage> SessionContext<S> {
    /// Open `path` and position at its payload. A container that cannot be
    /// opened leaves the session idle and the buffer as it was.
    pub fn start_playback(&mut self, path: &Path, preview: &mut impl PreviewSink) -> Result<()> {
        if let Err(e) = self.ensure_idle() {
            preview.report(&format!("cannot play: {e}"));
            return Err(e);
        }

        let mut reader = match WavContainerReader::open(&self.storage, path) {
            Ok(r) => r,
            Err(e) => {
                preview.report(&format!("cannot play: {e}"));
                return Err(e);
            }
        };
        if let Err(e) = reader.skip_header() {
            if let Err(close_err) = reader.close() {
                tracing::warn!("failed to close {}: {close_err}", path.display());
            }
            preview.report(&format!("cannot play: {e}"));
            return Err(e);
        }

        self.buffer.clear();
        self.downsampler.reset();
        self.slot = Slot::Playing(Playback {
            reader,
            chunks_played: 0,
        });

        tracing::info!("playback started: {}", path.display());
        preview.report(&format!("PLAY {}", display_name(path)));
        Ok(())
    }

    /// One playback iteration: at most one read and one sink hand-off.
    pub fn playback_tick(
        &mut self,
        sink: &mut impl SampleSink,
        intents: Intents,
        preview: &mut impl PreviewSink,
    ) -> Result<Tick<PlaybackSummary>> {
        let Slot::Playing(pb) = &mut self.slot else {
            return Ok(Tick::Idle);
        };

        if intents.stop {
            return self.finish_playback(StopReason::Requested, sink, preview);
        }

        let read = match pb.reader.read_chunk(self.buffer.byte_area_mut()) {
            Ok(read) => read,
            Err(e) => return Err(self.fail_playback(e, sink, preview)),
        };
        if read.end_of_data {
            return self.finish_playback(StopReason::EndOfData, sink, preview);
        }

        self.buffer.decode_le(read.bytes);
        if self.buffer.is_empty() {
            // a lone trailing byte
            return Ok(Tick::Running);
        }

        if let Err(e) = sink.play_block(self.buffer.samples(), SAMPLE_RATE) {
            return Err(self.fail_playback(e, sink, preview));
        }
        pb.chunks_played += 1;

        let status = format!(
            "PLAY {} {}",
            display_name(pb.reader.path()),
            clock(pb.reader.payload_read() / 2)
        );
        tracing::debug!("block {} handed to sink", pb.chunks_played);

        self.downsampler.update(self.buffer.samples(), self.policy);
        preview.render_delta(self.downsampler.trace(), self.downsampler.changed(), &status);
        Ok(Tick::Running)
    }

    /// Stop an active playback and silence the sink.
    pub fn stop_playback(
        &mut self,
        sink: &mut impl SampleSink,
        preview: &mut impl PreviewSink,
    ) -> Result<Tick<PlaybackSummary>> {
        self.finish_playback(StopReason::Requested, sink, preview)
    }

    fn finish_playback(
        &mut self,
        reason: StopReason,
        sink: &mut impl SampleSink,
        preview: &mut impl PreviewSink,
    ) -> Result<Tick<PlaybackSummary>> {
        let Slot::Playing(pb) = std::mem::replace(&mut self.slot, Slot::Idle) else {
            return Ok(Tick::Idle);
        };
        self.buffer.clear();

        // at end of data the sink keeps playing what it already accepted
        if reason != StopReason::EndOfData
            && let Err(e) = sink.stop()
        {
            tracing::warn!("failed to stop sink: {e}");
        }

        let summary = PlaybackSummary {
            path: pb.reader.path().to_path_buf(),
            bytes: pb.reader.payload_read(),
            chunks: pb.chunks_played,
            reason,
        };
        if let Err(e) = pb.reader.close() {
            tracing::warn!("failed to close {}: {e}", summary.path.display());
        }

        tracing::info!(
            "playback stopped ({reason:?}): {} blocks, {} bytes",
            summary.chunks,
            summary.bytes
        );
        preview.report(&format!(
            "stopped {} ({})",
            display_name(&summary.path),
            clock(summary.bytes / 2)
        ));
        Ok(Tick::Finished(summary))
    }

    fn fail_playback(
        &mut self,
        error: RecorderError,
        sink: &mut impl SampleSink,
        preview: &mut impl PreviewSink,
    ) -> RecorderError {
        if let Slot::Playing(pb) = std::mem::replace(&mut self.slot, Slot::Idle) {
            tracing::error!("playback of {} aborted: {error}", pb.reader.path().display());
            if let Err(e) = pb.reader.close() {
                tracing::warn!("failed to close container: {e}");
            }
        }
        self.buffer.clear();
        if let Err(e) = sink.stop() {
            tracing::warn!("failed to stop sink: {e}");
        }
        preview.report(&format!("playback failed: {error}"));
        error
    }
}

/// Drive a started playback to completion, then wait for the sink to drain
/// unless a stop arrives first.
pub fn run_playback<S: Storage>(
    ctx: &mut SessionContext<S>,
    sink: &mut impl SampleSink,
    intents: &mut impl IntentSource,
    preview: &mut impl PreviewSink,
) -> Result<PlaybackSummary> {
    let summary = loop {
        match ctx.playback_tick(sink, intents.poll(), preview)? {
            Tick::Running => {}
            Tick::Finished(summary) => break summary,
            Tick::Idle => {
                return Err(RecorderError::Other("no playback in progress".to_string()));
            }
        }
    };

    if summary.reason == StopReason::EndOfData {
        while sink.is_busy() {
            if intents.poll().stop {
                sink.stop()?;
                break;
            }
            std::thread::sleep(DRAIN_POLL);
        }
    }
    Ok(summary)
}
