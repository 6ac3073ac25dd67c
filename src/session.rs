//! The single session slot shared by capture and playback.
//!
//! Capture and playback are mutually exclusive: the slot holds at most one of
//! them, and starting either while the other is active is rejected with
//! [`RecorderError::SessionBusy`]. The [`ChunkBuffer`] lives here and is only
//! ever borrowed by whichever controller occupies the slot.

use std::path::Path;

use crate::audio::ChunkBuffer;
use crate::config::Config;
use crate::container::SAMPLE_RATE;
use crate::error::{RecorderError, Result};
use crate::playback::Playback;
use crate::recording::Recording;
use crate::storage::{Storage, StorageHandle};
use crate::waveform::{PreviewPolicy, WaveformDownsampler};

/// A discrete user intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Stop,
    Up,
    Down,
    Select,
    Delete,
}

/// Snapshot of the intents pending at one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Intents {
    pub stop: bool,
    pub up: bool,
    pub down: bool,
    pub select: bool,
    pub delete: bool,
}

impl Intents {
    pub const NONE: Self = Self {
        stop: false,
        up: false,
        down: false,
        select: false,
        delete: false,
    };

    #[must_use]
    pub const fn with(mut self, intent: Intent) -> Self {
        match intent {
            Intent::Stop => self.stop = true,
            Intent::Up => self.up = true,
            Intent::Down => self.down = true,
            Intent::Select => self.select = true,
            Intent::Delete => self.delete = true,
        }
        self
    }

    #[must_use]
    pub const fn contains(&self, intent: Intent) -> bool {
        match intent {
            Intent::Stop => self.stop,
            Intent::Up => self.up,
            Intent::Down => self.down,
            Intent::Select => self.select,
            Intent::Delete => self.delete,
        }
    }
}

/// Polled once per loop iteration.
pub trait IntentSource {
    fn poll(&mut self) -> Intents;
}

impl<F: FnMut() -> Intents> IntentSource for F {
    fn poll(&mut self) -> Intents {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Playing,
}

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    CapReached,
    EndOfData,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick<T> {
    /// Nothing is running in this slot.
    Idle,
    Running,
    Finished(T),
}

pub(crate) enum Slot<H: StorageHandle> {
    Idle,
    Capturing(Recording<H>),
    Playing(Playback<H>),
}

pub struct SessionContext<S: Storage> {
    pub(crate) storage: S,
    pub(crate) buffer: ChunkBuffer,
    pub(crate) downsampler: WaveformDownsampler,
    pub(crate) policy: PreviewPolicy,
    pub(crate) slot: Slot<S::Handle>,
}

impl<S: Storage> SessionContext<S> {
    #[must_use]
    pub fn new(
        storage: S,
        buffer: ChunkBuffer,
        downsampler: WaveformDownsampler,
        policy: PreviewPolicy,
    ) -> Self {
        Self {
            storage,
            buffer,
            downsampler,
            policy,
            slot: Slot::Idle,
        }
    }

    /// Allocate the process-wide buffer and preview state from config.
    pub fn from_config(storage: S, config: &Config) -> Result<Self> {
        let buffer =
            ChunkBuffer::allocate(config.audio.chunk_samples, config.audio.chunks_per_transfer)?;
        let downsampler = WaveformDownsampler::new(config.preview.width, config.preview.band());
        Ok(Self::new(storage, buffer, downsampler, config.preview.policy))
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        match self.slot {
            Slot::Idle => SessionState::Idle,
            Slot::Capturing(_) => SessionState::Capturing,
            Slot::Playing(_) => SessionState::Playing,
        }
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    #[must_use]
    pub const fn buffer(&self) -> &ChunkBuffer {
        &self.buffer
    }

    pub(crate) fn ensure_idle(&self) -> Result<()> {
        match self.state() {
            SessionState::Idle => Ok(()),
            SessionState::Capturing => Err(RecorderError::SessionBusy { active: "capture" }),
            SessionState::Playing => Err(RecorderError::SessionBusy { active: "playback" }),
        }
    }
}

/// `mm:ss` for a sample count at the container rate.
pub(crate) fn clock(samples: u64) -> String {
    let secs = samples / u64::from(SAMPLE_RATE);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
