pub mod audio;
pub mod browser;
pub mod catalog;
pub mod config;
pub mod container;
pub mod error;
pub mod playback;
pub mod preview;
pub mod recording;
pub mod session;
pub mod storage;
pub mod waveform;

#[cfg(test)]
mod testing;
