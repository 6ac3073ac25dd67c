use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::catalog::NamingPolicy;
use crate::container::{BYTE_RATE, HeaderPolicy, MAX_PAYLOAD_BYTES, SAMPLE_RATE};
use crate::error::{RecorderError, Result};
use crate::waveform::{PixelBand, PreviewPolicy};

const fn default_chunk_samples() -> usize {
    240
}

const fn default_chunks_per_transfer() -> usize {
    1
}

const fn default_poll_timeout_ms() -> u64 {
    20
}

const fn default_sink_timeout_ms() -> u64 {
    500
}

fn default_directory() -> String {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join("recordings").to_string_lossy().to_string()
}

fn default_prefix() -> String {
    "REC".to_string()
}

const fn default_max_duration_secs() -> u64 {
    3600
}

const fn default_width() -> usize {
    128
}

const fn default_band_height() -> u32 {
    64
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub input_device: Option<String>,

    pub output_device: Option<String>,

    /// Samples per chunk, the unit the capture cap is counted in.
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,

    /// Chunks moved to or from storage in one operation.
    #[serde(default = "default_chunks_per_transfer")]
    pub chunks_per_transfer: usize,

    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    #[serde(default = "default_sink_timeout_ms")]
    pub sink_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            chunk_samples: default_chunk_samples(),
            chunks_per_transfer: default_chunks_per_transfer(),
            poll_timeout_ms: default_poll_timeout_ms(),
            sink_timeout_ms: default_sink_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_directory")]
    pub directory: String,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub naming: NamingPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            prefix: default_prefix(),
            naming: NamingPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    #[serde(default)]
    pub header_policy: HeaderPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: default_max_duration_secs(),
            header_policy: HeaderPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_width")]
    pub width: usize,

    #[serde(default)]
    pub band_origin: u32,

    #[serde(default = "default_band_height")]
    pub band_height: u32,

    #[serde(default)]
    pub policy: PreviewPolicy,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            band_origin: 0,
            band_height: default_band_height(),
            policy: PreviewPolicy::default(),
        }
    }
}

impl PreviewConfig {
    #[must_use]
    pub const fn band(&self) -> PixelBand {
        PixelBand {
            origin: self.band_origin,
            height: self.band_height,
        }
    }
}

impl CaptureConfig {
    /// Chunks a capture may write before it is stopped automatically: enough
    /// to reach the configured duration, but never more than a WAV header
    /// can describe.
    #[must_use]
    pub fn max_chunks(&self, chunk_samples: usize) -> u64 {
        if chunk_samples == 0 {
            return 0;
        }
        let chunk = chunk_samples as u64;
        let wanted = self
            .max_duration_secs
            .saturating_mul(u64::from(SAMPLE_RATE))
            .div_ceil(chunk);
        let representable = MAX_PAYLOAD_BYTES / chunk.saturating_mul(2);
        wanted.min(representable)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RecorderError::Config(format!(
                "config file not found: {}; create it or use --config to specify a path",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            RecorderError::Config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml_ng::from_str(&contents).map_err(|e| {
            RecorderError::Config(format!(
                "failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.audio.chunk_samples == 0 || self.audio.chunks_per_transfer == 0 {
            return Err(RecorderError::Config(
                "audio.chunk_samples and audio.chunks_per_transfer must be at least 1".to_string(),
            ));
        }
        if self.preview.width == 0 {
            return Err(RecorderError::Config(
                "preview.width must be at least 1".to_string(),
            ));
        }
        if self.capture.max_duration_secs == 0 {
            return Err(RecorderError::Config(
                "capture.max_duration_secs must be at least 1".to_string(),
            ));
        }
        let max_payload = self.capture.max_duration_secs.saturating_mul(u64::from(BYTE_RATE));
        if max_payload > MAX_PAYLOAD_BYTES {
            return Err(RecorderError::Config(format!(
                "capture.max_duration_secs of {} exceeds what a WAV header can describe ({}s)",
                self.capture.max_duration_secs,
                MAX_PAYLOAD_BYTES / u64::from(BYTE_RATE)
            )));
        }
        if self
            .preview
            .band_origin
            .checked_add(self.preview.band_height)
            .is_none()
        {
            return Err(RecorderError::Config(format!(
                "preview band {} + {} does not fit in 32 bits",
                self.preview.band_origin, self.preview.band_height
            )));
        }
        if self.capture.max_chunks(self.audio.chunk_samples) == 0 {
            return Err(RecorderError::Config(format!(
                "audio.chunk_samples of {} is too large to record even one chunk",
                self.audio.chunk_samples
            )));
        }
        if self.storage.prefix.chars().any(|c| c == '/' || c == '\\') {
            return Err(RecorderError::Config(format!(
                "storage.prefix may not contain path separators: {}",
                self.storage.prefix
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        config_dir.join("pocketrec/config.yaml")
    }

    /// Expand `~` in a path string to the user's home directory.
    #[must_use]
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }
}
