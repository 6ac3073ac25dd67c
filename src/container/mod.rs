//! The on-disk WAV container: a fixed 44-byte RIFF/WAVE header followed by
//! 16-bit little-endian mono PCM.

pub mod reader;
pub mod writer;

use std::io;
use std::path::Path;

use crate::error::{RecorderError, Result};
use crate::storage::{OpenMode, Storage, StorageHandle};

pub use self::reader::{ChunkRead, WavContainerReader};
pub use self::writer::{HeaderPolicy, WavContainerWriter};

pub const SAMPLE_RATE: u32 = 16_000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
pub const BYTE_RATE: u32 = SAMPLE_RATE * BYTES_PER_SAMPLE as u32;

/// Size of the fixed header; the payload starts here.
pub const HEADER_LEN: u64 = 44;

/// Largest payload whose RIFF size field (`36 + payload`) still fits in 32 bits.
pub const MAX_PAYLOAD_BYTES: u64 = u32::MAX as u64 - 36;

const FILE_SIZE_OFFSET: u64 = 4;
const PAYLOAD_SIZE_OFFSET: u64 = 40;

/// Size fields of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalSize {
    /// Value of the RIFF size field, total bytes minus 8.
    pub file_size: u32,
    pub payload_bytes: u32,
}

impl FinalSize {
    pub fn for_payload(payload_bytes: u64) -> Result<Self> {
        if payload_bytes > MAX_PAYLOAD_BYTES {
            return Err(RecorderError::Other(format!(
                "payload of {payload_bytes} bytes does not fit a WAV header"
            )));
        }
        let payload_bytes = payload_bytes as u32;
        Ok(Self {
            file_size: 36 + payload_bytes,
            payload_bytes,
        })
    }

    #[must_use]
    pub const fn on_disk_bytes(&self) -> u64 {
        HEADER_LEN + self.payload_bytes as u64
    }

    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        f64::from(self.payload_bytes) / f64::from(BYTE_RATE)
    }
}

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub file_size: u32,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub payload_bytes: u32,
}

impl WavHeader {
    #[must_use]
    pub const fn new(size: FinalSize) -> Self {
        Self {
            file_size: size.file_size,
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            byte_rate: BYTE_RATE,
            block_align: BYTES_PER_SAMPLE,
            bits_per_sample: BITS_PER_SAMPLE,
            payload_bytes: size.payload_bytes,
        }
    }

    /// A header with both size fields zeroed, for a container still being written.
    #[must_use]
    pub const fn placeholder() -> Self {
        Self::new(FinalSize {
            file_size: 0,
            payload_bytes: 0,
        })
    }

    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN as usize] {
        let mut out = [0u8; HEADER_LEN as usize];
        out[0..4].copy_from_slice(b"RIFF");
        out[4..8].copy_from_slice(&self.file_size.to_le_bytes());
        out[8..12].copy_from_slice(b"WAVE");
        out[12..16].copy_from_slice(b"fmt ");
        out[16..20].copy_from_slice(&16u32.to_le_bytes());
        out[20..22].copy_from_slice(&1u16.to_le_bytes());
        out[22..24].copy_from_slice(&self.channels.to_le_bytes());
        out[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[28..32].copy_from_slice(&self.byte_rate.to_le_bytes());
        out[32..34].copy_from_slice(&self.block_align.to_le_bytes());
        out[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        out[36..40].copy_from_slice(b"data");
        out[40..44].copy_from_slice(&self.payload_bytes.to_le_bytes());
        out
    }

    /// Parse a header, returning a human-readable reason on mismatch.
    pub fn decode(bytes: &[u8; HEADER_LEN as usize]) -> std::result::Result<Self, String> {
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        for (at, magic) in [(0, b"RIFF"), (8, b"WAVE"), (12, b"fmt "), (36, b"data")] {
            if &bytes[at..at + 4] != magic {
                return Err(format!(
                    "expected {:?} at offset {at}",
                    String::from_utf8_lossy(magic)
                ));
            }
        }
        if u32_at(16) != 16 {
            return Err(format!("unexpected fmt chunk size {}", u32_at(16)));
        }
        if u16_at(20) != 1 {
            return Err(format!("audio format {} is not PCM", u16_at(20)));
        }

        let header = Self {
            file_size: u32_at(4),
            channels: u16_at(22),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            block_align: u16_at(32),
            bits_per_sample: u16_at(34),
            payload_bytes: u32_at(40),
        };

        if header.channels != CHANNELS
            || header.sample_rate != SAMPLE_RATE
            || header.bits_per_sample != BITS_PER_SAMPLE
        {
            return Err(format!(
                "unsupported stream: {} ch, {} Hz, {} bit",
                header.channels, header.sample_rate, header.bits_per_sample
            ));
        }
        if header.byte_rate != BYTE_RATE || header.block_align != BYTES_PER_SAMPLE {
            return Err(format!(
                "inconsistent byte rate {} / block align {}",
                header.byte_rate, header.block_align
            ));
        }

        Ok(header)
    }
}

/// Header and size facts about a stored container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerInfo {
    pub header: WavHeader,
    pub on_disk_bytes: u64,
}

impl ContainerInfo {
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        f64::from(self.header.payload_bytes) / f64::from(BYTE_RATE)
    }
}

/// Read until `buf` is full or the handle reports end of file.
pub(crate) fn read_full<H: StorageHandle>(handle: &mut H, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match handle.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// One write call that must move every byte.
pub(crate) fn write_exact<H: StorageHandle>(
    handle: &mut H,
    bytes: &[u8],
    op: &'static str,
) -> Result<usize> {
    let written = handle.write(bytes)?;
    if written < bytes.len() {
        return Err(RecorderError::ShortIo {
            op,
            expected: bytes.len(),
            actual: written,
        });
    }
    Ok(written)
}

/// Overwrite the two size fields in place, leaving the rest of the header untouched.
pub(crate) fn patch_sizes<H: StorageHandle>(handle: &mut H, size: FinalSize) -> Result<()> {
    handle.seek(FILE_SIZE_OFFSET)?;
    write_exact(handle, &size.file_size.to_le_bytes(), "header patch")?;
    handle.seek(PAYLOAD_SIZE_OFFSET)?;
    write_exact(handle, &size.payload_bytes.to_le_bytes(), "header patch")?;
    Ok(())
}

fn open_or_unavailable<S: Storage>(storage: &S, path: &Path, mode: OpenMode) -> Result<S::Handle> {
    storage
        .open(path, mode)
        .map_err(|source| RecorderError::StorageUnavailable {
            path: path.to_path_buf(),
            source,
        })
}

fn corrupt(path: &Path, reason: impl Into<String>) -> RecorderError {
    RecorderError::CorruptContainer {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Validate a stored container: header well-formed and size fields matching
/// the bytes actually on disk.
pub fn inspect<S: Storage>(storage: &S, path: &Path) -> Result<ContainerInfo> {
    let mut handle = open_or_unavailable(storage, path, OpenMode::Read)?;
    let on_disk_bytes = handle.size()?;

    let mut raw = [0u8; HEADER_LEN as usize];
    let n = read_full(&mut handle, &mut raw)?;
    handle.close()?;
    if n < raw.len() {
        return Err(corrupt(path, format!("only {n} bytes, shorter than the header")));
    }

    let header = WavHeader::decode(&raw).map_err(|reason| corrupt(path, reason))?;

    if u64::from(header.payload_bytes) + HEADER_LEN != on_disk_bytes {
        return Err(corrupt(
            path,
            format!(
                "header claims {} payload bytes but {} are on disk",
                header.payload_bytes,
                on_disk_bytes.saturating_sub(HEADER_LEN)
            ),
        ));
    }
    if u64::from(header.file_size) != u64::from(header.payload_bytes) + 36 {
        return Err(corrupt(
            path,
            format!(
                "RIFF size {} disagrees with payload size {}",
                header.file_size, header.payload_bytes
            ),
        ));
    }

    Ok(ContainerInfo {
        header,
        on_disk_bytes,
    })
}

/// Rewrite the header of a container from its on-disk size, e.g. after a
/// capture was cut off before finalize ran.
pub fn repair<S: Storage>(storage: &S, path: &Path) -> Result<FinalSize> {
    let mut handle = open_or_unavailable(storage, path, OpenMode::Update)?;
    let on_disk = handle.size()?;
    if on_disk < HEADER_LEN {
        handle.close()?;
        return Err(corrupt(path, "shorter than the header, nothing to repair"));
    }

    let mut raw = [0u8; HEADER_LEN as usize];
    read_full(&mut handle, &mut raw)?;
    if &raw[0..4] != b"RIFF" || &raw[8..12] != b"WAVE" {
        handle.close()?;
        return Err(corrupt(path, "not a RIFF/WAVE file"));
    }

    let size = FinalSize::for_payload(on_disk - HEADER_LEN)?;
    handle.seek(0)?;
    write_exact(&mut handle, &WavHeader::new(size).encode(), "header rewrite")?;
    handle.close()?;

    tracing::info!(
        "repaired {}: {} payload bytes",
        path.display(),
        size.payload_bytes
    );
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemStorage;

    #[test]
    fn header_layout_is_byte_exact() {
        let size = FinalSize::for_payload(1440).unwrap_or_else(|e| panic!("{e}"));
        let raw = WavHeader::new(size).encode();

        assert_eq!(&raw[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]), 1476);
        assert_eq!(&raw[8..16], b"WAVEfmt ");
        assert_eq!(&raw[16..20], &16u32.to_le_bytes());
        assert_eq!(&raw[20..22], &1u16.to_le_bytes());
        assert_eq!(&raw[22..24], &1u16.to_le_bytes());
        assert_eq!(&raw[24..28], &16_000u32.to_le_bytes());
        assert_eq!(&raw[28..32], &32_000u32.to_le_bytes());
        assert_eq!(&raw[32..34], &2u16.to_le_bytes());
        assert_eq!(&raw[34..36], &16u16.to_le_bytes());
        assert_eq!(&raw[36..40], b"data");
        assert_eq!(&raw[40..44], &1440u32.to_le_bytes());
    }

    #[test]
    fn decode_accepts_encoded_header() {
        let size = FinalSize::for_payload(640).unwrap_or_else(|e| panic!("{e}"));
        let header = WavHeader::new(size);
        assert_eq!(WavHeader::decode(&header.encode()), Ok(header));
    }

    #[test]
    fn decode_rejects_foreign_formats() {
        let mut raw = WavHeader::placeholder().encode();
        raw[22..24].copy_from_slice(&2u16.to_le_bytes());
        let err = WavHeader::decode(&raw).unwrap_err();
        assert!(err.contains("2 ch"));

        let mut raw = WavHeader::placeholder().encode();
        raw[0..4].copy_from_slice(b"RIFX");
        assert!(WavHeader::decode(&raw).is_err());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        assert!(FinalSize::for_payload(MAX_PAYLOAD_BYTES).is_ok());
        assert!(FinalSize::for_payload(MAX_PAYLOAD_BYTES + 1).is_err());
    }

    #[test]
    fn inspect_detects_truncation() {
        let storage = MemStorage::new();
        let path = Path::new("rec/REC0001.wav");
        let size = FinalSize::for_payload(100).unwrap_or_else(|e| panic!("{e}"));
        let mut bytes = WavHeader::new(size).encode().to_vec();
        bytes.extend_from_slice(&[0u8; 60]);
        storage.insert(path, bytes);

        let err = inspect(&storage, path).unwrap_err();
        assert!(matches!(err, RecorderError::CorruptContainer { .. }), "{err}");
    }

    #[test]
    fn inspect_missing_is_storage_unavailable() {
        let storage = MemStorage::new();
        let err = inspect(&storage, Path::new("nope.wav")).unwrap_err();
        assert!(matches!(err, RecorderError::StorageUnavailable { .. }), "{err}");
    }

    #[test]
    fn repair_restores_consistency() {
        let storage = MemStorage::new();
        let path = Path::new("REC0002.wav");
        let mut bytes = WavHeader::placeholder().encode().to_vec();
        bytes.extend_from_slice(&[1u8; 480]);
        storage.insert(path, bytes);

        assert!(inspect(&storage, path).is_err());
        let size = repair(&storage, path).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(size.payload_bytes, 480);

        let info = inspect(&storage, path).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(info.on_disk_bytes, 524);
        assert_eq!(info.header.file_size, 516);
        assert!((info.duration_secs() - 0.015).abs() < 1e-9);
    }

    #[test]
    fn repair_refuses_non_wav() {
        let storage = MemStorage::new();
        let path = Path::new("notes.wav");
        storage.insert(path, vec![b'x'; 64]);
        assert!(matches!(
            repair(&storage, path),
            Err(RecorderError::CorruptContainer { .. })
        ));
    }
}
