use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{FinalSize, HEADER_LEN, WavHeader, patch_sizes, write_exact};
use crate::error::{RecorderError, Result};
use crate::storage::{OpenMode, Storage, StorageHandle};

/// How the size fields are produced when a container is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Provisional header carries zero sizes; finalize measures the file.
    #[default]
    #[serde(alias = "measure")]
    MeasureOnClose,
    /// Provisional header carries the caller's upper-bound estimate; finalize
    /// trusts the written-sample counter.
    Precompute,
}

/// Owns one output container from creation to finalize.
pub struct WavContainerWriter<H: StorageHandle> {
    path: PathBuf,
    handle: Option<H>,
    policy: HeaderPolicy,
    samples_written: u64,
    /// Set once a write failed; finalize then measures instead of counting.
    damaged: bool,
    finalized: Option<FinalSize>,
}

impl<H: StorageHandle> WavContainerWriter<H> {
    /// Create the container and write its provisional header.
    ///
    /// `estimated_payload` is only used by [`HeaderPolicy::Precompute`].
    pub fn open<S>(
        storage: &S,
        path: &Path,
        policy: HeaderPolicy,
        estimated_payload: u64,
    ) -> Result<Self>
    where
        S: Storage<Handle = H>,
    {
        let mut handle = storage
            .open(path, OpenMode::Create)
            .map_err(|source| RecorderError::StorageUnavailable {
                path: path.to_path_buf(),
                source,
            })?;

        let provisional = match policy {
            HeaderPolicy::MeasureOnClose => WavHeader::placeholder(),
            HeaderPolicy::Precompute => WavHeader::new(FinalSize::for_payload(estimated_payload)?),
        };
        if let Err(e) = write_exact(&mut handle, &provisional.encode(), "header write") {
            let _ = handle.close();
            let _ = storage.remove(path);
            return Err(e);
        }

        tracing::debug!("opened {} ({policy:?})", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            handle: Some(handle),
            policy,
            samples_written: 0,
            damaged: false,
            finalized: None,
        })
    }

    /// Append little-endian 16-bit samples after the header.
    pub fn append_chunk(&mut self, payload: &[u8]) -> Result<usize> {
        let handle = self.handle.as_mut().ok_or_else(|| {
            RecorderError::Other(format!("{} is already finalized", self.path.display()))
        })?;
        match write_exact(handle, payload, "chunk write") {
            Ok(n) => {
                self.samples_written += (n / 2) as u64;
                Ok(n)
            }
            Err(e) => {
                self.damaged = true;
                Err(e)
            }
        }
    }

    /// Patch both size fields and close the handle.
    ///
    /// Calling it again after success returns the same sizes without touching
    /// storage.
    pub fn finalize(&mut self) -> Result<FinalSize> {
        let Some(mut handle) = self.handle.take() else {
            return self.finalized.ok_or_else(|| {
                RecorderError::Other(format!(
                    "{} was closed without a valid header",
                    self.path.display()
                ))
            });
        };

        let size = match self.final_size(&mut handle) {
            Ok(size) => size,
            Err(e) => {
                let _ = handle.close();
                return Err(e);
            }
        };
        if let Err(e) = patch_sizes(&mut handle, size) {
            let _ = handle.close();
            return Err(e);
        }
        handle.close()?;

        tracing::info!(
            "finalized {}: {} payload bytes ({:.2}s)",
            self.path.display(),
            size.payload_bytes,
            size.duration_secs()
        );
        self.finalized = Some(size);
        Ok(size)
    }

    fn final_size(&self, handle: &mut H) -> Result<FinalSize> {
        if self.policy == HeaderPolicy::MeasureOnClose || self.damaged {
            let on_disk = handle.size()?;
            FinalSize::for_payload(on_disk.saturating_sub(HEADER_LEN))
        } else {
            FinalSize::for_payload(self.samples_written * 2)
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn samples_written(&self) -> u64 {
        self.samples_written
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::inspect;
    use crate::storage::FsStorage;
    use crate::testing::{MemStorage, le_bytes};

    fn chunk(seed: i16, len: usize) -> Vec<i16> {
        (0..len).map(|i| seed.wrapping_mul(100).wrapping_add(i as i16)).collect()
    }

    #[test]
    fn sizes_match_appended_chunks_under_both_policies() {
        for policy in [HeaderPolicy::MeasureOnClose, HeaderPolicy::Precompute] {
            let storage = MemStorage::new();
            let path = Path::new("REC0001.wav");
            let mut w = WavContainerWriter::open(&storage, path, policy, 1_000_000)
                .unwrap_or_else(|e| panic!("{e}"));
            for n in 0..5 {
                w.append_chunk(&le_bytes(&chunk(n, 240)))
                    .unwrap_or_else(|e| panic!("{e}"));
            }
            let size = w.finalize().unwrap_or_else(|e| panic!("{e}"));
            assert_eq!(size.payload_bytes, 5 * 240 * 2, "{policy:?}");
            assert_eq!(size.file_size, 36 + 5 * 240 * 2, "{policy:?}");

            let info = inspect(&storage, path).unwrap_or_else(|e| panic!("{e}"));
            assert_eq!(info.on_disk_bytes, 44 + 2400);

            let bytes = storage.contents(path).unwrap_or_default();
            let expected: Vec<u8> = (0..5).flat_map(|n| le_bytes(&chunk(n, 240))).collect();
            assert_eq!(&bytes[44..], expected.as_slice());
        }
    }

    #[test]
    fn precompute_writes_estimate_provisionally() {
        let storage = MemStorage::new();
        let path = Path::new("REC0001.wav");
        let _w = WavContainerWriter::open(&storage, path, HeaderPolicy::Precompute, 9600)
            .unwrap_or_else(|e| panic!("{e}"));
        let bytes = storage.contents(path).unwrap_or_default();
        assert_eq!(bytes.len(), 44);
        assert_eq!(&bytes[40..44], &9600u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &9636u32.to_le_bytes());
    }

    #[test]
    fn measure_writes_zeroed_placeholder() {
        let storage = MemStorage::new();
        let path = Path::new("REC0001.wav");
        let _w = WavContainerWriter::open(&storage, path, HeaderPolicy::MeasureOnClose, 9600)
            .unwrap_or_else(|e| panic!("{e}"));
        let bytes = storage.contents(path).unwrap_or_default();
        assert_eq!(&bytes[4..8], &[0; 4]);
        assert_eq!(&bytes[40..44], &[0; 4]);
    }

    #[test]
    fn second_finalize_is_a_no_op() {
        let storage = MemStorage::new();
        let path = Path::new("REC0001.wav");
        let mut w = WavContainerWriter::open(&storage, path, HeaderPolicy::MeasureOnClose, 0)
            .unwrap_or_else(|e| panic!("{e}"));
        w.append_chunk(&le_bytes(&chunk(1, 240)))
            .unwrap_or_else(|e| panic!("{e}"));
        let first = w.finalize().unwrap_or_else(|e| panic!("{e}"));
        let snapshot = storage.contents(path);

        let second = w.finalize().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(first, second);
        assert_eq!(storage.contents(path), snapshot);
        assert!(!w.is_open());
        assert_eq!(storage.open_handles(), 0);
    }

    #[test]
    fn append_after_finalize_is_rejected() {
        let storage = MemStorage::new();
        let path = Path::new("REC0001.wav");
        let mut w = WavContainerWriter::open(&storage, path, HeaderPolicy::MeasureOnClose, 0)
            .unwrap_or_else(|e| panic!("{e}"));
        w.finalize().unwrap_or_else(|e| panic!("{e}"));
        assert!(w.append_chunk(&[0, 0]).is_err());
    }

    #[test]
    fn short_write_is_fatal_and_header_still_matches_disk() {
        let storage = MemStorage::new();
        let path = Path::new("REC0001.wav");
        // call 0 is the header, call 2 is the second chunk
        storage.short_write_at(2, 100);
        let mut w = WavContainerWriter::open(&storage, path, HeaderPolicy::Precompute, 48_000)
            .unwrap_or_else(|e| panic!("{e}"));
        w.append_chunk(&le_bytes(&chunk(1, 240)))
            .unwrap_or_else(|e| panic!("{e}"));
        let err = w.append_chunk(&le_bytes(&chunk(2, 240))).unwrap_err();
        assert!(matches!(
            err,
            RecorderError::ShortIo {
                expected: 480,
                actual: 100,
                ..
            }
        ));

        let size = w.finalize().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(size.payload_bytes, 580);
        assert!(inspect(&storage, path).is_ok());
    }

    #[test]
    fn create_failure_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap_or_else(|e| panic!("{e}"));
        // a regular file cannot act as a parent directory
        let result = WavContainerWriter::open(
            &FsStorage,
            &blocker.join("REC0001.wav"),
            HeaderPolicy::MeasureOnClose,
            0,
        );
        assert!(matches!(
            result,
            Err(RecorderError::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn finalized_file_decodes_with_hound() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("REC0001.wav");
        let samples: Vec<i16> = (0..720).map(|i| (i * 37 - 9000) as i16).collect();

        let mut w = WavContainerWriter::open(&FsStorage, &path, HeaderPolicy::MeasureOnClose, 0)
            .unwrap_or_else(|e| panic!("{e}"));
        for block in samples.chunks(240) {
            w.append_chunk(&le_bytes(block))
                .unwrap_or_else(|e| panic!("{e}"));
        }
        w.finalize().unwrap_or_else(|e| panic!("{e}"));

        let reader = hound::WavReader::open(&path).unwrap_or_else(|e| panic!("{e}"));
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        let decoded: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<_, _>>()
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(decoded, samples);
    }
}
