use std::path::{Path, PathBuf};

use super::{HEADER_LEN, read_full};
use crate::error::{RecorderError, Result};
use crate::storage::{OpenMode, Storage, StorageHandle};

/// Outcome of one chunk read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRead {
    pub bytes: usize,
    pub end_of_data: bool,
}

/// Streams the payload of a stored container.
///
/// Reads run until the file ends rather than trusting the header's payload
/// size, so a truncated container still plays what it has.
pub struct WavContainerReader<H: StorageHandle> {
    path: PathBuf,
    handle: H,
    payload_read: u64,
}

impl<H: StorageHandle> WavContainerReader<H> {
    pub fn open<S>(storage: &S, path: &Path) -> Result<Self>
    where
        S: Storage<Handle = H>,
    {
        let handle = storage
            .open(path, OpenMode::Read)
            .map_err(|source| RecorderError::StorageUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            handle,
            payload_read: 0,
        })
    }

    /// Position the cursor at the first payload byte.
    pub fn skip_header(&mut self) -> Result<()> {
        self.handle.seek(HEADER_LEN)?;
        self.payload_read = 0;
        Ok(())
    }

    /// Fill `buf` from the payload. A read of zero bytes is end of data.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<ChunkRead> {
        let bytes = read_full(&mut self.handle, buf)?;
        self.payload_read += bytes as u64;
        Ok(ChunkRead {
            bytes,
            end_of_data: bytes == 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn payload_read(&self) -> u64 {
        self.payload_read
    }

    pub fn close(self) -> Result<()> {
        Ok(self.handle.close()?)
    }
}
