//! Storage port: the file operations the pipeline needs from the volume it
//! records onto.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// How a container is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only, the file must exist.
    Read,
    /// Create or truncate for writing; reads and seeks are allowed too.
    Create,
    /// Read and write an existing file in place.
    Update,
}

/// An open file on the storage volume.
///
/// `read` and `write` report how many bytes moved, the caller decides what a
/// short count means.
pub trait StorageHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn seek(&mut self, offset: u64) -> io::Result<()>;
    fn size(&mut self) -> io::Result<u64>;
    fn close(self) -> io::Result<()>;
}

pub trait Storage {
    type Handle: StorageHandle;
    type Entries: Iterator<Item = io::Result<String>>;

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Self::Handle>;
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Lazily lists file names in `dir`. Calling it again restarts the listing.
    fn list_entries(&self, dir: &Path) -> io::Result<Self::Entries>;
}

/// Storage backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

pub struct FsHandle {
    file: File,
}

impl StorageHandle for FsHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset)).map(|_| ())
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn close(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

pub struct FsEntries {
    inner: fs::ReadDir,
}

impl Iterator for FsEntries {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            match entry.file_type() {
                Ok(t) if t.is_file() => {}
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
            return Some(Ok(entry.file_name().to_string_lossy().into_owned()));
        }
    }
}

impl Storage for FsStorage {
    type Handle = FsHandle;
    type Entries = FsEntries;

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<FsHandle> {
        let file = match mode {
            OpenMode::Read => File::open(path)?,
            OpenMode::Create => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    fs::create_dir_all(parent)?;
                }
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)?
            }
            OpenMode::Update => OpenOptions::new().read(true).write(true).open(path)?,
        };
        Ok(FsHandle { file })
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn list_entries(&self, dir: &Path) -> io::Result<FsEntries> {
        Ok(FsEntries {
            inner: fs::read_dir(dir)?,
        })
    }
}
