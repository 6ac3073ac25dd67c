//! In-memory storage and scripted ports for unit tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::audio::{SampleSink, SampleSource};
use crate::error::{RecorderError, Result};
use crate::preview::PreviewSink;
use crate::storage::{OpenMode, Storage, StorageHandle};
use crate::waveform::WaveformTrace;

#[derive(Default)]
struct MemInner {
    files: BTreeMap<PathBuf, Vec<u8>>,
    write_calls: usize,
    short_write: Option<(usize, usize)>,
    read_calls: usize,
    failing_read: Option<usize>,
    open_handles: usize,
}

/// Shared in-memory volume. Clones see the same files.
#[derive(Clone, Default)]
pub struct MemStorage {
    inner: Rc<RefCell<MemInner>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &Path, bytes: Vec<u8>) {
        self.inner.borrow_mut().files.insert(path.to_path_buf(), bytes);
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.inner.borrow().files.get(path).cloned()
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.inner.borrow().files.contains_key(path)
    }

    pub fn open_handles(&self) -> usize {
        self.inner.borrow().open_handles
    }

    /// Make write call number `call` (0-based, counted across all handles)
    /// accept only `accepted` bytes.
    pub fn short_write_at(&self, call: usize, accepted: usize) {
        self.inner.borrow_mut().short_write = Some((call, accepted));
    }

    /// Make read call number `call` (0-based, counted across all handles) fail.
    pub fn fail_read_at(&self, call: usize) {
        self.inner.borrow_mut().failing_read = Some(call);
    }
}

pub struct MemHandle {
    inner: Rc<RefCell<MemInner>>,
    path: PathBuf,
    pos: usize,
    writable: bool,
}

impl Drop for MemHandle {
    fn drop(&mut self) {
        self.inner.borrow_mut().open_handles -= 1;
    }
}

impl StorageHandle for MemHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.borrow_mut();
        let call = inner.read_calls;
        inner.read_calls += 1;
        if inner.failing_read == Some(call) {
            return Err(io::Error::other("injected read fault"));
        }
        let data = inner
            .files
            .get(&self.path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        let start = self.pos.min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        drop(inner);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        let mut inner = self.inner.borrow_mut();
        let call = inner.write_calls;
        inner.write_calls += 1;
        let n = match inner.short_write {
            Some((at, accepted)) if at == call => accepted.min(buf.len()),
            _ => buf.len(),
        };
        let data = inner
            .files
            .get_mut(&self.path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        if data.len() < self.pos + n {
            data.resize(self.pos + n, 0);
        }
        data[self.pos..self.pos + n].copy_from_slice(&buf[..n]);
        drop(inner);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.pos = offset as usize;
        Ok(())
    }

    fn size(&mut self) -> io::Result<u64> {
        let inner = self.inner.borrow();
        Ok(inner.files.get(&self.path).map_or(0, Vec::len) as u64)
    }

    fn close(self) -> io::Result<()> {
        Ok(())
    }
}

impl Storage for MemStorage {
    type Handle = MemHandle;
    type Entries = std::vec::IntoIter<io::Result<String>>;

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<MemHandle> {
        let mut inner = self.inner.borrow_mut();
        match mode {
            OpenMode::Read | OpenMode::Update => {
                if !inner.files.contains_key(path) {
                    return Err(io::Error::from(io::ErrorKind::NotFound));
                }
            }
            OpenMode::Create => {
                inner.files.insert(path.to_path_buf(), Vec::new());
            }
        }
        inner.open_handles += 1;
        Ok(MemHandle {
            inner: Rc::clone(&self.inner),
            path: path.to_path_buf(),
            pos: 0,
            writable: mode != OpenMode::Read,
        })
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.inner
            .borrow_mut()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn list_entries(&self, dir: &Path) -> io::Result<Self::Entries> {
        let names: Vec<io::Result<String>> = self
            .inner
            .borrow()
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name())
            .map(|n| Ok(n.to_string_lossy().into_owned()))
            .collect();
        Ok(names.into_iter())
    }
}

/// Source that replays scripted blocks; an empty block is a poll with nothing
/// ready. Once the script runs out every poll returns zero.
#[derive(Default)]
pub struct ScriptedSource {
    blocks: VecDeque<Vec<i16>>,
    fail_start: bool,
    fail_poll_at: Option<usize>,
    pub enabled: bool,
    pub polls: usize,
}

impl ScriptedSource {
    pub fn new(blocks: Vec<Vec<i16>>) -> Self {
        Self {
            blocks: blocks.into(),
            ..Self::default()
        }
    }

    /// `count` blocks of `len` samples, numbered consecutively from 0.
    pub fn ramp(count: usize, len: usize) -> Self {
        let blocks = (0..count)
            .map(|b| (0..len).map(|i| ((b * len + i) % 30_000) as i16).collect())
            .collect();
        Self::new(blocks)
    }

    /// A source whose hardware never comes up.
    pub fn refusing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    /// Poll number `poll` (0-based) fails instead of returning samples.
    #[must_use]
    pub fn failing_poll(mut self, poll: usize) -> Self {
        self.fail_poll_at = Some(poll);
        self
    }
}

impl SampleSource for ScriptedSource {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(RecorderError::Audio("source refused to start".to_string()));
        }
        self.enabled = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.enabled = false;
        Ok(())
    }

    fn poll_block(&mut self, out: &mut [i16]) -> Result<usize> {
        let poll = self.polls;
        self.polls += 1;
        if self.fail_poll_at == Some(poll) {
            return Err(RecorderError::Audio("input stream closed".to_string()));
        }
        let Some(mut block) = self.blocks.pop_front() else {
            return Ok(0);
        };
        let n = block.len().min(out.len());
        out[..n].copy_from_slice(&block[..n]);
        if n < block.len() {
            self.blocks.push_front(block.split_off(n));
        }
        Ok(n)
    }
}

/// Sink that keeps every block it is handed.
#[derive(Default)]
pub struct CollectingSink {
    pub blocks: Vec<Vec<i16>>,
    pub stops: usize,
    pub fail_on_call: Option<usize>,
}

impl SampleSink for CollectingSink {
    fn play_block(&mut self, samples: &[i16], sample_rate: u32) -> Result<()> {
        assert_eq!(sample_rate, crate::container::SAMPLE_RATE);
        if self.fail_on_call == Some(self.blocks.len()) {
            return Err(RecorderError::Audio("sink stalled".to_string()));
        }
        self.blocks.push(samples.to_vec());
        Ok(())
    }

    fn is_busy(&self) -> bool {
        false
    }

    fn stop(&mut self) -> Result<()> {
        self.stops += 1;
        Ok(())
    }
}

/// Preview sink that records what it was asked to draw.
#[derive(Default)]
pub struct CollectingPreview {
    pub frames: Vec<(WaveformTrace, String)>,
    pub reports: Vec<String>,
}

impl PreviewSink for CollectingPreview {
    fn render(&mut self, trace: &WaveformTrace, status: &str) {
        self.frames.push((trace.clone(), status.to_string()));
    }

    fn report(&mut self, status: &str) {
        self.reports.push(status.to_string());
    }
}

pub fn le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
