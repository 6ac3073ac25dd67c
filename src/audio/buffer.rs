use crate::error::{RecorderError, Result};

/// Fixed-capacity sample buffer shared by capture and playback.
///
/// Capacity is `chunk_len * chunks_per_transfer` samples and never changes
/// after allocation. A little-endian byte mirror of the same capacity is
/// allocated alongside so storage transfers never allocate.
pub struct ChunkBuffer {
    samples: Vec<i16>,
    bytes: Vec<u8>,
    len: usize,
    chunk_len: usize,
}

impl ChunkBuffer {
    pub fn allocate(chunk_len: usize, chunks_per_transfer: usize) -> Result<Self> {
        if chunk_len == 0 || chunks_per_transfer == 0 {
            return Err(RecorderError::Config(
                "chunk length and chunks per transfer must be non-zero".to_string(),
            ));
        }
        let capacity = chunk_len
            .checked_mul(chunks_per_transfer)
            .ok_or(RecorderError::Allocation { samples: usize::MAX })?;

        let mut samples = Vec::new();
        samples
            .try_reserve_exact(capacity)
            .map_err(|_| RecorderError::Allocation { samples: capacity })?;
        samples.resize(capacity, 0);

        let byte_len = capacity
            .checked_mul(2)
            .ok_or(RecorderError::Allocation { samples: capacity })?;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(byte_len)
            .map_err(|_| RecorderError::Allocation { samples: capacity })?;
        bytes.resize(byte_len, 0);

        tracing::debug!(
            "allocated chunk buffer: {capacity} samples ({chunk_len} x {chunks_per_transfer})"
        );

        Ok(Self {
            samples,
            bytes,
            len: 0,
            chunk_len,
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub const fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Number of whole chunks currently held.
    #[must_use]
    pub const fn complete_chunks(&self) -> usize {
        self.len / self.chunk_len
    }

    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples[..self.len]
    }

    /// Unfilled space, limited so the buffer holds at most `limit` samples.
    pub fn spare_mut(&mut self, limit: usize) -> &mut [i16] {
        let end = limit.min(self.capacity()).max(self.len);
        &mut self.samples[self.len..end]
    }

    /// Mark `n` samples of the spare area as filled.
    pub fn commit(&mut self, n: usize) {
        self.len = (self.len + n).min(self.capacity());
    }

    /// Encode the first `count` held samples as little-endian bytes.
    pub fn encode_le(&mut self, count: usize) -> &[u8] {
        let count = count.min(self.len);
        for (dst, s) in self
            .bytes
            .chunks_exact_mut(2)
            .zip(&self.samples[..count])
        {
            dst.copy_from_slice(&s.to_le_bytes());
        }
        &self.bytes[..count * 2]
    }

    /// Drop the first `count` samples, keeping any remainder at the front.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.len);
        self.samples.copy_within(count..self.len, 0);
        self.len -= count;
    }

    /// The whole byte mirror, for reading payload straight from storage.
    pub fn byte_area_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Decode `nbytes` of the byte mirror into samples, replacing the contents.
    /// A trailing odd byte is ignored.
    pub fn decode_le(&mut self, nbytes: usize) {
        let count = (nbytes.min(self.bytes.len())) / 2;
        for (dst, src) in self.samples[..count]
            .iter_mut()
            .zip(self.bytes.chunks_exact(2))
        {
            *dst = i16::from_le_bytes([src[0], src[1]]);
        }
        self.len = count;
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}
