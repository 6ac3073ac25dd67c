//! Downsampling of sample blocks into fixed-width traces for the live preview.

use serde::Deserialize;

const DOMAIN_MIN: i64 = i16::MIN as i64;
const DOMAIN_RANGE: i64 = u16::MAX as i64;

/// Vertical pixel band the signed 16-bit domain is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBand {
    pub origin: u32,
    pub height: u32,
}

impl PixelBand {
    /// `origin + ((sample - i16::MIN) * height) / 65535`
    #[must_use]
    pub const fn scale(&self, sample: i16) -> u32 {
        let offset = (sample as i64 - DOMAIN_MIN) * self.height as i64 / DOMAIN_RANGE;
        self.origin.saturating_add(offset as u32)
    }
}

/// Pixel rows covered by one display column, `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    pub low: u32,
    pub high: u32,
}

impl Extent {
    const fn point(px: u32) -> Self {
        Self { low: px, high: px }
    }
}

/// How a block becomes a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewPolicy {
    /// Column `i` shows sample `i * L / W`.
    #[default]
    Stride,
    /// Column shows the min and max of its slice, at least one adjacent pair.
    MinMax,
    /// Each block adds one column to a scrolling window.
    Sliding,
}

/// A fixed-width row of extents, oldest column first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformTrace {
    columns: Vec<Extent>,
}

impl WaveformTrace {
    #[must_use]
    pub fn flat(width: usize, band: PixelBand) -> Self {
        Self {
            columns: vec![Extent::point(band.scale(0)); width],
        }
    }

    #[must_use]
    pub fn stride_pick(block: &[i16], width: usize, band: PixelBand) -> Self {
        let mut trace = Self::flat(width, band);
        stride_pick_into(block, band, &mut trace.columns);
        trace
    }

    #[must_use]
    pub fn min_max(block: &[i16], width: usize, band: PixelBand) -> Self {
        let mut trace = Self::flat(width, band);
        min_max_into(block, band, &mut trace.columns);
        trace
    }

    #[must_use]
    pub fn columns(&self) -> &[Extent] {
        &self.columns
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

fn stride_pick_into(block: &[i16], band: PixelBand, out: &mut [Extent]) {
    let width = out.len();
    if block.is_empty() {
        out.fill(Extent::point(band.scale(0)));
        return;
    }
    for (i, col) in out.iter_mut().enumerate() {
        *col = Extent::point(band.scale(block[i * block.len() / width]));
    }
}

fn min_max_into(block: &[i16], band: PixelBand, out: &mut [Extent]) {
    let width = out.len();
    let len = block.len();
    if len == 0 {
        out.fill(Extent::point(band.scale(0)));
        return;
    }
    for (i, col) in out.iter_mut().enumerate() {
        let start = (i * len / width).min(len - 1);
        let end = ((i + 1) * len / width).max(start + 2).min(len);
        let slice = &block[start..end];
        let lo = slice.iter().copied().min().unwrap_or(0);
        let hi = slice.iter().copied().max().unwrap_or(0);
        *col = Extent {
            low: band.scale(lo),
            high: band.scale(hi),
        };
    }
}

/// Ring of extents with an O(1) push; reading yields oldest first.
#[derive(Debug, Clone)]
pub struct SlidingTrace {
    ring: Vec<Extent>,
    cursor: usize,
}

impl SlidingTrace {
    #[must_use]
    pub fn new(width: usize, fill: Extent) -> Self {
        Self {
            ring: vec![fill; width],
            cursor: 0,
        }
    }

    pub fn push(&mut self, extent: Extent) {
        if self.ring.is_empty() {
            return;
        }
        self.ring[self.cursor] = extent;
        self.cursor = (self.cursor + 1) % self.ring.len();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extent> {
        self.ring[self.cursor..]
            .iter()
            .chain(self.ring[..self.cursor].iter())
    }
}

/// Produces preview traces and remembers the previous one so callers can
/// redraw only the columns that changed.
pub struct WaveformDownsampler {
    band: PixelBand,
    current: WaveformTrace,
    previous: WaveformTrace,
    sliding: SlidingTrace,
    changed: Vec<usize>,
}

impl WaveformDownsampler {
    #[must_use]
    pub fn new(width: usize, band: PixelBand) -> Self {
        let flat = WaveformTrace::flat(width, band);
        Self {
            band,
            sliding: SlidingTrace::new(width, Extent::point(band.scale(0))),
            previous: flat.clone(),
            current: flat,
            changed: Vec::with_capacity(width),
        }
    }

    #[must_use]
    pub const fn band(&self) -> PixelBand {
        self.band
    }

    /// Rebuild the trace from `block` and record which columns moved.
    pub fn update(&mut self, block: &[i16], policy: PreviewPolicy) -> &WaveformTrace {
        std::mem::swap(&mut self.current, &mut self.previous);
        match policy {
            PreviewPolicy::Stride => stride_pick_into(block, self.band, &mut self.current.columns),
            PreviewPolicy::MinMax => min_max_into(block, self.band, &mut self.current.columns),
            PreviewPolicy::Sliding => {
                let mut summary = [Extent::default()];
                min_max_into(block, self.band, &mut summary);
                self.sliding.push(summary[0]);
                for (dst, src) in self.current.columns.iter_mut().zip(self.sliding.iter()) {
                    *dst = *src;
                }
            }
        }

        self.changed.clear();
        self.changed.extend(
            self.current
                .columns
                .iter()
                .zip(&self.previous.columns)
                .enumerate()
                .filter(|(_, (now, before))| now != before)
                .map(|(i, _)| i),
        );
        &self.current
    }

    #[must_use]
    pub const fn trace(&self) -> &WaveformTrace {
        &self.current
    }

    /// Columns that differ from the trace before the last update.
    #[must_use]
    pub fn changed(&self) -> &[usize] {
        &self.changed
    }

    /// Forget history, e.g. when a new session starts.
    pub fn reset(&mut self) {
        let width = self.current.width();
        self.current = WaveformTrace::flat(width, self.band);
        self.previous = self.current.clone();
        self.sliding = SlidingTrace::new(width, Extent::point(self.band.scale(0)));
        self.changed.clear();
    }
}
