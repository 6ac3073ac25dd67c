pub mod buffer;
pub mod capture;
pub mod output;

use crate::error::Result;

pub use self::buffer::ChunkBuffer;

/// Producer of 16kHz mono samples.
pub trait SampleSource {
    /// Enable the hardware; capture cannot begin until this succeeds.
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Copy up to `out.len()` available samples into `out`.
    ///
    /// Blocks for at most the implementation's poll timeout. Returning zero
    /// means nothing was ready yet, not end of stream.
    fn poll_block(&mut self, out: &mut [i16]) -> Result<usize>;
}

/// Consumer of 16kHz mono samples.
pub trait SampleSink {
    /// Hand a block to the hardware, blocking until it is accepted or the
    /// implementation's timeout expires (an error).
    fn play_block(&mut self, samples: &[i16], sample_rate: u32) -> Result<()>;

    /// Whether previously accepted samples are still being played.
    fn is_busy(&self) -> bool;

    /// Discard anything queued and go silent.
    fn stop(&mut self) -> Result<()>;
}

/// Convert a float sample in [-1, 1] to 16-bit PCM, clamping out-of-range input.
#[must_use]
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * f32::from(i16::MAX)) as i16
}

#[must_use]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / f32::from(i16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i16_conversion_clamps() {
        assert_eq!(f32_to_i16(1.5), i16::MAX);
        assert_eq!(f32_to_i16(-1.5), -i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(0.5), i16::MAX / 2);
    }

    #[test]
    fn f32_conversion_is_inverse_within_rounding() {
        for s in [-i16::MAX, -12_345, 0, 1, 30_000] {
            assert!((f32_to_i16(i16_to_f32(s)) - s).abs() <= 1);
        }
    }
}
