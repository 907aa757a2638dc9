//! Fixed-point adaptive resampler.
//!
//! Linear interpolation over interleaved 16-bit PCM with a Q16 rate factor.
//! The drift controller nudges the factor around [`FACTOR_NOMINAL`] by
//! [`FACTOR_COMPENSATION`]: a factor below nominal stretches (slightly more
//! output frames per input frame), above nominal compresses. Interpolation
//! phase and the final input frame carry across blocks so the output is
//! continuous at block boundaries.

/// Nominal rate factor (Q16 fixed point, 1.0).
pub const FACTOR_NOMINAL: u32 = 0x10000;
/// Drift compensation step applied by the occupancy controller.
pub const FACTOR_COMPENSATION: u32 = 0x100;
/// Most channels any stream configuration carries.
pub const MAX_CHANNELS: usize = 2;

const FRACTION_BITS: u32 = 16;
const FRACTION_MASK: u32 = 0xFFFF;

/// Output frames `input_frames` can produce at the lowest factor, for sizing
/// scratch buffers. Over-estimates slightly.
pub const fn max_output_frames(input_frames: usize) -> usize {
    // The maximum stretch is 0x10000 / (0x10000 - 0x100), under 1/128 extra.
    input_frames + input_frames / 128 + 2
}

/// Streaming linear resampler over interleaved PCM.
pub struct Resampler {
    channels: usize,
    factor: u32,
    /// Q16 position between the carried frame and the next input frame.
    phase: u32,
    last_frame: [i16; MAX_CHANNELS],
}

impl Resampler {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: channels.clamp(1, MAX_CHANNELS),
            factor: FACTOR_NOMINAL,
            phase: 0,
            last_frame: [0; MAX_CHANNELS],
        }
    }

    /// Current rate factor (Q16).
    pub fn factor(&self) -> u32 {
        self.factor
    }

    /// Set the rate factor, bounded to nominal +/- the compensation step.
    pub fn set_factor(&mut self, factor: u32) {
        self.factor = factor.clamp(
            FACTOR_NOMINAL - FACTOR_COMPENSATION,
            FACTOR_NOMINAL + FACTOR_COMPENSATION,
        );
    }

    /// Resample one interleaved block into `output`; returns frames written.
    ///
    /// `output` must be sized via [`max_output_frames`]; if it is too small
    /// the remaining input is dropped rather than buffered.
    pub fn process(&mut self, input: &[i16], output: &mut [i16]) -> usize {
        let in_frames = input.len() / self.channels;
        if in_frames == 0 {
            return 0;
        }

        let max_out = output.len() / self.channels;
        let mut produced = 0;
        let mut pos = self.phase;

        // Virtual frame 0 is the carried last frame; input frame k sits at
        // position k + 1. Interpolate while a right-hand neighbour exists.
        while (pos >> FRACTION_BITS) < in_frames as u32 && produced < max_out {
            let idx = (pos >> FRACTION_BITS) as usize;
            let frac = i64::from(pos & FRACTION_MASK);
            for ch in 0..self.channels {
                let prev = i64::from(if idx == 0 {
                    self.last_frame[ch]
                } else {
                    input[(idx - 1) * self.channels + ch]
                });
                let next = i64::from(input[idx * self.channels + ch]);
                let sample = prev + (((next - prev) * frac) >> FRACTION_BITS);
                output[produced * self.channels + ch] = sample as i16;
            }
            produced += 1;
            pos += self.factor;
        }

        // Carry phase and the final input frame into the next block.
        let consumed = (in_frames as u32) << FRACTION_BITS;
        self.phase = pos.saturating_sub(consumed);
        let tail = (in_frames - 1) * self.channels;
        for ch in 0..self.channels {
            self.last_frame[ch] = input[tail + ch];
        }

        produced
    }
}
