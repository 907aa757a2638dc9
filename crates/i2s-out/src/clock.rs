//! Bit-clock divider math for the serial transmit program.

use crate::transport::{CHANNELS, I2sConfig, I2sError};

/// Default system clock feeding the serial program (125 MHz).
pub const DEFAULT_SYS_CLOCK_HZ: u64 = 125_000_000;

/// Fractional steps per integer divider increment.
const CLKDIV_FRAC_PART: u64 = 256;
const BITS_PER_BYTE: u64 = 8;

/// Fractional clock divider in integer + 1/256 steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockDivider {
    pub int_part: u32,
    pub frac_part: u8,
}

impl ClockDivider {
    /// Raw fixed-point value (`int_part * 256 + frac_part`).
    pub fn raw(self) -> u64 {
        u64::from(self.int_part) * CLKDIV_FRAC_PART + u64::from(self.frac_part)
    }
}

/// Compute the divider from the system clock down to the required bit clock.
///
/// The bit clock is `sample_rate * sample_size_bytes * 8 * channels`; the
/// serial program shifts on both clock edges, hence the division by two.
pub fn bit_clock_divider(sys_clock_hz: u64, config: &I2sConfig) -> Result<ClockDivider, I2sError> {
    let bclk = u64::from(config.sample_rate)
        * config.sample_size as u64
        * BITS_PER_BYTE
        * CHANNELS as u64;
    if bclk == 0 {
        return Err(I2sError::InvalidConfig(
            "sample rate and sample size must be non-zero",
        ));
    }

    let raw = (CLKDIV_FRAC_PART * sys_clock_hz) / (2 * bclk);
    let int_part = raw / CLKDIV_FRAC_PART;
    if int_part == 0 || int_part > u64::from(u32::MAX) {
        return Err(I2sError::InvalidConfig("bit-clock divider out of range"));
    }

    Ok(ClockDivider {
        int_part: int_part as u32,
        frac_part: (raw % CLKDIV_FRAC_PART) as u8,
    })
}
