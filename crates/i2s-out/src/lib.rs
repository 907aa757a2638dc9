//! Double-buffered I2S sample transport.
//!
//! Software model of a PIO + chained-DMA I2S output path:
//! - two fixed-size interleaved-stereo sample buffers in a ping-pong
//!   arrangement, allocated once at initialization
//! - a control/data DMA channel pair where the control transfer reprograms
//!   the data transfer's source address from a two-entry address ring, so the
//!   buffers alternate with no software step in the steady state
//! - a per-buffer completion IRQ line that must be acknowledged to re-arm
//! - a fixed-point fractional bit-clock divider for the serial program
//!
//! The producer side only ever sees [`I2sOutput::next_buffer_mut`] and the
//! completion signal. The hardware side (the FIFO consuming samples at the
//! bit-clock rate) is driven explicitly through [`I2sOutput::transfer`], which
//! lets the whole transport run off-target in tests.

pub mod clock;
pub mod transport;

pub use clock::{ClockDivider, DEFAULT_SYS_CLOCK_HZ, bit_clock_divider};
pub use transport::{CHANNELS, CompletionHandler, I2sConfig, I2sError, I2sOutput, IrqLine};
