//! Double-buffer DMA chain and completion signalling.
//!
//! The transport owns both halves of the sample buffer. A control channel
//! repeatedly reprograms the data channel's source address from a two-entry
//! address ring; the data channel streams one half to the serial FIFO and
//! chains back to the control channel on completion. The alternation needs no
//! software in the steady state; software only observes the completion IRQ
//! and refills the half that is not in flight.

use thiserror::Error;

use crate::clock::{self, ClockDivider, DEFAULT_SYS_CLOCK_HZ};

/// Interleaved channel count carried by the transport.
pub const CHANNELS: usize = 2;
/// Halves in the ping-pong arrangement.
const BUFFER_COUNT: usize = 2;
/// Allocation guard for the double buffer, in samples.
const MAX_BUFFER_SAMPLES: usize = 8 * 1024 * 1024;

/// Static transport configuration (pins and buffer geometry are fixed
/// per-target configuration, not runtime state).
#[derive(Clone, Debug)]
pub struct I2sConfig {
    pub sample_rate: u32,
    /// Bytes per sample; only signed 16-bit PCM is supported.
    pub sample_size: usize,
    /// Frames per transport buffer (each of the two halves).
    pub buffer_frames: usize,
    pub data_pin: u8,
    pub clock_pin_base: u8,
    pub sys_clock_hz: u64,
}

impl Default for I2sConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            sample_size: size_of::<i16>(),
            buffer_frames: 1024,
            data_pin: 28,
            clock_pin_base: 26,
            sys_clock_hz: DEFAULT_SYS_CLOCK_HZ,
        }
    }
}

/// Initialization failures; no transport operation fails after `new`.
#[derive(Debug, Error)]
pub enum I2sError {
    #[error("transport buffer of {0} samples exceeds the supported maximum")]
    OutOfMemory(usize),
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Per-buffer completion line. Stays raised until acknowledged; a completion
/// arriving while still raised does not re-invoke the handler.
#[derive(Debug, Default)]
pub struct IrqLine {
    pending: bool,
}

impl IrqLine {
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Clear the completion signal so the next buffer completion re-arms it.
    pub fn acknowledge(&mut self) {
        self.pending = false;
    }

    fn raise(&mut self) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        true
    }
}

/// Handler invoked in interrupt context once per buffer completion. It must
/// do minimal work: set a flag and acknowledge the line.
pub type CompletionHandler = Box<dyn FnMut(&mut IrqLine) + Send>;

/// Control-channel state: position in the two-entry address ring it reads
/// buffer addresses from.
#[derive(Debug)]
struct ControlChannel {
    ring_pos: usize,
}

/// Data-channel state: which half is in flight and how far along it is.
#[derive(Debug)]
struct DataChannel {
    buffer: usize,
    consumed_frames: usize,
}

/// Double-buffered sample transport to the I2S serial interface.
pub struct I2sOutput {
    config: I2sConfig,
    divider: ClockDivider,
    /// Both halves, interleaved stereo, allocated once at initialization.
    pcm: Box<[i16]>,
    /// Address ring read by the control channel (buffer indices).
    ctrl_blocks: [usize; BUFFER_COUNT],
    ctrl: ControlChannel,
    data: DataChannel,
    irq: IrqLine,
    handler: Option<CompletionHandler>,
    enabled: bool,
}

impl I2sOutput {
    /// Set up the transfer chain and allocate the double buffer.
    ///
    /// The chain starts immediately: the control channel has already queued
    /// buffer 0 into the data channel and advanced to the second ring entry.
    /// Output stays silent until [`enable`](Self::enable); the handler is
    /// registered but will not fire before the first buffer completes.
    pub fn new(config: I2sConfig, handler: CompletionHandler) -> Result<Self, I2sError> {
        if config.buffer_frames == 0 {
            return Err(I2sError::InvalidConfig("buffer_frames must be non-zero"));
        }
        if config.sample_size != size_of::<i16>() {
            return Err(I2sError::InvalidConfig("only 16-bit samples are supported"));
        }

        let divider = clock::bit_clock_divider(config.sys_clock_hz, &config)?;

        let samples = config
            .buffer_frames
            .checked_mul(CHANNELS * BUFFER_COUNT)
            .ok_or(I2sError::OutOfMemory(usize::MAX))?;
        if samples > MAX_BUFFER_SAMPLES {
            return Err(I2sError::OutOfMemory(samples));
        }
        let pcm = vec![0i16; samples].into_boxed_slice();

        tracing::debug!(
            rate_hz = config.sample_rate,
            buffer_frames = config.buffer_frames,
            divider_int = divider.int_part,
            divider_frac = divider.frac_part,
            "i2s transport initialized"
        );

        Ok(Self {
            config,
            divider,
            pcm,
            ctrl_blocks: [0, 1],
            ctrl: ControlChannel { ring_pos: 1 },
            data: DataChannel {
                buffer: 0,
                consumed_frames: 0,
            },
            irq: IrqLine::default(),
            handler: Some(handler),
            enabled: false,
        })
    }

    pub fn config(&self) -> &I2sConfig {
        &self.config
    }

    /// Bit-clock divider programmed into the serial program.
    pub fn divider(&self) -> ClockDivider {
        self.divider
    }

    /// Frames per transport buffer half.
    pub fn buffer_frames(&self) -> usize {
        self.config.buffer_frames
    }

    /// Start or stop the serial clock. The transfer chain keeps running
    /// either way; disabling only silences the output.
    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
        tracing::debug!(enabled, "i2s output clock");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Index (0 or 1) of the buffer enqueued for the next transfer; the
    /// producer fills this one.
    pub fn next_buffer_index(&self) -> usize {
        self.ctrl_blocks[self.ctrl.ring_pos]
    }

    /// Index of the buffer currently in flight (hardware side).
    pub fn in_flight_buffer_index(&self) -> usize {
        self.data.buffer
    }

    /// The half that is safe for the producer to write: the one queued for
    /// the next transfer, never the one the data channel is streaming.
    pub fn next_buffer_mut(&mut self) -> &mut [i16] {
        let idx = self.next_buffer_index();
        let half = self.config.buffer_frames * CHANNELS;
        &mut self.pcm[idx * half..(idx + 1) * half]
    }

    /// Whether a completion is waiting to be acknowledged.
    pub fn irq_pending(&self) -> bool {
        self.irq.is_pending()
    }

    /// Clear the completion signal. Must happen once per completion event or
    /// the signal will not re-arm.
    pub fn acknowledge_completion(&mut self) {
        self.irq.acknowledge();
    }

    /// Host-side stand-in for the FIFO-paced data transfer.
    ///
    /// Copies up to `out.len()` samples (whole frames) out of the in-flight
    /// buffer. At each buffer boundary the data channel chains to the control
    /// channel exactly as the hardware would: it is reprogrammed from the
    /// address ring, the ring advances, and the completion IRQ is raised once
    /// per completed buffer. Produces nothing while the output is disabled.
    pub fn transfer(&mut self, out: &mut [i16]) -> usize {
        if !self.enabled {
            return 0;
        }

        let half = self.config.buffer_frames * CHANNELS;
        let mut written = 0;
        for _ in 0..out.len() / CHANNELS {
            let base = self.data.buffer * half + self.data.consumed_frames * CHANNELS;
            out[written..written + CHANNELS].copy_from_slice(&self.pcm[base..base + CHANNELS]);
            written += CHANNELS;

            self.data.consumed_frames += 1;
            if self.data.consumed_frames == self.config.buffer_frames {
                self.chain_to_control();
            }
        }
        written
    }

    /// One buffer finished: the chained control transfer reprograms the data
    /// channel from the address ring, then the completion IRQ fires.
    fn chain_to_control(&mut self) {
        self.data.buffer = self.ctrl_blocks[self.ctrl.ring_pos];
        self.data.consumed_frames = 0;
        self.ctrl.ring_pos = (self.ctrl.ring_pos + 1) % BUFFER_COUNT;

        if self.irq.raise() {
            if let Some(handler) = self.handler.as_mut() {
                handler(&mut self.irq);
            }
        }
    }
}

impl Drop for I2sOutput {
    /// Teardown: silence the output; the chain state and buffer allocation
    /// drop with the value.
    fn drop(&mut self) {
        self.enable(false);
    }
}
