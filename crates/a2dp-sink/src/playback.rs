//! Cooperative playback scheduler over the I2S transport.
//!
//! The transport's completion handler runs in interrupt context and only
//! flips [`buffer_ready`](I2sPlayback::buffer_ready); the actual refill
//! happens later from [`tick`](I2sPlayback::tick), which the run loop calls
//! every [`TICK_INTERVAL_MS`]. One buffer of [`FRAMES_PER_BUFFER`] frames at
//! 44.1 kHz lasts about 23 ms, so a 5 ms tick always refills the free half
//! before the in-flight half runs out.
//!
//! Gain is applied here, after the pipeline, so volume changes take effect
//! within one buffer. The scheduler starts muted; the remote-control layer
//! pushes an absolute volume once the peer connects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use i2s_out::{I2sConfig, I2sOutput};
use tracing::{debug, warn};

use crate::sink::{AudioSink, PullFn, SinkError};

/// Top of the absolute-volume scale used by the remote-control layer.
pub const VOLUME_MAX: u8 = 127;
/// Run-loop period for [`I2sPlayback::tick`], in milliseconds.
pub const TICK_INTERVAL_MS: u64 = 5;
/// Frames per transport buffer half.
pub const FRAMES_PER_BUFFER: usize = 1024;

const VOLUME_CURVE_A: f32 = 1e-3;
const VOLUME_CURVE_B: f32 = 6.908;

/// Map an absolute volume to a linear gain on an exponential loudness curve.
/// Zero maps to exactly zero; full scale clamps to unity.
pub fn volume_to_gain(volume: u8) -> f32 {
    if volume == 0 {
        return 0.0;
    }
    let x = f32::from(volume.min(VOLUME_MAX)) / f32::from(VOLUME_MAX);
    (VOLUME_CURVE_A * (VOLUME_CURVE_B * x).exp()).clamp(0.0, 1.0)
}

/// Audio sink backed by the double-buffered I2S transport.
pub struct I2sPlayback {
    config: I2sConfig,
    output: Option<I2sOutput>,
    pull: Option<PullFn>,
    gain: f32,
    buffer_ready: Arc<AtomicBool>,
}

impl I2sPlayback {
    pub fn new() -> Self {
        Self::with_config(I2sConfig {
            buffer_frames: FRAMES_PER_BUFFER,
            ..I2sConfig::default()
        })
    }

    /// Use explicit transport geometry (pins, buffer size, system clock).
    pub fn with_config(config: I2sConfig) -> Self {
        Self {
            config,
            output: None,
            pull: None,
            gain: 0.0,
            buffer_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run-loop entry point. Refills the free transport buffer if the
    /// completion handler signalled since the last tick.
    pub fn tick(&mut self) {
        if self.buffer_ready.swap(false, Ordering::AcqRel) {
            self.fill_next_buffer();
        }
    }

    /// Pull one buffer of PCM from the pipeline and apply the current gain.
    fn fill_next_buffer(&mut self) {
        let (Some(output), Some(pull)) = (self.output.as_mut(), self.pull.as_mut()) else {
            return;
        };
        let buffer = output.next_buffer_mut();
        pull(buffer);

        let gain = self.gain;
        for sample in buffer.iter_mut() {
            *sample = (f32::from(*sample) * gain) as i16;
        }
    }

    /// Whether a completion is waiting for the next tick.
    pub fn buffer_ready(&self) -> bool {
        self.buffer_ready.load(Ordering::Acquire)
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn output(&self) -> Option<&I2sOutput> {
        self.output.as_ref()
    }

    pub fn output_mut(&mut self) -> Option<&mut I2sOutput> {
        self.output.as_mut()
    }
}

impl Default for I2sPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for I2sPlayback {
    fn init(&mut self, channels: u8, sample_rate: u32, pull: PullFn) -> Result<(), SinkError> {
        if channels == 0 || usize::from(channels) > i2s_out::CHANNELS {
            return Err(SinkError::UnsupportedChannels(channels));
        }
        if usize::from(channels) < i2s_out::CHANNELS {
            // TODO duplicate samples for mono streams
            warn!(channels, "mono stream not duplicated for the stereo transport");
        }

        self.buffer_ready.store(false, Ordering::Release);
        let ready = Arc::clone(&self.buffer_ready);
        let handler = Box::new(move |irq: &mut i2s_out::IrqLine| {
            ready.store(true, Ordering::Release);
            irq.acknowledge();
        });

        let config = I2sConfig {
            sample_rate,
            ..self.config.clone()
        };
        self.output = Some(I2sOutput::new(config, handler)?);
        self.pull = Some(pull);
        debug!(sample_rate, channels, "playback sink initialized");
        Ok(())
    }

    fn start_stream(&mut self) {
        // Pre-fill the queued half so the first completion has real audio.
        self.fill_next_buffer();
        if let Some(output) = self.output.as_mut() {
            output.enable(true);
        }
    }

    fn stop_stream(&mut self) {
        if let Some(output) = self.output.as_mut() {
            output.enable(false);
        }
    }

    fn close(&mut self) {
        self.stop_stream();
        self.output = None;
        self.pull = None;
        self.buffer_ready.store(false, Ordering::Release);
    }

    fn set_volume(&mut self, volume: u8) {
        self.gain = volume_to_gain(volume);
        debug!(volume, gain = self.gain, "volume changed");
    }
}
