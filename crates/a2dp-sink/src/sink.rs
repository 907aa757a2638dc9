//! Audio-sink capability consumed by the decode pipeline.

use thiserror::Error;

/// Pull hook the sink uses to request PCM. The pipeline fills the whole
/// interleaved buffer, degrading to stale or silent frames on underrun; it
/// never blocks.
pub type PullFn = Box<dyn FnMut(&mut [i16]) + Send>;

/// Errors surfaced by [`AudioSink::init`]. No other sink operation fails.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Output(#[from] i2s_out::I2sError),
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u8),
}

/// The five-operation audio-sink capability, implemented by the playback
/// scheduler and consumed polymorphically by the A2DP stream driver.
pub trait AudioSink {
    /// Prepare the output for a stream. `pull` is invoked from the
    /// cooperative context whenever a transport buffer needs refilling.
    fn init(&mut self, channels: u8, sample_rate: u32, pull: PullFn) -> Result<(), SinkError>;

    /// Begin clocking samples out. Pre-fills the queued transport buffer.
    fn start_stream(&mut self);

    /// Silence the output without releasing buffers.
    fn stop_stream(&mut self);

    /// Release the transport and the pull hook.
    fn close(&mut self);

    /// Absolute volume on the 0-127 scale used by the remote-control layer.
    fn set_volume(&mut self, volume: u8);
}
