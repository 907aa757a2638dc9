//! Bluetooth A2DP audio sink pipeline.
//!
//! Bridges a bursty, network-paced stream of SBC-encoded media packets to a
//! fixed-rate, double-buffered I2S output:
//!
//! - [`protocol`] parses the transport headers and lifecycle events bit-exact
//! - [`pipeline`] buffers encoded frames, decodes, and drift-corrects against
//!   the hardware consumption pace
//! - [`playback`] schedules transport-buffer refills and applies gain
//! - [`sink`] is the capability seam between the pipeline and the scheduler
//! - [`resample`] and [`decode`] are the pipeline's rate and codec stages
//!
//! All hot-path operations are run-to-completion and allocation-free; the
//! only cross-context state is the single completion flag set in interrupt
//! context and consumed by the cooperative [`playback::I2sPlayback::tick`].
//! Overload and underrun degrade to dropped input or stale/silent output,
//! never to blocking or failure.

pub mod decode;
pub mod pipeline;
pub mod playback;
pub mod protocol;
pub mod resample;
pub mod sink;

pub use pipeline::{A2dpStream, StreamState};
pub use playback::I2sPlayback;
pub use protocol::{SbcConfig, StreamEvent};
pub use sink::{AudioSink, PullFn, SinkError};
