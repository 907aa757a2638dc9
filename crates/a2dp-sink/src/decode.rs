//! SBC decoder seam.
//!
//! The pipeline drives an external sub-band codec one encoded frame at a
//! time; [`SbcDecoder`] reproduces that collaborator boundary so the decoder
//! implementation (reference, fixed-point, hardware-assisted) is swappable.
//! Implementations decode into a caller-provided scratch buffer so the hot
//! path stays allocation-free.

use thiserror::Error;

use crate::protocol::SbcConfig;

/// Largest encoded SBC frame the sink accepts, in bytes.
pub const MAX_SBC_FRAME_SIZE: usize = 120;
/// Worst-case PCM frames from one SBC frame (16 blocks x 8 subbands).
pub const MAX_PCM_FRAMES_PER_SBC_FRAME: usize = 128;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed SBC frame")]
    Malformed,
    #[error("unsupported SBC parameters")]
    Unsupported,
}

/// One-frame-at-a-time SBC decoder.
pub trait SbcDecoder: Send {
    /// Apply a codec configuration, resetting any internal state.
    fn configure(&mut self, config: &SbcConfig);

    /// Decode one encoded frame into `pcm` (interleaved at the configured
    /// channel count), returning the number of PCM frames produced.
    ///
    /// `pcm` holds at least [`MAX_PCM_FRAMES_PER_SBC_FRAME`] frames. A failed
    /// frame is skipped by the caller; decoding must not otherwise fail.
    fn decode_frame(&mut self, frame: &[u8], pcm: &mut [i16]) -> Result<usize, DecodeError>;
}
