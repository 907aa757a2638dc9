//! Wire-format parsing and signalling-layer event types.
//!
//! A media transport packet carries, big-endian and bit-exact:
//! - a 12-byte RTP-like media header
//! - a 1-byte SBC payload header
//! - the encoded frames, packed back to back
//!
//! Packets shorter than the combined 13-byte header are rejected outright.

/// Media header length in bytes (without CRC).
pub const MEDIA_HEADER_LEN: usize = 12;
/// SBC payload header length in bytes.
pub const SBC_HEADER_LEN: usize = 1;

/// RTP-like media packet header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MediaHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub synchronization_source: u32,
}

impl MediaHeader {
    /// Parse the leading media header; `None` when fewer than
    /// [`MEDIA_HEADER_LEN`] bytes are present.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < MEDIA_HEADER_LEN {
            return None;
        }
        Some(Self {
            version: bytes[0] & 0x03,
            padding: bytes[0] & 0x04 != 0,
            extension: bytes[0] & 0x08 != 0,
            csrc_count: (bytes[0] >> 4) & 0x0F,
            marker: bytes[1] & 0x01 != 0,
            payload_type: (bytes[1] >> 1) & 0x7F,
            sequence_number: u16::from_be_bytes([bytes[2], bytes[3]]),
            timestamp: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            synchronization_source: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// One-byte SBC payload header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SbcHeader {
    pub fragmentation: bool,
    pub starting_packet: bool,
    pub last_packet: bool,
    /// Encoded frames packed in this unit; units within one packet are
    /// assumed uniform size.
    pub frame_count: u8,
}

impl SbcHeader {
    pub fn parse(byte: u8) -> Self {
        Self {
            fragmentation: byte & 0x80 != 0,
            starting_packet: byte & 0x40 != 0,
            last_packet: byte & 0x20 != 0,
            frame_count: byte & 0x0F,
        }
    }
}

/// Parsed media packet borrowing the encoded payload.
#[derive(Debug)]
pub struct MediaPacket<'a> {
    pub media: MediaHeader,
    pub sbc: SbcHeader,
    pub payload: &'a [u8],
}

impl<'a> MediaPacket<'a> {
    /// `None` when the packet is shorter than the combined 13-byte header.
    pub fn parse(packet: &'a [u8]) -> Option<Self> {
        let media = MediaHeader::parse(packet)?;
        let rest = &packet[MEDIA_HEADER_LEN..];
        let (&header, payload) = rest.split_first()?;
        Some(Self {
            media,
            sbc: SbcHeader::parse(header),
            payload,
        })
    }
}

/// SBC channel mode, mapped from the AVDTP signalling value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    Mono,
    DualChannel,
    Stereo,
    JointStereo,
}

impl ChannelMode {
    /// AVDTP encodes the mode as a capability bit; unknown values fall back
    /// to stereo.
    pub fn from_avdtp(raw: u8) -> Self {
        match raw {
            8 => Self::Mono,
            4 => Self::DualChannel,
            2 => Self::Stereo,
            1 => Self::JointStereo,
            _ => Self::Stereo,
        }
    }
}

/// SBC bit allocation method, mapped from the AVDTP signalling value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationMethod {
    Loudness,
    Snr,
}

impl AllocationMethod {
    pub fn from_avdtp(raw: u8) -> Self {
        match raw {
            2 => Self::Snr,
            _ => Self::Loudness,
        }
    }
}

/// Codec configuration received once per stream (re)configuration, immutable
/// for the life of one stream instance.
#[derive(Clone, Copy, Debug)]
pub struct SbcConfig {
    /// Set when this configuration replaces a live one; the current media
    /// processing must be torn down before re-initializing.
    pub reconfigure: bool,
    pub channels: u8,
    pub sample_rate: u32,
    pub block_length: u8,
    pub subbands: u8,
    pub min_bitpool: u8,
    pub max_bitpool: u8,
    pub channel_mode: ChannelMode,
    pub allocation_method: AllocationMethod,
}

impl SbcConfig {
    /// Bitpool range advertised in the sink's SBC capabilities.
    pub const BITPOOL_MIN: u8 = 2;
    pub const BITPOOL_MAX: u8 = 53;

    /// PCM frames produced by decoding one SBC frame.
    pub fn pcm_frames_per_sbc_frame(&self) -> usize {
        usize::from(self.block_length) * usize::from(self.subbands)
    }
}

/// Stream lifecycle events delivered by the signalling layer.
#[derive(Clone, Copy, Debug)]
pub enum StreamEvent {
    /// Media codec (re)configuration for the next stream instance.
    Configured(SbcConfig),
    /// Signalling established; non-success statuses leave state untouched.
    Established { status: u8 },
    /// Transport-level stream start.
    Started,
    /// Transport-level suspend.
    Suspended,
    /// Stream released (or about to be reconfigured).
    Released,
}
