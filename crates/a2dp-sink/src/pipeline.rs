//! Decode pipeline and stream lifecycle driver.
//!
//! [`PipelineCore`] owns the two rings between the transport ingress and the
//! output's pull callback:
//!
//! ```text
//! media packets -> encoded ring -> decode -> resample -> decoded ring -> pull
//! ```
//!
//! Encoded frames are admitted as opaque bytes; decode happens lazily, driven
//! by the output's demand. A pull that finds the decoded ring short decodes
//! straight into the caller's buffer and records any remaining shortfall so
//! the next ingress can retire it. The drift controller watches encoded-ring
//! occupancy after every admitted packet and steps the resample factor to keep
//! the source's clock and ours from drifting apart.
//!
//! [`A2dpStream`] drives the lifecycle around the core: signalling events move
//! it between [`StreamState`]s, and playback starts on its own once enough
//! frames are buffered to ride out source burstiness.

use std::sync::{Arc, Mutex};

use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use tracing::{debug, info, warn};

use crate::decode::{MAX_PCM_FRAMES_PER_SBC_FRAME, MAX_SBC_FRAME_SIZE, SbcDecoder};
use crate::protocol::{MediaPacket, SbcConfig, StreamEvent};
use crate::resample::{self, FACTOR_COMPENSATION, FACTOR_NOMINAL, MAX_CHANNELS, Resampler};
use crate::sink::{AudioSink, SinkError};

/// Encoded-ring occupancy (in frames) below which the resampler stretches,
/// and the prebuffer level at which playback auto-starts.
pub const SBC_FRAMES_LOW_WATERMARK: usize = 60;
/// Occupancy above which the resampler compresses.
pub const SBC_FRAMES_HIGH_WATERMARK: usize = 120;
/// Headroom above the high watermark before admitted bytes start dropping.
pub const SBC_BURST_MARGIN_FRAMES: usize = 30;
/// Encoded ring capacity in bytes, sized for worst-case frames.
pub const SBC_RING_CAPACITY: usize =
    (SBC_FRAMES_HIGH_WATERMARK + SBC_BURST_MARGIN_FRAMES) * MAX_SBC_FRAME_SIZE;
/// Decoded ring capacity in frames. One worst-case decode plus resampler
/// expansion headroom; anything beyond that decodes on demand.
pub const PCM_RING_FRAMES: usize = MAX_PCM_FRAMES_PER_SBC_FRAME + 16;

/// Stream lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// No media processing exists.
    Closed,
    /// Output initialized, waiting for the prebuffer to fill.
    Initialized,
    /// Output clocking samples.
    Started,
    /// Suspended; rings drained, output silenced, ready to resume.
    Paused,
}

/// Decode/resample core shared between the ingress path and the output's
/// pull callback.
pub struct PipelineCore {
    channels: usize,
    /// Learned from the most recent media unit; zero until the first one.
    /// Deliberately not reset on pause so a resume can serve stale frames.
    sbc_frame_size: usize,
    sbc_prod: HeapProd<u8>,
    sbc_cons: HeapCons<u8>,
    pcm_prod: HeapProd<i16>,
    pcm_cons: HeapCons<i16>,
    resampler: Resampler,
    decoder: Box<dyn SbcDecoder>,
    /// Frames still owed to the last pull that underran.
    pending_frames: usize,
    sbc_scratch: [u8; MAX_SBC_FRAME_SIZE],
    pcm_scratch: Vec<i16>,
    resampled_scratch: Vec<i16>,
}

impl PipelineCore {
    pub fn new(config: &SbcConfig, decoder: Box<dyn SbcDecoder>) -> Self {
        let channels = usize::from(config.channels).clamp(1, MAX_CHANNELS);
        let (sbc_prod, sbc_cons) = HeapRb::<u8>::new(SBC_RING_CAPACITY).split();
        let (pcm_prod, pcm_cons) = HeapRb::<i16>::new(PCM_RING_FRAMES * channels).split();
        Self {
            channels,
            sbc_frame_size: 0,
            sbc_prod,
            sbc_cons,
            pcm_prod,
            pcm_cons,
            resampler: Resampler::new(channels),
            decoder,
            pending_frames: 0,
            sbc_scratch: [0; MAX_SBC_FRAME_SIZE],
            pcm_scratch: vec![0; MAX_PCM_FRAMES_PER_SBC_FRAME * channels],
            resampled_scratch: vec![
                0;
                resample::max_output_frames(MAX_PCM_FRAMES_PER_SBC_FRAME) * channels
            ],
        }
    }

    /// Admit one media unit's encoded payload. Returns the encoded-ring
    /// occupancy in frames afterwards.
    pub fn accept_payload(&mut self, payload: &[u8], frame_count: u8) -> usize {
        if frame_count == 0 || payload.is_empty() {
            warn!("dropping media unit without payload frames");
            return self.sbc_frames();
        }
        let frame_size = payload.len() / usize::from(frame_count);
        if frame_size == 0 || frame_size > MAX_SBC_FRAME_SIZE {
            warn!(frame_size, "dropping media unit with unusable frame size");
            return self.sbc_frames();
        }
        self.sbc_frame_size = frame_size;

        let pushed = self.sbc_prod.push_slice(payload);
        if pushed < payload.len() {
            warn!(
                dropped = payload.len() - pushed,
                "encoded ring full, dropping payload tail"
            );
        }
        self.apply_drift_control();

        // Retire any shortfall left behind by the last pull. The late frames
        // go through the decoded ring; the original buffer is gone.
        while self.pending_frames > 0 && self.sbc_cons.occupied_len() >= self.sbc_frame_size {
            self.decode_one(None);
        }

        self.sbc_frames()
    }

    /// Serve one pull request, filling `out` completely. Decoded frames come
    /// from the ring first, then straight from the encoded ring; whatever
    /// cannot be produced now is recorded as pending and the tail keeps its
    /// previous (stale) contents.
    pub fn fill_request(&mut self, out: &mut [i16]) {
        if self.sbc_frame_size == 0 {
            out.fill(0);
            return;
        }

        let requested = out.len() / self.channels;
        let filled = self.pcm_cons.pop_slice(out) / self.channels;
        self.pending_frames = requested - filled;

        while self.pending_frames > 0 && self.sbc_cons.occupied_len() >= self.sbc_frame_size {
            let from = (requested - self.pending_frames) * self.channels;
            self.decode_one(Some(&mut out[from..]));
        }

        if self.pending_frames > 0 {
            debug!(shortfall = self.pending_frames, "pull underran");
        }
    }

    /// Decode one encoded frame and route the resampled PCM either straight
    /// into `direct` (counting against the pending request) or onto the
    /// decoded ring.
    fn decode_one(&mut self, direct: Option<&mut [i16]>) {
        let frame_size = self.sbc_frame_size;
        let read = self.sbc_cons.pop_slice(&mut self.sbc_scratch[..frame_size]);
        debug_assert_eq!(read, frame_size);

        let decoded = match self
            .decoder
            .decode_frame(&self.sbc_scratch[..read], &mut self.pcm_scratch)
        {
            Ok(frames) => frames,
            Err(err) => {
                warn!(%err, "skipping undecodable frame");
                return;
            }
        };

        let resampled = self.resampler.process(
            &self.pcm_scratch[..decoded * self.channels],
            &mut self.resampled_scratch,
        );
        let samples = &self.resampled_scratch[..resampled * self.channels];

        match direct {
            Some(out) => {
                let direct_frames = resampled
                    .min(self.pending_frames)
                    .min(out.len() / self.channels);
                let direct_samples = direct_frames * self.channels;
                out[..direct_samples].copy_from_slice(&samples[..direct_samples]);
                self.pending_frames -= direct_frames;

                let surplus = &samples[direct_samples..];
                if !surplus.is_empty() {
                    let pushed = self.pcm_prod.push_slice(surplus);
                    if pushed < surplus.len() {
                        warn!(
                            dropped = (surplus.len() - pushed) / self.channels,
                            "decoded ring full, dropping surplus frames"
                        );
                    }
                }
            }
            None => {
                let pushed = self.pcm_prod.push_slice(samples);
                if pushed < samples.len() {
                    warn!(
                        dropped = (samples.len() - pushed) / self.channels,
                        "decoded ring full, dropping late frames"
                    );
                }
                self.pending_frames = self.pending_frames.saturating_sub(resampled);
            }
        }
    }

    /// Step the resample factor from encoded-ring occupancy.
    fn apply_drift_control(&mut self) {
        let frames = self.sbc_frames();
        let factor = if frames < SBC_FRAMES_LOW_WATERMARK {
            FACTOR_NOMINAL - FACTOR_COMPENSATION
        } else if frames > SBC_FRAMES_HIGH_WATERMARK {
            FACTOR_NOMINAL + FACTOR_COMPENSATION
        } else {
            FACTOR_NOMINAL
        };
        if factor != self.resampler.factor() {
            debug!(frames, factor = format_args!("{factor:#x}"), "drift step");
            self.resampler.set_factor(factor);
        }
    }

    /// Drop all buffered audio and forget any pending shortfall.
    pub fn reset_rings(&mut self) {
        self.sbc_cons.clear();
        self.pcm_cons.clear();
        self.pending_frames = 0;
    }

    pub fn sbc_bytes(&self) -> usize {
        self.sbc_cons.occupied_len()
    }

    /// Encoded-ring occupancy in frames at the current frame size.
    pub fn sbc_frames(&self) -> usize {
        if self.sbc_frame_size == 0 {
            0
        } else {
            self.sbc_cons.occupied_len() / self.sbc_frame_size
        }
    }

    pub fn pcm_frames(&self) -> usize {
        self.pcm_cons.occupied_len() / self.channels
    }

    pub fn resample_factor(&self) -> u32 {
        self.resampler.factor()
    }

    pub fn sbc_frame_size(&self) -> usize {
        self.sbc_frame_size
    }

    pub fn pending_frames(&self) -> usize {
        self.pending_frames
    }
}

/// A2DP stream driver: reacts to signalling events, feeds media packets into
/// the pipeline, and manages the audio sink's lifecycle.
pub struct A2dpStream<S: AudioSink> {
    sink: S,
    new_decoder: Box<dyn Fn() -> Box<dyn SbcDecoder> + Send>,
    config: Option<SbcConfig>,
    core: Option<Arc<Mutex<PipelineCore>>>,
    state: StreamState,
}

impl<S: AudioSink> A2dpStream<S> {
    pub fn new(
        sink: S,
        new_decoder: impl Fn() -> Box<dyn SbcDecoder> + Send + 'static,
    ) -> Self {
        Self {
            sink,
            new_decoder: Box::new(new_decoder),
            config: None,
            core: None,
            state: StreamState::Closed,
        }
    }

    /// Apply one signalling-layer lifecycle event.
    pub fn handle_event(&mut self, event: StreamEvent) -> Result<(), SinkError> {
        match event {
            StreamEvent::Configured(config) => {
                info!(
                    sample_rate = config.sample_rate,
                    channels = config.channels,
                    reconfigure = config.reconfigure,
                    "codec configured"
                );
                self.config = Some(config);
            }
            StreamEvent::Established { status } => {
                if status == 0 {
                    info!("signalling channel established");
                } else {
                    warn!(status, "signalling establishment failed");
                }
            }
            StreamEvent::Started => {
                if self.config.is_some_and(|c| c.reconfigure)
                    && self.state != StreamState::Closed
                {
                    self.close_media();
                }
                match self.state {
                    StreamState::Closed => self.init_media()?,
                    StreamState::Paused => self.start_media(),
                    StreamState::Initialized | StreamState::Started => {}
                }
            }
            StreamEvent::Suspended => self.pause_media(),
            StreamEvent::Released => self.close_media(),
        }
        Ok(())
    }

    /// Admit one transport packet. Malformed packets are dropped; once the
    /// prebuffer reaches the low watermark playback starts by itself.
    pub fn accept_media_unit(&mut self, _local_seid: u8, packet: &[u8]) {
        if self.state == StreamState::Closed {
            return;
        }
        let Some(packet) = MediaPacket::parse(packet) else {
            warn!("dropping malformed media packet");
            return;
        };
        if packet.sbc.frame_count == 0 || packet.payload.is_empty() {
            warn!("dropping media packet without payload frames");
            return;
        }

        let buffered = match &self.core {
            Some(core) => core
                .lock()
                .unwrap()
                .accept_payload(packet.payload, packet.sbc.frame_count),
            None => return,
        };

        if self.state != StreamState::Started && buffered >= SBC_FRAMES_LOW_WATERMARK {
            self.start_media();
        }
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.sink.set_volume(volume);
    }

    fn init_media(&mut self) -> Result<(), SinkError> {
        let Some(config) = self.config else {
            warn!("stream started before codec configuration");
            return Ok(());
        };

        let mut decoder = (self.new_decoder)();
        decoder.configure(&config);
        let core = Arc::new(Mutex::new(PipelineCore::new(&config, decoder)));

        let pull = {
            let core = Arc::clone(&core);
            Box::new(move |buffer: &mut [i16]| core.lock().unwrap().fill_request(buffer))
        };
        self.sink.init(config.channels, config.sample_rate, pull)?;

        self.core = Some(core);
        self.state = StreamState::Initialized;
        info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            "media processing initialized"
        );
        Ok(())
    }

    fn start_media(&mut self) {
        self.sink.start_stream();
        self.state = StreamState::Started;
        info!("playback started");
    }

    fn pause_media(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        self.sink.stop_stream();
        if let Some(core) = &self.core {
            core.lock().unwrap().reset_rings();
        }
        self.state = StreamState::Paused;
        info!("playback paused");
    }

    fn close_media(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        self.sink.close();
        self.core = None;
        self.state = StreamState::Closed;
        info!("media processing closed");
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn core_stat<T: Default>(&self, f: impl FnOnce(&PipelineCore) -> T) -> T {
        match &self.core {
            Some(core) => f(&core.lock().unwrap()),
            None => T::default(),
        }
    }

    pub fn sbc_ring_bytes(&self) -> usize {
        self.core_stat(PipelineCore::sbc_bytes)
    }

    pub fn sbc_ring_frames(&self) -> usize {
        self.core_stat(PipelineCore::sbc_frames)
    }

    pub fn pcm_ring_frames(&self) -> usize {
        self.core_stat(PipelineCore::pcm_frames)
    }

    pub fn pending_request_frames(&self) -> usize {
        self.core_stat(PipelineCore::pending_frames)
    }

    pub fn resample_factor(&self) -> u32 {
        match &self.core {
            Some(core) => core.lock().unwrap().resample_factor(),
            None => FACTOR_NOMINAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodeError;
    use crate::protocol::{AllocationMethod, ChannelMode};
    use crate::sink::PullFn;

    fn test_config(reconfigure: bool) -> SbcConfig {
        SbcConfig {
            reconfigure,
            channels: 2,
            sample_rate: 44_100,
            block_length: 4,
            subbands: 4,
            min_bitpool: SbcConfig::BITPOOL_MIN,
            max_bitpool: SbcConfig::BITPOOL_MAX,
            channel_mode: ChannelMode::JointStereo,
            allocation_method: AllocationMethod::Loudness,
        }
    }

    /// Decodes every frame to a continuing ramp, one value per PCM frame.
    struct RampDecoder {
        frames: usize,
        channels: usize,
        next: i16,
    }

    impl RampDecoder {
        fn boxed() -> Box<dyn SbcDecoder> {
            Box::new(Self {
                frames: 0,
                channels: 0,
                next: 0,
            })
        }
    }

    impl SbcDecoder for RampDecoder {
        fn configure(&mut self, config: &SbcConfig) {
            self.frames = config.pcm_frames_per_sbc_frame();
            self.channels = usize::from(config.channels);
            self.next = 0;
        }

        fn decode_frame(&mut self, _frame: &[u8], pcm: &mut [i16]) -> Result<usize, DecodeError> {
            for frame in 0..self.frames {
                for ch in 0..self.channels {
                    pcm[frame * self.channels + ch] = self.next;
                }
                self.next = self.next.wrapping_add(1);
            }
            Ok(self.frames)
        }
    }

    #[derive(Default)]
    struct TestSink {
        init_calls: usize,
        start_calls: usize,
        stop_calls: usize,
        close_calls: usize,
        volume: Option<u8>,
        started: bool,
        pull: Option<PullFn>,
    }

    impl AudioSink for TestSink {
        fn init(&mut self, _channels: u8, _sample_rate: u32, pull: PullFn) -> Result<(), SinkError> {
            self.init_calls += 1;
            self.pull = Some(pull);
            Ok(())
        }

        fn start_stream(&mut self) {
            self.start_calls += 1;
            self.started = true;
        }

        fn stop_stream(&mut self) {
            self.stop_calls += 1;
            self.started = false;
        }

        fn close(&mut self) {
            self.close_calls += 1;
            self.started = false;
            self.pull = None;
        }

        fn set_volume(&mut self, volume: u8) {
            self.volume = Some(volume);
        }
    }

    fn core_with_decoder() -> PipelineCore {
        let config = test_config(false);
        let mut decoder = RampDecoder::boxed();
        decoder.configure(&config);
        PipelineCore::new(&config, decoder)
    }

    fn media_packet(frame_count: u8, frame_size: usize) -> Vec<u8> {
        let mut packet = vec![0u8; 12];
        packet.push(frame_count & 0x0F);
        packet.extend(std::iter::repeat_n(0x5A, usize::from(frame_count) * frame_size));
        packet
    }

    fn stream_with_sink() -> A2dpStream<TestSink> {
        A2dpStream::new(TestSink::default(), RampDecoder::boxed)
    }

    #[test]
    fn pull_before_first_media_unit_yields_silence() {
        let mut core = core_with_decoder();
        let mut out = vec![0x7FFFi16; 64];
        core.fill_request(&mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn drift_control_steps_with_occupancy() {
        let mut core = core_with_decoder();
        let one_frame = vec![0u8; 10];

        // Below the low watermark the resampler stretches.
        core.accept_payload(&vec![0u8; 59 * 10], 59);
        assert_eq!(core.sbc_frames(), 59);
        assert_eq!(core.resample_factor(), FACTOR_NOMINAL - FACTOR_COMPENSATION);

        // Exactly 60 frames, the auto-start occupancy, is already nominal.
        core.accept_payload(&one_frame, 1);
        assert_eq!(core.sbc_frames(), 60);
        assert_eq!(core.resample_factor(), FACTOR_NOMINAL);

        // Still nominal at exactly the high watermark.
        core.accept_payload(&vec![0u8; 60 * 10], 60);
        assert_eq!(core.sbc_frames(), 120);
        assert_eq!(core.resample_factor(), FACTOR_NOMINAL);

        // One frame above it the resampler compresses.
        core.accept_payload(&one_frame, 1);
        assert_eq!(core.sbc_frames(), 121);
        assert_eq!(core.resample_factor(), FACTOR_NOMINAL + FACTOR_COMPENSATION);
    }

    #[test]
    fn overfull_ring_drops_instead_of_growing() {
        let mut core = core_with_decoder();
        let payload = vec![0u8; 120 * MAX_SBC_FRAME_SIZE];
        core.accept_payload(&payload, 120);
        core.accept_payload(&payload, 120);
        assert!(core.sbc_bytes() <= SBC_RING_CAPACITY);
        assert_eq!(core.sbc_bytes(), SBC_RING_CAPACITY);
    }

    #[test]
    fn oversized_frames_are_rejected_whole() {
        let mut core = core_with_decoder();
        let payload = vec![0u8; (MAX_SBC_FRAME_SIZE + 1) * 2];
        core.accept_payload(&payload, 2);
        assert_eq!(core.sbc_bytes(), 0);
        assert_eq!(core.sbc_frame_size(), 0);
    }

    #[test]
    fn underrun_records_shortfall_and_keeps_stale_tail() {
        let mut core = core_with_decoder();
        // 70 buffered frames sits between the watermarks, so the resampler
        // stays at nominal and decode counts are exact: 70 x 16 PCM frames.
        let payload = vec![0u8; 70 * 2];
        core.accept_payload(&payload, 70);
        assert_eq!(core.resample_factor(), FACTOR_NOMINAL);

        // Request more than everything buffered can produce.
        let mut out = vec![0x7FFFi16; 1200 * 2];
        core.fill_request(&mut out);
        assert_eq!(core.pending_frames(), 1200 - 70 * 16);
        // The ramp landed at the front, the stale tail is untouched.
        assert_eq!(out[0], 0);
        assert_eq!(out[1119 * 2], 1119);
        assert!(out[1120 * 2..].iter().all(|&s| s == 0x7FFF));
    }

    #[test]
    fn late_frames_retire_the_pending_request() {
        let mut core = core_with_decoder();
        let payload = vec![0u8; 10];
        core.accept_payload(&payload, 1);

        let mut out = vec![0i16; 48 * 2];
        core.fill_request(&mut out);
        assert!(core.pending_frames() > 0);

        // Ingress decodes for the outstanding request; the late PCM goes
        // through the decoded ring.
        core.accept_payload(&vec![0u8; 3 * 10], 3);
        assert_eq!(core.pending_frames(), 0);
        assert!(core.pcm_frames() > 0);
    }

    #[test]
    fn pull_drains_decoded_ring_before_decoding() {
        let mut core = core_with_decoder();
        core.accept_payload(&vec![0u8; 4 * 10], 4);

        // Low occupancy stretches the resampler, so one decoded frame
        // overfills a 16-frame pull and the surplus lands on the ring.
        let mut out = vec![0i16; 16 * 2];
        core.fill_request(&mut out);
        assert_eq!(core.sbc_frames(), 3);
        assert_eq!(core.pending_frames(), 0);
        let surplus = core.pcm_frames();
        assert!(surplus > 0);

        // A pull the decoded ring can serve alone decodes nothing.
        let mut out2 = vec![0i16; surplus * 2];
        core.fill_request(&mut out2);
        assert_eq!(core.sbc_frames(), 3);
        assert_eq!(core.pcm_frames(), 0);
    }

    #[test]
    fn mixed_framing_stays_within_bounds() {
        let mut core = core_with_decoder();
        core.accept_payload(&vec![0u8; 15 * 10], 15);
        core.accept_payload(&vec![0u8; 7 * 12], 7);
        // The frame size follows the latest packet and reframes whatever is
        // still buffered; that is lossy but must stay in bounds.
        assert_eq!(core.sbc_frame_size(), 12);

        let mut out = vec![0i16; 32 * 2];
        core.fill_request(&mut out);
        core.accept_payload(&vec![0u8; 15 * 10], 15);
        core.fill_request(&mut out);
        assert!(core.sbc_bytes() <= SBC_RING_CAPACITY);
    }

    #[test]
    fn stream_auto_starts_at_low_watermark() {
        let mut stream = stream_with_sink();
        stream
            .handle_event(StreamEvent::Configured(test_config(false)))
            .unwrap();
        stream.handle_event(StreamEvent::Started).unwrap();
        assert_eq!(stream.state(), StreamState::Initialized);
        assert_eq!(stream.sink().init_calls, 1);
        assert!(!stream.sink().started);

        let packet = media_packet(15, 10);
        for _ in 0..3 {
            stream.accept_media_unit(1, &packet);
        }
        assert_eq!(stream.state(), StreamState::Initialized);

        stream.accept_media_unit(1, &packet);
        assert_eq!(stream.state(), StreamState::Started);
        assert!(stream.sink().started);
        assert_eq!(stream.sbc_ring_frames(), 60);
    }

    #[test]
    fn malformed_packets_leave_the_pipeline_untouched() {
        let mut stream = stream_with_sink();
        stream
            .handle_event(StreamEvent::Configured(test_config(false)))
            .unwrap();
        stream.handle_event(StreamEvent::Started).unwrap();

        stream.accept_media_unit(1, &[0u8; 5]);
        // A packet with a zero frame count is dropped too.
        stream.accept_media_unit(1, &media_packet(0, 0));
        assert_eq!(stream.sbc_ring_bytes(), 0);
        assert_eq!(stream.state(), StreamState::Initialized);
    }

    #[test]
    fn packets_while_closed_are_ignored() {
        let mut stream = stream_with_sink();
        stream.accept_media_unit(1, &media_packet(15, 10));
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(stream.sink().init_calls, 0);
    }

    #[test]
    fn suspend_drains_and_pauses() {
        let mut stream = stream_with_sink();
        stream
            .handle_event(StreamEvent::Configured(test_config(false)))
            .unwrap();
        stream.handle_event(StreamEvent::Started).unwrap();
        let packet = media_packet(15, 10);
        for _ in 0..4 {
            stream.accept_media_unit(1, &packet);
        }
        assert_eq!(stream.state(), StreamState::Started);

        stream.handle_event(StreamEvent::Suspended).unwrap();
        assert_eq!(stream.state(), StreamState::Paused);
        assert_eq!(stream.sink().stop_calls, 1);
        assert_eq!(stream.sbc_ring_bytes(), 0);
        assert_eq!(stream.pcm_ring_frames(), 0);
        assert_eq!(stream.pending_request_frames(), 0);
    }

    #[test]
    fn resume_restarts_without_reinitializing() {
        let mut stream = stream_with_sink();
        stream
            .handle_event(StreamEvent::Configured(test_config(false)))
            .unwrap();
        stream.handle_event(StreamEvent::Started).unwrap();
        stream.handle_event(StreamEvent::Suspended).unwrap();

        stream.handle_event(StreamEvent::Started).unwrap();
        assert_eq!(stream.state(), StreamState::Started);
        assert_eq!(stream.sink().init_calls, 1);
        assert_eq!(stream.sink().start_calls, 1);
    }

    #[test]
    fn release_closes_media_processing() {
        let mut stream = stream_with_sink();
        stream
            .handle_event(StreamEvent::Configured(test_config(false)))
            .unwrap();
        stream.handle_event(StreamEvent::Started).unwrap();

        stream.handle_event(StreamEvent::Released).unwrap();
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(stream.sink().close_calls, 1);
        assert!(stream.sink().pull.is_none());

        // Idempotent while closed.
        stream.handle_event(StreamEvent::Released).unwrap();
        assert_eq!(stream.sink().close_calls, 1);
    }

    #[test]
    fn reconfigure_tears_down_before_reinitializing() {
        let mut stream = stream_with_sink();
        stream
            .handle_event(StreamEvent::Configured(test_config(false)))
            .unwrap();
        stream.handle_event(StreamEvent::Started).unwrap();

        stream
            .handle_event(StreamEvent::Configured(test_config(true)))
            .unwrap();
        stream.handle_event(StreamEvent::Started).unwrap();
        assert_eq!(stream.sink().close_calls, 1);
        assert_eq!(stream.sink().init_calls, 2);
        assert_eq!(stream.state(), StreamState::Initialized);
    }

    #[test]
    fn failed_establishment_changes_nothing() {
        let mut stream = stream_with_sink();
        stream
            .handle_event(StreamEvent::Established { status: 0x31 })
            .unwrap();
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn volume_passes_through_to_the_sink() {
        let mut stream = stream_with_sink();
        stream.set_volume(90);
        assert_eq!(stream.sink().volume, Some(90));
    }
}
