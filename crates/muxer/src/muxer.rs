//! The frame muxer.
//!
//! Ingests decoded video frames and audio sample blocks at the source
//! cadence and emits target-conformant frames with the audio cadence
//! attached. Video and audio each buffer in a queue of per-segment
//! sub-queues; `Flush` inputs open a new sub-queue, `Empty` inputs
//! insert identity material. Emission pairs the front video sub-queue
//! with the front audio sub-queue and consumes one cadence entry per
//! frame, rotating the cadence round-robin.
//!
//! The audio cadence is rotated one step at construction (the
//! 1001-family pattern fills the mixer most evenly that way) and the
//! rotation state survives flushes, so sample counts are conserved
//! across segment boundaries.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use po_common::{
    AudioBuffer, DataFrame, DecodedFrame, EngineResult, FieldMode, FrameFactory, ImageBuffer,
    MuxError, ProducerFrame,
};

use crate::display_mode::{detect_display_mode, effective_source_mode, DisplayMode};
use crate::filter::{append_filter, AssumedFormat, FilterChain};

/// Maximum frames in one video sub-queue before the stream is declared
/// broken.
const VIDEO_QUEUE_LIMIT: usize = 32;
/// Audio sub-queue bound, in cadence entries.
const AUDIO_QUEUE_LIMIT: usize = 32;

/// Video-side input.
pub enum VideoInput {
    Frame(Box<DecodedFrame>),
    /// Identity frame of target geometry.
    Empty,
    /// Segment boundary: open a new sub-queue.
    Flush,
}

/// Audio-side input.
pub enum AudioInput {
    Samples(AudioBuffer),
    /// One cadence entry of silence.
    Empty,
    /// Segment boundary: open a new sub-queue.
    Flush,
}

/// Static muxer options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MuxerConfig {
    /// User filter spec, composed with adaptation steps as needed.
    pub filter: String,
    /// Allow cadence/field adaptation (off forces simple pass-through).
    pub auto_transcode: bool,
    /// Honour per-frame deinterlace hints.
    pub auto_deinterlace: bool,
    /// Source is MXF material (enables the 720x608 VBI strip).
    pub is_mxf: bool,
    /// Interleaved audio channel count.
    pub channels: usize,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            filter: String::new(),
            auto_transcode: true,
            auto_deinterlace: true,
            is_mxf: false,
            channels: 2,
        }
    }
}

/// Rate/field adaptation engine for one source stream.
pub struct FrameMuxer {
    video_streams: VecDeque<VecDeque<DataFrame>>,
    audio_streams: VecDeque<AudioBuffer>,
    frame_buffer: VecDeque<ProducerFrame>,
    display_mode: DisplayMode,
    source_fps: f64,
    factory: Arc<dyn FrameFactory>,
    config: MuxerConfig,
    cadence: Vec<usize>,
    filter: Option<FilterChain>,
    force_deinterlacing: bool,
}

impl FrameMuxer {
    pub fn new(source_fps: f64, factory: Arc<dyn FrameFactory>, config: MuxerConfig) -> Self {
        let mut cadence = factory.format_desc().audio_cadence.clone();
        // One-step rotation fills the audio mixer most evenly for the
        // 1001-family cadences.
        cadence.rotate_right(1);
        let mut video_streams = VecDeque::new();
        video_streams.push_back(VecDeque::new());
        let mut audio_streams = VecDeque::new();
        audio_streams.push_back(AudioBuffer::new());
        Self {
            video_streams,
            audio_streams,
            frame_buffer: VecDeque::new(),
            display_mode: DisplayMode::Invalid,
            source_fps,
            factory,
            config,
            cadence,
            filter: None,
            force_deinterlacing: false,
        }
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    /// Ingest video. `deinterlace_hint` is the producer's request for
    /// forced deinterlacing on this frame.
    pub fn push_video(&mut self, input: VideoInput, deinterlace_hint: bool) -> EngineResult<()> {
        match input {
            VideoInput::Flush => {
                self.video_streams.push_back(VecDeque::new());
                trace!("video flush: new segment");
            }
            VideoInput::Empty => {
                let frame = self.factory.allocate_target_frame();
                self.video_streams
                    .back_mut()
                    .expect("at least one segment")
                    .push_back(frame);
                self.display_mode = DisplayMode::Simple;
                trace!("empty video frame queued");
            }
            VideoInput::Frame(frame) => {
                let format_changed = match &self.filter {
                    Some(filter) => filter.is_frame_format_changed(&frame),
                    None => true,
                };
                if format_changed {
                    debug!("frame format changed, resetting display mode");
                    self.display_mode = DisplayMode::Invalid;
                }
                if self.config.auto_deinterlace && self.force_deinterlacing != deinterlace_hint {
                    self.force_deinterlacing = deinterlace_hint;
                    self.display_mode = DisplayMode::Invalid;
                }
                if self.filter.is_none() || self.display_mode == DisplayMode::Invalid {
                    self.update_display_mode(&frame);
                }

                let filter = self.filter.as_mut().expect("configured above");
                filter.push(*frame);
                let segment = self.video_streams.back_mut().expect("at least one segment");
                for out in filter.poll_all() {
                    segment.push_back(DataFrame {
                        image: out.image,
                        audio: AudioBuffer::new(),
                        picture_number: out.picture_number,
                    });
                }
            }
        }

        let buffered = self.video_streams.back().map_or(0, VecDeque::len);
        if buffered > VIDEO_QUEUE_LIMIT {
            return Err(MuxError::VideoOverflow { frames: buffered }.into());
        }
        Ok(())
    }

    /// Ingest audio samples (interleaved, `config.channels` wide).
    pub fn push_audio(&mut self, input: AudioInput) -> EngineResult<()> {
        match input {
            AudioInput::Flush => {
                self.audio_streams.push_back(AudioBuffer::new());
                trace!("audio flush: new segment");
            }
            AudioInput::Empty => {
                let silence = self.cadence[0] * self.config.channels;
                self.audio_streams
                    .back_mut()
                    .expect("at least one segment")
                    .extend(std::iter::repeat(0).take(silence));
            }
            AudioInput::Samples(samples) => {
                self.audio_streams
                    .back_mut()
                    .expect("at least one segment")
                    .extend(samples);
            }
        }

        let buffered = self.audio_streams.back().map_or(0, Vec::len);
        if buffered > AUDIO_QUEUE_LIMIT * self.cadence[0] * self.config.channels {
            return Err(MuxError::AudioOverflow { samples: buffered }.into());
        }
        Ok(())
    }

    /// Whether enough video is buffered for one emission.
    pub fn video_ready(&self) -> bool {
        self.video_streams.len() > 1
            || (self.video_streams.len() >= self.audio_streams.len() && self.video_ready_front())
    }

    /// Whether enough audio is buffered for one emission.
    pub fn audio_ready(&self) -> bool {
        self.audio_streams.len() > 1
            || (self.audio_streams.len() >= self.video_streams.len() && self.audio_ready_front())
    }

    fn video_ready_front(&self) -> bool {
        let front = self.video_streams.front().map_or(0, VecDeque::len);
        match self.display_mode {
            // These consume two source frames per emitted frame.
            DisplayMode::Interlace | DisplayMode::Half => front >= 2,
            _ => front >= 1,
        }
    }

    fn audio_ready_front(&self) -> bool {
        let front = self.audio_streams.front().map_or(0, Vec::len);
        let needed = self.cadence[0] * self.config.channels;
        match self.display_mode {
            // Duplicate attaches a cadence slice to both copies.
            DisplayMode::Duplicate => front / 2 >= needed,
            _ => front >= needed,
        }
    }

    /// Emit the next target-conformant frame, if one can be formed.
    pub fn poll(&mut self) -> Option<ProducerFrame> {
        if let Some(frame) = self.frame_buffer.pop_front() {
            return Some(frame);
        }

        // A segment boundary with surplus on one side only: discard
        // the misaligned front segments.
        if self.video_streams.len() > 1
            && self.audio_streams.len() > 1
            && (!self.video_ready_front() || !self.audio_ready_front())
        {
            let video_left = self.video_streams.front().map_or(0, VecDeque::len);
            let audio_left = self.audio_streams.front().map_or(0, Vec::len);
            if video_left > 0 || audio_left > 0 {
                warn!(
                    video_frames = video_left,
                    audio_samples = audio_left,
                    "truncating misaligned segment"
                );
            }
            self.video_streams.pop_front();
            self.audio_streams.pop_front();
        }

        if !self.video_ready_front()
            || !self.audio_ready_front()
            || self.display_mode == DisplayMode::Invalid
        {
            return None;
        }

        let mut first = self.pop_video();
        first.audio = self.pop_audio();

        match self.display_mode {
            DisplayMode::Simple
            | DisplayMode::Deinterlace
            | DisplayMode::DeinterlaceBob
            | DisplayMode::ScaleInterlaced => {
                self.frame_buffer
                    .push_back(ProducerFrame::Data(Arc::new(first)));
            }
            DisplayMode::Interlace => {
                let second = self.pop_video();
                let field_mode = self.factory.format_desc().field_mode;
                self.frame_buffer
                    .push_back(ProducerFrame::Data(Arc::new(weave_frames(
                        first, second, field_mode,
                    ))));
            }
            DisplayMode::Duplicate => {
                let mut second = first.clone();
                second.audio = self.pop_audio();
                self.frame_buffer
                    .push_back(ProducerFrame::Data(Arc::new(first)));
                self.frame_buffer
                    .push_back(ProducerFrame::Data(Arc::new(second)));
            }
            DisplayMode::Half => {
                self.pop_video(); // Drop the second source frame.
                self.frame_buffer
                    .push_back(ProducerFrame::Data(Arc::new(first)));
            }
            DisplayMode::Invalid => unreachable!("checked above"),
        }

        self.frame_buffer.pop_front()
    }

    /// Full reset after an overflow. Buffers, staged frames, and the
    /// filter queue are discarded; the cadence rotation is preserved.
    pub fn clear(&mut self) {
        self.video_streams.clear();
        self.video_streams.push_back(VecDeque::new());
        self.audio_streams.clear();
        self.audio_streams.push_back(AudioBuffer::new());
        self.frame_buffer.clear();
        if let Some(filter) = &mut self.filter {
            filter.clear();
        }
    }

    fn pop_video(&mut self) -> DataFrame {
        self.video_streams
            .front_mut()
            .and_then(VecDeque::pop_front)
            .expect("video_ready_front checked")
    }

    fn pop_audio(&mut self) -> AudioBuffer {
        let needed = self.cadence[0] * self.config.channels;
        let front = self.audio_streams.front_mut().expect("at least one segment");
        debug_assert!(front.len() >= needed, "audio_ready_front checked");
        let samples: AudioBuffer = front.drain(..needed.min(front.len())).collect();
        self.cadence.rotate_left(1);
        samples
    }

    fn update_display_mode(&mut self, frame: &DecodedFrame) {
        let desc = self.factory.format_desc().clone();
        let mut filter_spec = self.config.filter.to_ascii_lowercase();

        let tagged = if frame.interlaced {
            if frame.top_field_first {
                FieldMode::Upper
            } else {
                FieldMode::Lower
            }
        } else {
            FieldMode::Progressive
        };
        let source_mode =
            effective_source_mode(tagged, frame.image.height(), self.source_fps);

        let mut mode = if self.config.auto_transcode {
            detect_display_mode(source_mode, self.source_fps, desc.field_mode, desc.fps())
        } else {
            DisplayMode::Simple
        };

        // Mismatched interlaced geometry needs the field-aware scaler.
        // NTSC DV (480 source on a 486 target) and IMX 720x608 on PAL
        // are handled as-is.
        let ntsc_dv = frame.image.height() == 480 && desc.height == 486;
        let imx_on_pal =
            frame.image.width() == 720 && frame.image.height() == 608 && desc.height == 576;
        if !ntsc_dv
            && mode == DisplayMode::Simple
            && source_mode.is_interlaced()
            && desc.field_mode.is_interlaced()
            && frame.image.height() != desc.height
            && !imx_on_pal
        {
            mode = DisplayMode::ScaleInterlaced;
        }

        if self.force_deinterlacing
            && frame.interlaced
            && mode != DisplayMode::Deinterlace
            && mode != DisplayMode::DeinterlaceBob
        {
            mode = DisplayMode::ScaleInterlaced;
        }

        if self.config.is_mxf && frame.image.width() == 720 && frame.image.height() == 608 {
            filter_spec = append_filter(&filter_spec, "crop=720:576:0:32");
        }
        match mode {
            DisplayMode::Deinterlace => filter_spec = append_filter(&filter_spec, "yadif=0:-1"),
            DisplayMode::DeinterlaceBob => filter_spec = append_filter(&filter_spec, "yadif=1:-1"),
            DisplayMode::ScaleInterlaced => {
                filter_spec = append_filter(
                    &filter_spec,
                    &format!("scale={}:{}:interl=1", desc.width, desc.height),
                );
            }
            _ => {}
        }

        if mode == DisplayMode::Invalid {
            debug!(
                source_fps = self.source_fps,
                %source_mode,
                "failed to detect display mode, falling back to simple"
            );
            mode = DisplayMode::Simple;
        }
        self.display_mode = mode;

        let assumed = AssumedFormat::of(frame);
        self.filter = Some(match FilterChain::new(&filter_spec, assumed) {
            Ok(chain) => chain,
            Err(error) => {
                warn!(%error, "filter configuration failed, disabling filtering");
                FilterChain::fast_path(assumed)
            }
        });

        debug!(
            mode = %self.display_mode,
            source = %format!(
                "{}x{} {} {:.3} fps",
                frame.image.width(),
                frame.image.height(),
                source_mode,
                self.source_fps
            ),
            filter = %filter_spec,
            "display mode selected"
        );
    }
}

/// Weave two progressive frames into one interlaced frame. The first
/// frame supplies the temporally-first field of the target field
/// order.
fn weave_frames(first: DataFrame, second: DataFrame, field_mode: FieldMode) -> DataFrame {
    let a = &first.image;
    let b = &second.image;
    if a.width() != b.width() || a.height() != b.height() {
        // Geometry drift mid-pair; emit the first frame rather than
        // corrupt memory.
        warn!("cannot weave frames of different geometry");
        return first;
    }
    // Upper field first: frame 1 owns the even lines.
    let first_parity = match field_mode {
        FieldMode::Lower => 1,
        _ => 0,
    };
    let mut data = Vec::with_capacity(a.data().len());
    for row in 0..a.height() {
        if row % 2 == first_parity {
            data.extend_from_slice(a.row(row));
        } else {
            data.extend_from_slice(b.row(row));
        }
    }
    DataFrame {
        image: ImageBuffer::from_vec(a.width(), a.height(), a.format(), data),
        audio: first.audio,
        picture_number: first.picture_number,
    }
}

// ── Tests ────────────────────────────────────────────────────────────
