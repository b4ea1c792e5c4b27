//! File consumer.
//!
//! Encodes final frames to a file through a pluggable [`Encoder`]
//! boundary (the actual codec/muxer library lives behind it). Frames
//! queue on a bounded executor so `send` returns promptly; when the
//! queue is full the frame is counted as dropped. `separate_key`
//! drives a second encoder writing the alpha channel to a `_A`
//! companion file. Teardown flushes codec-delay frames within a
//! budget; a wedged encoder is abandoned rather than allowed to hang
//! shutdown.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, trace, warn};

use po_common::{
    ConsumerError, EngineResult, Executor, FieldMode, ImageBuffer, OutputFrame, PixelFormat,
    Rational, TaskFuture, VideoFormatDesc,
};

use crate::config::FileConsumerConfig;
use crate::consumer::{AckFuture, Consumer, ConsumerInfo, SendResult};

/// Pending frames before `send` starts dropping.
const ENCODE_QUEUE_DEPTH: usize = 8;
/// Teardown budget for the encoder flush.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a codec binding needs to open a stream.
#[derive(Clone, Debug)]
pub struct EncoderSettings {
    pub path: PathBuf,
    pub vcodec: String,
    pub acodec: String,
    /// kbit/s, 0 = encoder default.
    pub vrate: u64,
    /// kbit/s, 0 = encoder default.
    pub arate: u64,
    pub options: Vec<(String, String)>,
    pub width: u32,
    pub height: u32,
    pub time_scale: u32,
    pub duration: u32,
    pub field_mode: FieldMode,
    pub sample_aspect_ratio: Rational,
    pub audio_sample_rate: u32,
    /// Keyframe interval in frames.
    pub gop: u32,
    /// Write the alpha channel instead of the fill.
    pub key_only: bool,
}

/// Codec/muxer boundary. `flush` drains codec-delay frames and writes
/// the trailer; it is called exactly once, at teardown.
pub trait Encoder: Send {
    fn encode(&mut self, frame: &OutputFrame) -> EngineResult<()>;
    fn flush(&mut self) -> EngineResult<()>;
}

/// Constructor for the encoder behind a file consumer.
pub type EncoderFactory =
    Box<dyn Fn(&EncoderSettings) -> EngineResult<Box<dyn Encoder>> + Send + Sync>;

/// Sample aspect ratio for the target format. SD formats carry
/// non-square pixels; `narrow` selects the 4:3 ratio.
pub fn sample_aspect_ratio(desc: &VideoFormatDesc, narrow: bool) -> Rational {
    match (desc.width, desc.height) {
        (720, 576) => {
            if narrow {
                Rational::new(16, 15)
            } else {
                Rational::new(64, 45)
            }
        }
        (720, 486) => {
            if narrow {
                Rational::new(8, 9)
            } else {
                Rational::new(32, 27)
            }
        }
        _ => Rational::ONE,
    }
}

/// Spread the alpha channel over B, G, and R, producing the key
/// picture for a fill+key pair.
pub fn extract_key_image(image: &ImageBuffer) -> ImageBuffer {
    let mut data = Vec::with_capacity(image.data().len());
    match image.format() {
        PixelFormat::Bgra => {
            for pixel in image.data().chunks_exact(4) {
                let alpha = pixel[3];
                data.extend_from_slice(&[alpha, alpha, alpha, 255]);
            }
        }
        PixelFormat::Gray8 => {
            data.extend_from_slice(image.data());
        }
    }
    ImageBuffer::from_vec(image.width(), image.height(), image.format(), data)
}

/// Reference encoder: raw frames into a length-prefixed container.
/// Stands in for the codec binding in tests and diagnostics dumps.
pub struct RawFileEncoder {
    writer: BufWriter<File>,
    settings: EncoderSettings,
    frames_written: u64,
    finished: bool,
}

impl RawFileEncoder {
    pub fn create(settings: &EncoderSettings) -> EngineResult<Box<dyn Encoder>> {
        let file = File::create(&settings.path).map_err(|err| {
            ConsumerError::InitFailed(format!(
                "cannot create {}: {err}",
                settings.path.display()
            ))
        })?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(b"PORAW01\0")
            .and_then(|_| writer.write_all(&settings.width.to_le_bytes()))
            .and_then(|_| writer.write_all(&settings.height.to_le_bytes()))
            .and_then(|_| writer.write_all(&settings.time_scale.to_le_bytes()))
            .and_then(|_| writer.write_all(&settings.duration.to_le_bytes()))
            .map_err(ConsumerError::Io)?;
        Ok(Box::new(Self {
            writer,
            settings: settings.clone(),
            frames_written: 0,
            finished: false,
        }))
    }
}

impl Encoder for RawFileEncoder {
    fn encode(&mut self, frame: &OutputFrame) -> EngineResult<()> {
        let image = if self.settings.key_only {
            extract_key_image(&frame.image)
        } else {
            frame.image.clone()
        };
        self.writer
            .write_all(&frame.number.to_le_bytes())
            .and_then(|_| self.writer.write_all(&(image.data().len() as u64).to_le_bytes()))
            .and_then(|_| self.writer.write_all(image.data()))
            .and_then(|_| {
                self.writer
                    .write_all(&(frame.audio.len() as u64).to_le_bytes())
            })
            .map_err(ConsumerError::Io)?;
        for sample in frame.audio.iter() {
            self.writer
                .write_all(&sample.to_le_bytes())
                .map_err(ConsumerError::Io)?;
        }
        self.frames_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> EngineResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writer
            .write_all(&self.frames_written.to_le_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(ConsumerError::Io)?;
        Ok(())
    }
}

struct EncodeState {
    fill: Box<dyn Encoder>,
    key: Option<Box<dyn Encoder>>,
    age_millis: Arc<AtomicI64>,
}

impl EncodeState {
    fn encode(&mut self, frame: &OutputFrame) {
        if let Err(error) = self.fill.encode(frame) {
            warn!(%error, "fill encode failed");
        }
        if let Some(key) = &mut self.key {
            if let Err(error) = key.encode(frame) {
                warn!(%error, "key encode failed");
            }
        }
        self.age_millis.store(frame.age_millis(), Ordering::Relaxed);
    }

    fn flush(&mut self) {
        if let Err(error) = self.fill.flush() {
            warn!(%error, "fill flush failed");
        }
        if let Some(key) = &mut self.key {
            if let Err(error) = key.flush() {
                warn!(%error, "key flush failed");
            }
        }
    }
}

/// Consumer writing final frames to a file (and optionally a `_A`
/// key file).
pub struct FileConsumer {
    config: FileConsumerConfig,
    index: i32,
    encoder_factory: EncoderFactory,
    executor: Option<Executor<EncodeState>>,
    dropped: Arc<AtomicU64>,
    age_millis: Arc<AtomicI64>,
}

impl FileConsumer {
    /// File consumer backed by the raw reference encoder.
    pub fn new(config: FileConsumerConfig) -> Self {
        Self::with_encoder_factory(config, Box::new(RawFileEncoder::create))
    }

    /// File consumer backed by an external codec binding.
    pub fn with_encoder_factory(config: FileConsumerConfig, factory: EncoderFactory) -> Self {
        let index = config.index();
        Self {
            config,
            index,
            encoder_factory: factory,
            executor: None,
            dropped: Arc::new(AtomicU64::new(0)),
            age_millis: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Frames rejected because the encode queue was full.
    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn settings(&self, desc: &VideoFormatDesc, key_only: bool) -> EncoderSettings {
        EncoderSettings {
            path: if key_only {
                self.config.key_path()
            } else {
                self.config.path.clone()
            },
            vcodec: self.config.vcodec.clone(),
            acodec: self.config.acodec.clone(),
            vrate: self.config.vrate,
            arate: self.config.arate,
            options: self.config.parsed_options(),
            width: desc.width,
            height: desc.height,
            time_scale: desc.time_scale,
            duration: desc.duration,
            field_mode: desc.field_mode,
            sample_aspect_ratio: sample_aspect_ratio(desc, self.config.narrow),
            audio_sample_rate: desc.audio_sample_rate,
            gop: 25,
            key_only,
        }
    }
}

impl Consumer for FileConsumer {
    fn initialize(&mut self, desc: &VideoFormatDesc, _channel_index: usize) -> EngineResult<()> {
        // Re-initialization replaces the previous encoders outright.
        self.executor = None;

        let fill = (self.encoder_factory)(&self.settings(desc, false))?;
        let key = if self.config.separate_key {
            match (self.encoder_factory)(&self.settings(desc, true)) {
                Ok(encoder) => Some(encoder),
                Err(err) => {
                    // Do not leave a half-written fill file behind.
                    let _ = std::fs::remove_file(&self.config.path);
                    return Err(err);
                }
            }
        } else {
            None
        };

        let state = EncodeState {
            fill,
            key,
            age_millis: Arc::clone(&self.age_millis),
        };
        self.executor = Some(Executor::bounded(
            &format!("file-consumer-{}", self.index),
            state,
            ENCODE_QUEUE_DEPTH,
        ));
        info!(consumer = %self.name(), "initialized");
        Ok(())
    }

    fn send(&mut self, frame: OutputFrame) -> AckFuture {
        let Some(executor) = &self.executor else {
            return TaskFuture::ready(SendResult::Dropped);
        };
        let accepted = executor.spawn(move |state, _| state.encode(&frame));
        if accepted {
            TaskFuture::ready(SendResult::Accepted)
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(consumer = %self.name(), "encode queue full, frame dropped");
            TaskFuture::ready(SendResult::Dropped)
        }
    }

    fn buffer_depth(&self) -> usize {
        ENCODE_QUEUE_DEPTH
    }

    fn index(&self) -> i32 {
        self.index
    }

    fn presentation_frame_age_millis(&self) -> i64 {
        self.age_millis.load(Ordering::Relaxed)
    }

    fn name(&self) -> String {
        format!("file-consumer[{}]", self.config.path.display())
    }

    fn info(&self) -> ConsumerInfo {
        ConsumerInfo::new("file-consumer")
            .with("path", self.config.path.display())
            .with("separate_key", self.config.separate_key)
            .with("vcodec", &self.config.vcodec)
            .with("acodec", &self.config.acodec)
    }
}

impl Drop for FileConsumer {
    fn drop(&mut self) {
        let Some(mut executor) = self.executor.take() else {
            return;
        };
        let flushed = executor.begin_invoke(|state, _| state.flush());
        match flushed.wait_timeout(FLUSH_TIMEOUT) {
            Ok(()) => info!(consumer = %self.name(), "flushed and closed"),
            Err(error) => {
                error!(consumer = %self.name(), %error, "flush did not finish in time, releasing forcibly");
                executor.abandon();
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use po_common::{AudioBuffer, EngineError, FieldMode};
    use std::sync::Arc;

    fn desc() -> VideoFormatDesc {
        VideoFormatDesc::custom(8, 8, FieldMode::Progressive, 25, 1, 48_000)
    }

    fn frame(number: u64) -> OutputFrame {
        OutputFrame::new(
            ImageBuffer::solid(8, 8, [1, 2, 3, 128]),
            Arc::new(AudioBuffer::from(vec![5i32; 4])),
            number,
        )
    }

    fn temp_config(name: &str) -> (tempfile::TempDir, FileConsumerConfig) {
        let dir = tempfile::TempDir::new().unwrap();
        let config = FileConsumerConfig::new(dir.path().join(name));
        (dir, config)
    }

    #[test]
    fn writes_header_and_frames() {
        let (dir, config) = temp_config("out.mov");
        let path = config.path.clone();
        {
            let mut consumer = FileConsumer::new(config);
            consumer.initialize(&desc(), 1).unwrap();
            for i in 0..3 {
                let mut ack = consumer.send(frame(i));
                assert_eq!(ack.try_ready(), Some(SendResult::Accepted));
            }
        }
        // Dropped: flushed and closed.
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PORAW01\0"));
        // Header + 3 frames of 8x8 BGRA + audio + trailer.
        assert!(bytes.len() > 3 * 8 * 8 * 4);
        drop(dir);
    }

    #[test]
    fn separate_key_writes_companion_file() {
        let (dir, config) = temp_config("show.mov");
        let config = FileConsumerConfig {
            separate_key: true,
            ..config
        };
        let fill_path = config.path.clone();
        let key_path = config.key_path();
        {
            let mut consumer = FileConsumer::new(config);
            consumer.initialize(&desc(), 1).unwrap();
            consumer.send(frame(0));
        }
        assert!(fill_path.exists());
        assert!(key_path.exists());
        assert!(key_path.to_string_lossy().ends_with("show_A.mov"));

        // The key file carries the alpha spread over BGR.
        let key_bytes = std::fs::read(&key_path).unwrap();
        let header = 8 + 4 * 4 + 8 + 8; // magic + geometry/fps + number + length
        assert_eq!(&key_bytes[header..header + 4], &[128, 128, 128, 255]);
        drop(dir);
    }

    #[test]
    fn send_before_initialize_drops() {
        let (_dir, config) = temp_config("x.mov");
        let mut consumer = FileConsumer::new(config);
        let mut ack = consumer.send(frame(0));
        assert_eq!(ack.try_ready(), Some(SendResult::Dropped));
        assert_eq!(consumer.frames_dropped(), 0); // not counted: never opened
    }

    #[test]
    fn full_queue_counts_drops() {
        struct StuckEncoder(crossbeam::channel::Receiver<()>);
        impl Encoder for StuckEncoder {
            fn encode(&mut self, _frame: &OutputFrame) -> EngineResult<()> {
                let _ = self.0.recv();
                Ok(())
            }
            fn flush(&mut self) -> EngineResult<()> {
                Ok(())
            }
        }

        let (gate_tx, gate_rx) = crossbeam::channel::unbounded();
        let (_dir, config) = temp_config("slow.mov");
        let mut consumer = FileConsumer::with_encoder_factory(
            config,
            Box::new(move |_settings| -> EngineResult<Box<dyn Encoder>> {
                Ok(Box::new(StuckEncoder(gate_rx.clone())))
            }),
        );
        consumer.initialize(&desc(), 1).unwrap();

        // First frame occupies the worker, the next fill the queue.
        let mut accepted = 0;
        let mut dropped = 0;
        for i in 0..ENCODE_QUEUE_DEPTH as u64 + 5 {
            let mut ack = consumer.send(frame(i));
            match ack.try_ready() {
                Some(SendResult::Accepted) => accepted += 1,
                Some(SendResult::Dropped) => dropped += 1,
                None => panic!("file consumer acks immediately"),
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(accepted >= ENCODE_QUEUE_DEPTH as u64);
        assert!(dropped >= 1);
        assert_eq!(consumer.frames_dropped(), dropped);

        // Unblock so teardown flushes quickly.
        for _ in 0..accepted {
            let _ = gate_tx.send(());
        }
    }

    #[test]
    fn failed_initialize_reports_error() {
        let config = FileConsumerConfig::new("/nonexistent-dir-zzz/out.mov");
        let mut consumer = FileConsumer::new(config);
        let result = consumer.initialize(&desc(), 1);
        assert!(matches!(
            result,
            Err(EngineError::Consumer(ConsumerError::InitFailed(_)))
        ));
    }

    #[test]
    fn index_matches_config_fingerprint() {
        let (_dir, config) = temp_config("stable.mov");
        let expected = config.index();
        let consumer = FileConsumer::new(config);
        assert_eq!(consumer.index(), expected);
        assert!(!consumer.has_synchronization_clock());
        assert_eq!(consumer.buffer_depth(), ENCODE_QUEUE_DEPTH);
    }

    #[test]
    fn sample_aspect_ratios_for_sd() {
        let pal = VideoFormatDesc::custom(720, 576, FieldMode::Upper, 25, 1, 48_000);
        assert_eq!(sample_aspect_ratio(&pal, false), Rational::new(64, 45));
        assert_eq!(sample_aspect_ratio(&pal, true), Rational::new(16, 15));

        let ntsc = VideoFormatDesc::custom(720, 486, FieldMode::Lower, 30, 1, 48_000);
        assert_eq!(sample_aspect_ratio(&ntsc, false), Rational::new(32, 27));
        assert_eq!(sample_aspect_ratio(&ntsc, true), Rational::new(8, 9));

        let hd = VideoFormatDesc::custom(1920, 1080, FieldMode::Progressive, 50, 1, 48_000);
        assert_eq!(sample_aspect_ratio(&hd, false), Rational::ONE);
    }

    #[test]
    fn key_extraction_spreads_alpha() {
        let image = ImageBuffer::solid(2, 2, [10, 20, 30, 77]);
        let key = extract_key_image(&image);
        assert_eq!(key.pixel(0, 0), &[77, 77, 77, 255]);
        assert_eq!(key.pixel(1, 1), &[77, 77, 77, 255]);
    }
}
