//! Network consumer.
//!
//! Hands one BGRA video frame plus stereo audio per tick to a wire
//! sink (the network SDK lives behind the [`WireSink`] boundary).
//! Sending runs on a bounded executor; a full queue drops the frame so
//! the dispatcher never stalls on a slow receiver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, trace, warn};

use po_common::{
    EngineResult, Executor, FieldMode, ImageBuffer, OutputFrame, TaskFuture, VideoFormatDesc,
};

use crate::config::NetworkConsumerConfig;
use crate::consumer::{AckFuture, Consumer, ConsumerInfo, SendResult};

/// Pending frames before `send` starts dropping.
const SEND_QUEUE_DEPTH: usize = 8;

/// One video frame on its way to the wire.
pub struct WireFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub field_mode: FieldMode,
    /// BGRA pixels at the target geometry.
    pub data: &'a [u8],
}

/// Boundary to the network SDK.
pub trait WireSink: Send {
    fn send_video(&mut self, frame: &WireFrame<'_>) -> EngineResult<()>;
    fn send_audio(&mut self, samples: &[i32], channels: usize) -> EngineResult<()>;
}

/// Wire sink that records what it is given; the reference sink for
/// tests and loopback diagnostics.
#[derive(Clone, Default)]
pub struct RecordingWireSink {
    frames: Arc<Mutex<Vec<(u32, u32, usize)>>>,
    audio_samples: Arc<Mutex<usize>>,
}

impl RecordingWireSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// (width, height, byte length) per received frame.
    pub fn frames(&self) -> Vec<(u32, u32, usize)> {
        self.frames.lock().clone()
    }

    pub fn total_audio_samples(&self) -> usize {
        *self.audio_samples.lock()
    }
}

impl WireSink for RecordingWireSink {
    fn send_video(&mut self, frame: &WireFrame<'_>) -> EngineResult<()> {
        self.frames
            .lock()
            .push((frame.width, frame.height, frame.data.len()));
        Ok(())
    }

    fn send_audio(&mut self, samples: &[i32], _channels: usize) -> EngineResult<()> {
        *self.audio_samples.lock() += samples.len();
        Ok(())
    }
}

struct SinkState {
    sink: Box<dyn WireSink>,
    desc: VideoFormatDesc,
    /// Reused zero buffer for ticks whose image is not at target
    /// geometry.
    black: ImageBuffer,
}

impl SinkState {
    fn dispatch(&mut self, frame: &OutputFrame) {
        let at_target = frame.image.width() == self.desc.width
            && frame.image.height() == self.desc.height;
        let image = if at_target { &frame.image } else { &self.black };
        let wire_frame = WireFrame {
            width: self.desc.width,
            height: self.desc.height,
            field_mode: self.desc.field_mode,
            data: image.data(),
        };
        if let Err(error) = self.sink.send_video(&wire_frame) {
            warn!(%error, "wire video send failed");
        }
        if !frame.audio.is_empty() {
            if let Err(error) = self.sink.send_audio(&frame.audio, 2) {
                warn!(%error, "wire audio send failed");
            }
        }
    }
}

/// Consumer sending frames to a network receiver.
pub struct NetworkConsumer {
    config: NetworkConsumerConfig,
    index: i32,
    sink: Option<Box<dyn WireSink>>,
    executor: Option<Executor<SinkState>>,
    dropped: Arc<AtomicU64>,
}

impl NetworkConsumer {
    pub fn new(config: NetworkConsumerConfig, sink: Box<dyn WireSink>) -> Self {
        let index = config.index();
        Self {
            config,
            index,
            sink: Some(sink),
            executor: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Frames rejected because the send queue was full.
    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Consumer for NetworkConsumer {
    fn initialize(&mut self, desc: &VideoFormatDesc, _channel_index: usize) -> EngineResult<()> {
        let sink = match self.sink.take() {
            Some(sink) => sink,
            None => {
                // Re-initialization on a live consumer keeps the sink.
                match self.executor.take() {
                    Some(executor) => executor
                        .invoke(|state, _| std::mem::replace(&mut state.sink, Box::new(NullSink)))?,
                    None => {
                        return Err(po_common::ConsumerError::InitFailed(
                            "network consumer has no wire sink".into(),
                        )
                        .into())
                    }
                }
            }
        };
        let state = SinkState {
            sink,
            black: ImageBuffer::new(desc.width, desc.height, po_common::PixelFormat::Bgra),
            desc: desc.clone(),
        };
        self.executor = Some(Executor::bounded(
            &format!("network-consumer-{}", self.index),
            state,
            SEND_QUEUE_DEPTH,
        ));
        info!(consumer = %self.name(), "initialized");
        Ok(())
    }

    fn send(&mut self, frame: OutputFrame) -> AckFuture {
        let Some(executor) = &self.executor else {
            return TaskFuture::ready(SendResult::Dropped);
        };
        let accepted = executor.spawn(move |state, _| state.dispatch(&frame));
        if accepted {
            TaskFuture::ready(SendResult::Accepted)
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(consumer = %self.name(), "send queue full, frame dropped");
            TaskFuture::ready(SendResult::Dropped)
        }
    }

    fn buffer_depth(&self) -> usize {
        SEND_QUEUE_DEPTH
    }

    fn index(&self) -> i32 {
        self.index
    }

    fn name(&self) -> String {
        format!("network-consumer[{}]", self.config.name)
    }

    fn info(&self) -> ConsumerInfo {
        ConsumerInfo::new("network-consumer")
            .with("name", &self.config.name)
            .with("groups", &self.config.groups)
    }
}

/// Placeholder sink swapped in while a live sink is being moved.
struct NullSink;

impl WireSink for NullSink {
    fn send_video(&mut self, _frame: &WireFrame<'_>) -> EngineResult<()> {
        Ok(())
    }

    fn send_audio(&mut self, _samples: &[i32], _channels: usize) -> EngineResult<()> {
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
