//! The consumer capability set.

use po_common::{EngineResult, OutputFrame, TaskFuture, VideoFormatDesc};

/// Outcome of handing a frame to a consumer.
///
/// Distinguishing a drop from an accept lets the dispatcher account
/// per-consumer drops instead of guessing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SendResult {
    Accepted,
    Dropped,
}

/// Acknowledgement future returned by [`Consumer::send`].
pub type AckFuture = TaskFuture<SendResult>;

/// Structured self-description for the control surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerInfo {
    pub kind: String,
    pub fields: Vec<(String, String)>,
}

impl ConsumerInfo {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }
}

/// A sink accepting final frames at the output cadence.
///
/// `send` must return promptly: heavy work belongs on the consumer's
/// own bounded executor, and a full queue resolves to
/// [`SendResult::Dropped`] immediately rather than stalling the
/// dispatcher. Only a consumer that reports a synchronization clock
/// may pace the caller.
pub trait Consumer: Send {
    /// Bind to the channel's format. Called before the first `send`
    /// and again if the consumer is re-registered.
    fn initialize(&mut self, desc: &VideoFormatDesc, channel_index: usize) -> EngineResult<()>;

    /// Accept one frame.
    fn send(&mut self, frame: OutputFrame) -> AckFuture;

    /// Whether this consumer's acknowledgement paces the pipeline.
    /// At most one registered consumer may return `true`.
    fn has_synchronization_clock(&self) -> bool {
        false
    }

    /// How many frames this consumer buffers internally.
    fn buffer_depth(&self) -> usize {
        1
    }

    /// Stable registration index derived from the configuration.
    fn index(&self) -> i32;

    /// Age of the last presented frame, for delay diagnostics.
    fn presentation_frame_age_millis(&self) -> i64 {
        0
    }

    fn name(&self) -> String;

    fn info(&self) -> ConsumerInfo;
}
