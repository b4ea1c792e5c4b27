//! Central error types for the engine (thiserror-based).

use std::time::Duration;

use thiserror::Error;

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("producer error: {0}")]
    Producer(#[from] ProducerError),

    #[error("mux error: {0}")]
    Mux(#[from] MuxError),

    #[error("consumer error: {0}")]
    Consumer(#[from] ConsumerError),

    #[error("executor worker is gone")]
    WorkerGone,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Faults raised by producers; always contained at the layer or
/// transition boundary.
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("source failed: {0}")]
    SourceFailed(String),

    #[error("invalid color spec: {0:?}")]
    InvalidColor(String),

    #[error("producer is not initialized")]
    NotInitialized,
}

/// Frame muxer errors. Overflows escalate to the caller, which resets
/// the muxer; everything else is handled internally.
#[derive(Error, Debug)]
pub enum MuxError {
    #[error(
        "video-stream overflow ({frames} frames buffered). This can be caused by an incorrect \
         frame-rate. Check clip meta-data."
    )]
    VideoOverflow { frames: usize },

    #[error(
        "audio-stream overflow ({samples} samples buffered). This can be caused by an incorrect \
         frame-rate. Check clip meta-data."
    )]
    AudioOverflow { samples: usize },

    #[error("invalid filter {spec:?}: {reason}")]
    InvalidFilter { spec: String, reason: String },
}

/// Consumer-side errors.
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("consumer initialization failed: {0}")]
    InitFailed(String),

    #[error("consumer {adding} declares a synchronization clock but {existing} already holds it")]
    DuplicateSyncClock { existing: i32, adding: i32 },

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("wire sink failed: {0}")]
    Wire(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
