//! `po-common` — Shared types, traits, and errors for the playout engine.
//!
//! This crate is the foundation that all other engine crates depend on.
//! It defines the core abstractions:
//!
//! - **Types**: `Rational`, `FieldMode`, `PixelFormat` (newtypes for safety)
//! - **Format**: `VideoFormat`, `VideoFormatDesc` (target format table with audio cadence)
//! - **Frames**: `ImageBuffer`, `DataFrame`, `ProducerFrame`, `DecodedFrame`, `OutputFrame`
//! - **Factory**: `FrameFactory`, `FrameSink` (seams between producers, mixer, and dispatch)
//! - **Executor**: `Executor`, `TaskFuture` (one serial worker per stateful component)
//! - **Errors**: `EngineError`, `ProducerError`, `MuxError`, `ConsumerError` (thiserror-based)
//! - **Config**: `ChannelConfig`

pub mod config;
pub mod error;
pub mod executor;
pub mod factory;
pub mod format;
pub mod frame;
pub mod types;

// Re-export commonly used items at crate root
pub use config::ChannelConfig;
pub use error::{ConsumerError, EngineError, EngineResult, MuxError, ProducerError};
pub use executor::{Executor, ExecutorHandle, TaskFuture};
pub use factory::{FrameFactory, FrameSink};
pub use format::{VideoFormat, VideoFormatDesc};
pub use frame::{
    AudioBuffer, DataFrame, DecodedFrame, FrameTransform, ImageBuffer, OutputFrame, ProducerFrame,
};
pub use types::{FieldMode, PixelFormat, Rational};
