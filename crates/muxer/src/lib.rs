//! `po-muxer` — Rate and field adaptation from source to target cadence.
//!
//! Decoded video frames and audio sample blocks arrive at whatever
//! cadence the source material has (field mode, frame rate, geometry);
//! the [`FrameMuxer`](muxer::FrameMuxer) buffers them, selects a
//! [`DisplayMode`](display_mode::DisplayMode) describing the
//! adaptation rule, runs frames through a software
//! [`FilterChain`](filter::FilterChain) when the rule needs one, and
//! emits frames that conform to the target format with the audio
//! cadence attached.

pub mod display_mode;
pub mod filter;
pub mod muxer;

pub use display_mode::{detect_display_mode, DisplayMode};
pub use filter::{FilterChain, FilterStep};
pub use muxer::{AudioInput, FrameMuxer, MuxerConfig, VideoInput};
