//! `po-consumer` — Frame sinks and their fan-out dispatch.
//!
//! A [`Consumer`](consumer::Consumer) accepts one final frame per tick
//! on its own bounded executor; a full queue drops the frame rather
//! than stall the clock. The
//! [`ConsumerDevice`](device::ConsumerDevice) dispatches every mixed
//! frame to all registered consumers and paces the pipeline on the
//! single synchronizing consumer (or a frame-period timer when none is
//! registered).

pub mod config;
pub mod consumer;
pub mod device;
pub mod file;
pub mod network;

pub use config::{crc16, FileConsumerConfig, NetworkConsumerConfig};
pub use consumer::{AckFuture, Consumer, ConsumerInfo, SendResult};
pub use device::{ConsumerDevice, ConsumerDeviceHandle};
pub use file::{Encoder, EncoderSettings, FileConsumer, RawFileEncoder};
pub use network::{NetworkConsumer, RecordingWireSink, WireFrame, WireSink};
