//! `po-producer` — Sources, transitions, layers, and the output clock.
//!
//! A [`Producer`](producer::Producer) lazily yields one frame per
//! tick. [`Layer`](layer::Layer)s wrap a foreground (and optional
//! background) producer behind a play/pause/stop state machine, and
//! the [`ProducerDevice`](device::ProducerDevice) drives every layer
//! once per frame period, compositing the results for the mixer.
//! [`TransitionProducer`](transition::TransitionProducer) blends one
//! producer into another over a fixed number of frames and hands the
//! layer over to the destination when it expires.

pub mod color;
pub mod device;
pub mod layer;
pub mod producer;
pub mod transition;

pub use color::ColorProducer;
pub use device::ProducerDevice;
pub use layer::{Layer, LoadMode};
pub use producer::Producer;
pub use transition::{TransitionDirection, TransitionInfo, TransitionKind, TransitionProducer};
