//! The producer capability set.

use std::sync::Arc;

use tracing::warn;

use po_common::{EngineResult, FrameFactory, ProducerFrame};

/// A lazy source of frames.
///
/// `receive` yields the next frame or `Eof` at stream end; it must be
/// non-blocking from the caller's view (a source waiting on a decoder
/// returns an identity frame rather than stalling the tick).
///
/// A producer may nominate a successor for seamless continuation: when
/// it returns `Eof` the owning layer or transition takes
/// `following_producer`, initializes it, and registers the expiring
/// producer as the successor's leading producer.
pub trait Producer: Send {
    /// Produce the next frame.
    ///
    /// Errors are contained by the caller: the producer is dropped and
    /// the slot plays empty.
    fn receive(&mut self) -> EngineResult<ProducerFrame>;

    /// Transfer the producer that should play after this one ends.
    fn following_producer(&mut self) -> Option<Box<dyn Producer>> {
        None
    }

    /// Register the producer this one takes over from (transitions use
    /// it as their blend source).
    fn set_leading_producer(&mut self, _leading: Box<dyn Producer>) {}

    /// Bind to the mixer's frame factory. Called at most once, before
    /// the first `receive`.
    fn initialize(&mut self, _factory: &Arc<dyn FrameFactory>) -> EngineResult<()> {
        Ok(())
    }

    fn name(&self) -> String;
}

/// Advance a producer slot one frame, containing faults and following
/// the successor chain on end-of-stream.
///
/// - An empty slot yields `Eof`.
/// - A `receive` error drops the producer (the slot is cleared).
/// - On `Eof`, the producer's successor (if any) is initialized,
///   handed the expiring producer as its leading producer, and asked
///   for a frame in its place.
pub fn advance_slot(
    slot: &mut Option<Box<dyn Producer>>,
    factory: &Arc<dyn FrameFactory>,
) -> ProducerFrame {
    loop {
        let Some(producer) = slot.as_mut() else {
            return ProducerFrame::Eof;
        };

        let frame = match producer.receive() {
            Ok(frame) => frame,
            Err(error) => {
                warn!(producer = %producer.name(), %error, "producer failed, removing it");
                *slot = None;
                return ProducerFrame::Eof;
            }
        };

        if !frame.is_eof() {
            return frame;
        }

        let Some(mut following) = producer.following_producer() else {
            return ProducerFrame::Eof;
        };
        if let Err(error) = following.initialize(factory) {
            warn!(producer = %following.name(), %error, "failed to initialize following producer, removing it");
            *slot = None;
            return ProducerFrame::Eof;
        }
        let expired = slot.take().expect("slot checked above");
        following.set_leading_producer(expired);
        *slot = Some(following);
        // Retry with the successor in place.
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use po_common::{EngineError, ProducerError};

    /// Yields a fixed number of `Empty` frames, then `Eof`; optionally
    /// nominates a successor.
    pub struct CountingProducer {
        pub remaining: u32,
        pub following: Option<Box<dyn Producer>>,
        pub leading_names: Vec<String>,
        pub initialized: bool,
        name: String,
    }

    impl CountingProducer {
        pub fn new(name: &str, frames: u32) -> Self {
            Self {
                remaining: frames,
                following: None,
                leading_names: Vec::new(),
                initialized: false,
                name: name.to_string(),
            }
        }
    }

    impl Producer for CountingProducer {
        fn receive(&mut self) -> EngineResult<ProducerFrame> {
            if self.remaining == 0 {
                return Ok(ProducerFrame::Eof);
            }
            self.remaining -= 1;
            Ok(ProducerFrame::Empty)
        }

        fn following_producer(&mut self) -> Option<Box<dyn Producer>> {
            self.following.take()
        }

        fn set_leading_producer(&mut self, leading: Box<dyn Producer>) {
            self.leading_names.push(leading.name());
        }

        fn initialize(&mut self, _factory: &Arc<dyn FrameFactory>) -> EngineResult<()> {
            self.initialized = true;
            Ok(())
        }

        fn name(&self) -> String {
            self.name.clone()
        }
    }

    /// Fails on every `receive`.
    pub struct FaultyProducer;

    impl Producer for FaultyProducer {
        fn receive(&mut self) -> EngineResult<ProducerFrame> {
            Err(EngineError::Producer(ProducerError::SourceFailed(
                "broken".into(),
            )))
        }

        fn name(&self) -> String {
            "faulty".into()
        }
    }
}
