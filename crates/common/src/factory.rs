//! Seams between producers, the mixer, and consumer dispatch.

use crate::error::EngineResult;
use crate::format::VideoFormatDesc;
use crate::frame::{DataFrame, ImageBuffer, ProducerFrame};
use crate::types::PixelFormat;

/// Allocates frame storage bound to the mixer's resources.
///
/// Producers receive a factory at `initialize` time and use it for
/// every buffer they emit, so allocation stays under the mixer's
/// control.
pub trait FrameFactory: Send + Sync {
    /// The target format this factory allocates for.
    fn format_desc(&self) -> &VideoFormatDesc;

    /// Allocate a zeroed (identity) frame of the given geometry.
    fn allocate_frame(&self, width: u32, height: u32) -> DataFrame {
        DataFrame::new(ImageBuffer::new(width, height, PixelFormat::Bgra))
    }

    /// Allocate a zeroed frame at the target geometry.
    fn allocate_target_frame(&self) -> DataFrame {
        let desc = self.format_desc();
        self.allocate_frame(desc.width, desc.height)
    }
}

/// Downstream stage the producer device submits each tick's composite
/// to (the mixer, and behind it the consumer dispatch).
///
/// `send` may block — that is the only place backpressure reaches the
/// output clock.
pub trait FrameSink: Send {
    fn send(&mut self, composite: Vec<ProducerFrame>) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::VideoFormat;

    struct FixedFactory(VideoFormatDesc);

    impl FrameFactory for FixedFactory {
        fn format_desc(&self) -> &VideoFormatDesc {
            &self.0
        }
    }

    #[test]
    fn default_allocation_matches_target() {
        let factory = FixedFactory(VideoFormat::Pal.desc());
        let frame = factory.allocate_target_frame();
        assert_eq!(frame.image.width(), 720);
        assert_eq!(frame.image.height(), 576);
        assert!(frame.audio.is_empty());
        assert!(frame.image.data().iter().all(|&b| b == 0));
    }
}
