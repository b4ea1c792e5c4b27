//! Constant-color producer.
//!
//! Fills the target geometry with one color forever. Used for solid
//! backgrounds, black/identity fills, and as the simplest real source
//! in tests.

use std::sync::Arc;

use po_common::{
    DataFrame, EngineError, EngineResult, FrameFactory, ImageBuffer, ProducerError, ProducerFrame,
};

use crate::producer::Producer;

/// Producer yielding the same solid-color frame every tick.
pub struct ColorProducer {
    spec: String,
    bgra: [u8; 4],
    frame: Option<ProducerFrame>,
}

impl ColorProducer {
    /// Accepts `#AARRGGBB`, `#RRGGBB`, or a small set of named colors.
    pub fn new(spec: &str) -> EngineResult<Self> {
        let bgra = parse_color(spec)
            .ok_or_else(|| EngineError::Producer(ProducerError::InvalidColor(spec.to_string())))?;
        Ok(Self {
            spec: spec.to_string(),
            bgra,
            frame: None,
        })
    }

    pub fn bgra(&self) -> [u8; 4] {
        self.bgra
    }
}

impl Producer for ColorProducer {
    fn receive(&mut self) -> EngineResult<ProducerFrame> {
        self.frame
            .clone()
            .ok_or_else(|| EngineError::Producer(ProducerError::NotInitialized))
    }

    fn initialize(&mut self, factory: &Arc<dyn FrameFactory>) -> EngineResult<()> {
        let desc = factory.format_desc();
        let image = ImageBuffer::solid(desc.width, desc.height, self.bgra);
        self.frame = Some(ProducerFrame::Data(Arc::new(DataFrame::new(image))));
        Ok(())
    }

    fn name(&self) -> String {
        format!("color[{}]", self.spec)
    }
}

/// Parse a color spec into BGRA bytes.
fn parse_color(spec: &str) -> Option<[u8; 4]> {
    if let Some(hex) = spec.strip_prefix('#') {
        return match hex.len() {
            8 => {
                let a = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let r = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let g = u8::from_str_radix(&hex[4..6], 16).ok()?;
                let b = u8::from_str_radix(&hex[6..8], 16).ok()?;
                Some([b, g, r, a])
            }
            6 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                Some([b, g, r, 255])
            }
            _ => None,
        };
    }
    match spec.to_ascii_lowercase().as_str() {
        "black" => Some([0, 0, 0, 255]),
        "white" => Some([255, 255, 255, 255]),
        "red" => Some([0, 0, 255, 255]),
        "green" => Some([0, 255, 0, 255]),
        "blue" => Some([255, 0, 0, 255]),
        "yellow" => Some([0, 255, 255, 255]),
        "cyan" => Some([255, 255, 0, 255]),
        "magenta" => Some([255, 0, 255, 255]),
        "empty" | "transparent" => Some([0, 0, 0, 0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use po_common::{VideoFormat, VideoFormatDesc};

    struct TestFactory(VideoFormatDesc);

    impl FrameFactory for TestFactory {
        fn format_desc(&self) -> &VideoFormatDesc {
            &self.0
        }
    }

    fn factory() -> Arc<dyn FrameFactory> {
        Arc::new(TestFactory(VideoFormat::Pal.desc()))
    }

    #[test]
    fn parses_named_colors() {
        assert_eq!(parse_color("red"), Some([0, 0, 255, 255]));
        assert_eq!(parse_color("BLUE"), Some([255, 0, 0, 255]));
        assert_eq!(parse_color("transparent"), Some([0, 0, 0, 0]));
    }

    #[test]
    fn parses_hex_with_and_without_alpha() {
        assert_eq!(parse_color("#80FF0000"), Some([0, 0, 255, 128]));
        assert_eq!(parse_color("#00FF00"), Some([0, 255, 0, 255]));
    }

    #[test]
    fn rejects_bad_specs() {
        assert!(ColorProducer::new("#12345").is_err());
        assert!(ColorProducer::new("chartreuse-ish").is_err());
    }

    #[test]
    fn receive_before_initialize_is_an_error() {
        let mut producer = ColorProducer::new("red").unwrap();
        assert!(producer.receive().is_err());
    }

    #[test]
    fn yields_constant_frames_at_target_geometry() {
        let mut producer = ColorProducer::new("red").unwrap();
        producer.initialize(&factory()).unwrap();
        let first = producer.receive().unwrap();
        let second = producer.receive().unwrap();
        assert_eq!(first, second);
        match first {
            ProducerFrame::Data(data) => {
                assert_eq!(data.image.width(), 720);
                assert_eq!(data.image.height(), 576);
                assert_eq!(data.image.pixel(0, 0), &[0, 0, 255, 255]);
            }
            other => panic!("expected data frame, got {other:?}"),
        }
    }

    #[test]
    fn name_includes_spec() {
        let producer = ColorProducer::new("green").unwrap();
        assert_eq!(producer.name(), "color[green]");
    }
}
