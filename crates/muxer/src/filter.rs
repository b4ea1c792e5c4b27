//! Software filter chain.
//!
//! The muxer composes a filter spec string (user filters plus the
//! steps the display mode needs) and parses it into concrete CPU
//! steps: `crop=W:H:X:Y`, `yadif=MODE:-1`, `scale=W:H:interl=1`. An
//! empty spec takes the fast path — frames are queued and returned
//! verbatim with no per-pixel work.

use std::collections::VecDeque;

use po_common::{DecodedFrame, ImageBuffer, MuxError, PixelFormat};

/// One parsed filter step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterStep {
    /// Cut a window out of the frame (VBI strip and similar).
    Crop { width: u32, height: u32, x: u32, y: u32 },
    /// Deinterlace; `double_rate` emits one frame per field.
    Deinterlace { double_rate: bool },
    /// Resize, field-aware when `interlaced`.
    Scale {
        width: u32,
        height: u32,
        interlaced: bool,
    },
}

/// Join two filter specs.
pub fn append_filter(spec: &str, step: &str) -> String {
    if spec.is_empty() {
        step.to_string()
    } else {
        format!("{spec},{step}")
    }
}

fn parse_error(spec: &str, reason: impl Into<String>) -> MuxError {
    MuxError::InvalidFilter {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

/// Parse a comma-separated filter spec.
pub fn parse_filter_spec(spec: &str) -> Result<Vec<FilterStep>, MuxError> {
    let mut steps = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, args) = part.split_once('=').unwrap_or((part, ""));
        let step = match name.to_ascii_lowercase().as_str() {
            "crop" => {
                let values = parse_numbers(args, 4).ok_or_else(|| {
                    parse_error(spec, format!("crop wants W:H:X:Y, got {args:?}"))
                })?;
                FilterStep::Crop {
                    width: values[0],
                    height: values[1],
                    x: values[2],
                    y: values[3],
                }
            }
            "yadif" => {
                let mode = args
                    .split(':')
                    .next()
                    .and_then(|m| m.parse::<u32>().ok())
                    .ok_or_else(|| parse_error(spec, format!("yadif wants MODE:PARITY, got {args:?}")))?;
                FilterStep::Deinterlace {
                    double_rate: mode == 1,
                }
            }
            "scale" => {
                let mut parts = args.split(':');
                let width = parts
                    .next()
                    .and_then(|v| v.strip_prefix("w=").unwrap_or(v).parse().ok());
                let height = parts
                    .next()
                    .and_then(|v| v.strip_prefix("h=").unwrap_or(v).parse().ok());
                let interlaced = parts.any(|p| p == "interl=1");
                match (width, height) {
                    (Some(width), Some(height)) => FilterStep::Scale {
                        width,
                        height,
                        interlaced,
                    },
                    _ => return Err(parse_error(spec, format!("scale wants W:H, got {args:?}"))),
                }
            }
            other => return Err(parse_error(spec, format!("unknown filter {other:?}"))),
        };
        steps.push(step);
    }
    Ok(steps)
}

fn parse_numbers(args: &str, count: usize) -> Option<Vec<u32>> {
    let values: Vec<u32> = args
        .split(':')
        .map(|v| v.parse::<u32>().ok())
        .collect::<Option<_>>()?;
    (values.len() == count).then_some(values)
}

/// Format assumed by a configured chain; a frame that deviates forces
/// a reconfiguration upstream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AssumedFormat {
    pub width: u32,
    pub height: u32,
    pub interlaced: bool,
    pub pixel_format: PixelFormat,
}

impl AssumedFormat {
    pub fn of(frame: &DecodedFrame) -> Self {
        Self {
            width: frame.image.width(),
            height: frame.image.height(),
            interlaced: frame.interlaced,
            pixel_format: frame.image.format(),
        }
    }
}

/// A configured chain of steps plus its output queue.
pub struct FilterChain {
    steps: Vec<FilterStep>,
    assumed: AssumedFormat,
    queue: VecDeque<DecodedFrame>,
}

impl FilterChain {
    pub fn new(spec: &str, assumed: AssumedFormat) -> Result<Self, MuxError> {
        Ok(Self {
            steps: parse_filter_spec(spec)?,
            assumed,
            queue: VecDeque::new(),
        })
    }

    /// A chain that passes frames through untouched.
    pub fn fast_path(assumed: AssumedFormat) -> Self {
        Self {
            steps: Vec::new(),
            assumed,
            queue: VecDeque::new(),
        }
    }

    /// Whether the filter engine is bypassed entirely.
    pub fn is_fast_path(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether this frame deviates from the format the chain was
    /// configured for.
    pub fn is_frame_format_changed(&self, frame: &DecodedFrame) -> bool {
        AssumedFormat::of(frame) != self.assumed
    }

    pub fn push(&mut self, frame: DecodedFrame) {
        if self.is_fast_path() {
            self.queue.push_back(frame);
            return;
        }
        let mut frames = vec![frame];
        for step in &self.steps {
            frames = frames.into_iter().flat_map(|f| apply_step(*step, f)).collect();
        }
        self.queue.extend(frames);
    }

    pub fn poll(&mut self) -> Option<DecodedFrame> {
        self.queue.pop_front()
    }

    pub fn poll_all(&mut self) -> Vec<DecodedFrame> {
        self.queue.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

fn apply_step(step: FilterStep, frame: DecodedFrame) -> Vec<DecodedFrame> {
    match step {
        FilterStep::Crop {
            width,
            height,
            x,
            y,
        } => vec![crop(frame, width, height, x, y)],
        FilterStep::Deinterlace { double_rate } => deinterlace(frame, double_rate),
        FilterStep::Scale {
            width,
            height,
            interlaced,
        } => vec![scale(frame, width, height, interlaced)],
    }
}

fn crop(frame: DecodedFrame, width: u32, height: u32, x: u32, y: u32) -> DecodedFrame {
    let src = &frame.image;
    let width = width.min(src.width().saturating_sub(x));
    let height = height.min(src.height().saturating_sub(y));
    let bpp = src.format().bytes_per_pixel();
    let mut data = Vec::with_capacity(width as usize * height as usize * bpp);
    for row in y..y + height {
        let line = src.row(row);
        data.extend_from_slice(&line[x as usize * bpp..(x + width) as usize * bpp]);
    }
    DecodedFrame {
        image: ImageBuffer::from_vec(width, height, src.format(), data),
        ..frame
    }
}

/// Line-doubling (bob) deinterlace. Single-rate keeps the first
/// temporal field; double-rate emits one frame per field, first field
/// first.
fn deinterlace(frame: DecodedFrame, double_rate: bool) -> Vec<DecodedFrame> {
    if !frame.interlaced {
        return vec![frame];
    }
    // Field parity of the first temporal field.
    let first = if frame.top_field_first { 0 } else { 1 };
    let second = 1 - first;

    let bob = |parity: u32| DecodedFrame {
        image: line_double_field(&frame.image, parity),
        interlaced: false,
        top_field_first: false,
        ..frame.clone()
    };

    if double_rate {
        vec![bob(first), bob(second)]
    } else {
        vec![bob(first)]
    }
}

fn line_double_field(src: &ImageBuffer, parity: u32) -> ImageBuffer {
    let height = src.height();
    let mut data = Vec::with_capacity(src.data().len());
    for row in 0..height {
        // Nearest line of the wanted field.
        let field_row = if row % 2 == parity {
            row
        } else if row > 0 {
            row - 1
        } else {
            row + 1
        };
        data.extend_from_slice(src.row(field_row.min(height - 1)));
    }
    ImageBuffer::from_vec(src.width(), height, src.format(), data)
}

/// Nearest-neighbour resize; in field-aware mode rows keep their field
/// parity so interlaced content scales without field blending.
fn scale(frame: DecodedFrame, width: u32, height: u32, interlaced: bool) -> DecodedFrame {
    let src = &frame.image;
    if src.width() == width && src.height() == height {
        return frame;
    }
    let bpp = src.format().bytes_per_pixel();
    let mut data = Vec::with_capacity(width as usize * height as usize * bpp);
    for out_y in 0..height {
        let src_y = if interlaced && frame.interlaced {
            // Map within the same field: halve, scale, double.
            let parity = out_y % 2;
            let field_y = (out_y / 2) as u64 * (src.height() as u64 / 2) / (height as u64 / 2).max(1);
            (field_y as u32 * 2 + parity).min(src.height() - 1)
        } else {
            (out_y as u64 * src.height() as u64 / height as u64) as u32
        };
        let line = src.row(src_y.min(src.height() - 1));
        for out_x in 0..width {
            let src_x = (out_x as u64 * src.width() as u64 / width as u64) as usize;
            data.extend_from_slice(&line[src_x * bpp..src_x * bpp + bpp]);
        }
    }
    DecodedFrame {
        image: ImageBuffer::from_vec(width, height, src.format(), data),
        ..frame
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use po_common::Rational;

    fn gradient_frame(width: u32, height: u32, interlaced: bool) -> DecodedFrame {
        // Every row is filled with its own row number.
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for _ in 0..width {
                data.extend_from_slice(&[y as u8, y as u8, y as u8, 255]);
            }
        }
        DecodedFrame {
            image: ImageBuffer::from_vec(width, height, PixelFormat::Bgra, data),
            interlaced,
            top_field_first: true,
            sample_aspect_ratio: Rational::ONE,
            picture_number: 0,
        }
    }

    // ── Parsing ──────────────────────────────────────────────────

    #[test]
    fn parses_composed_spec() {
        let steps = parse_filter_spec("crop=720:576:0:32,yadif=0:-1,scale=1920:1080:interl=1")
            .unwrap();
        assert_eq!(
            steps,
            vec![
                FilterStep::Crop {
                    width: 720,
                    height: 576,
                    x: 0,
                    y: 32
                },
                FilterStep::Deinterlace { double_rate: false },
                FilterStep::Scale {
                    width: 1920,
                    height: 1080,
                    interlaced: true
                },
            ]
        );
    }

    #[test]
    fn parses_yadif_double_rate() {
        assert_eq!(
            parse_filter_spec("yadif=1:-1").unwrap(),
            vec![FilterStep::Deinterlace { double_rate: true }]
        );
    }

    #[test]
    fn parses_scale_keyword_args() {
        assert_eq!(
            parse_filter_spec("scale=w=1280:h=720").unwrap(),
            vec![FilterStep::Scale {
                width: 1280,
                height: 720,
                interlaced: false
            }]
        );
    }

    #[test]
    fn empty_spec_is_no_steps() {
        assert!(parse_filter_spec("").unwrap().is_empty());
        assert!(parse_filter_spec("  ").unwrap().is_empty());
    }

    #[test]
    fn unknown_filter_is_rejected() {
        assert!(parse_filter_spec("sepia=1").is_err());
        assert!(parse_filter_spec("crop=1:2").is_err());
    }

    #[test]
    fn append_filter_joins_with_comma() {
        assert_eq!(append_filter("", "yadif=0:-1"), "yadif=0:-1");
        assert_eq!(
            append_filter("crop=720:576:0:32", "yadif=0:-1"),
            "crop=720:576:0:32,yadif=0:-1"
        );
    }

    // ── Fast path ────────────────────────────────────────────────

    #[test]
    fn fast_path_passes_frames_verbatim() {
        let frame = gradient_frame(8, 8, false);
        let mut chain = FilterChain::fast_path(AssumedFormat::of(&frame));
        assert!(chain.is_fast_path());
        chain.push(frame.clone());
        assert_eq!(chain.poll(), Some(frame));
        assert_eq!(chain.poll(), None);
    }

    #[test]
    fn format_change_detection() {
        let frame = gradient_frame(8, 8, false);
        let chain = FilterChain::fast_path(AssumedFormat::of(&frame));
        assert!(!chain.is_frame_format_changed(&frame));
        assert!(chain.is_frame_format_changed(&gradient_frame(16, 8, false)));
        assert!(chain.is_frame_format_changed(&gradient_frame(8, 8, true)));
    }

    // ── Crop ─────────────────────────────────────────────────────

    #[test]
    fn crop_strips_vbi_lines() {
        let frame = gradient_frame(720, 608, true);
        let mut chain =
            FilterChain::new("crop=720:576:0:32", AssumedFormat::of(&frame)).unwrap();
        chain.push(frame);
        let out = chain.poll().unwrap();
        assert_eq!(out.image.width(), 720);
        assert_eq!(out.image.height(), 576);
        // First surviving row was source row 32.
        assert_eq!(out.image.pixel(0, 0)[0], 32);
    }

    // ── Deinterlace ──────────────────────────────────────────────

    #[test]
    fn single_rate_deinterlace_keeps_one_progressive_frame() {
        let frame = gradient_frame(8, 8, true);
        let mut chain = FilterChain::new("yadif=0:-1", AssumedFormat::of(&frame)).unwrap();
        chain.push(frame);
        let out = chain.poll_all();
        assert_eq!(out.len(), 1);
        assert!(!out[0].interlaced);
        // Top field first: rows come from even source lines.
        assert_eq!(out[0].image.pixel(0, 0)[0], 0);
        assert_eq!(out[0].image.pixel(0, 1)[0], 0);
        assert_eq!(out[0].image.pixel(0, 2)[0], 2);
    }

    #[test]
    fn double_rate_deinterlace_emits_two_frames_first_field_first() {
        let frame = gradient_frame(8, 8, true);
        let mut chain = FilterChain::new("yadif=1:-1", AssumedFormat::of(&frame)).unwrap();
        chain.push(frame);
        let out = chain.poll_all();
        assert_eq!(out.len(), 2);
        // First frame from the top field (even rows), second from the
        // bottom field (odd rows).
        assert_eq!(out[0].image.pixel(0, 0)[0], 0);
        assert_eq!(out[1].image.pixel(0, 1)[0], 1);
        assert!(out.iter().all(|f| !f.interlaced));
    }

    #[test]
    fn progressive_frames_pass_through_deinterlace() {
        let frame = gradient_frame(8, 8, false);
        let mut chain = FilterChain::new("yadif=1:-1", AssumedFormat::of(&frame)).unwrap();
        chain.push(frame.clone());
        assert_eq!(chain.poll_all(), vec![frame]);
    }

    // ── Scale ────────────────────────────────────────────────────

    #[test]
    fn scale_changes_geometry() {
        let frame = gradient_frame(8, 8, false);
        let mut chain = FilterChain::new("scale=4:4", AssumedFormat::of(&frame)).unwrap();
        chain.push(frame);
        let out = chain.poll().unwrap();
        assert_eq!(out.image.width(), 4);
        assert_eq!(out.image.height(), 4);
    }

    #[test]
    fn field_aware_scale_preserves_row_parity() {
        let frame = gradient_frame(8, 16, true);
        let mut chain =
            FilterChain::new("scale=8:8:interl=1", AssumedFormat::of(&frame)).unwrap();
        chain.push(frame);
        let out = chain.poll().unwrap();
        // Even output rows sample even source rows, odd rows odd.
        for y in 0..8u32 {
            assert_eq!(out.image.pixel(0, y)[0] % 2, (y % 2) as u8, "row {y}");
        }
    }

    #[test]
    fn identity_scale_is_a_no_op() {
        let frame = gradient_frame(8, 8, false);
        let mut chain = FilterChain::new("scale=8:8", AssumedFormat::of(&frame)).unwrap();
        chain.push(frame.clone());
        assert_eq!(chain.poll(), Some(frame));
    }

    // ── Clear ────────────────────────────────────────────────────

    #[test]
    fn clear_empties_queue() {
        let frame = gradient_frame(8, 8, false);
        let mut chain = FilterChain::fast_path(AssumedFormat::of(&frame));
        chain.push(frame);
        chain.clear();
        assert_eq!(chain.poll(), None);
    }
}
