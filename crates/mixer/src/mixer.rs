//! CPU compositing of one tick's layer frames into a final frame.
//!
//! The producer device hands the mixer a back-to-front vector of
//! `ProducerFrame` trees. The mixer flattens each tree, accumulating
//! transforms, then blits payloads in order onto a target-geometry
//! BGRA canvas and mixes their audio with per-frame volume scaling.

use std::sync::Arc;

use tracing::trace;

use po_common::{
    AudioBuffer, DataFrame, FrameTransform, ImageBuffer, OutputFrame, PixelFormat, ProducerFrame,
    VideoFormatDesc,
};

/// Software reference mixer.
pub struct Mixer {
    desc: VideoFormatDesc,
    frame_number: u64,
}

impl Mixer {
    pub fn new(desc: VideoFormatDesc) -> Self {
        Self {
            desc,
            frame_number: 0,
        }
    }

    pub fn format_desc(&self) -> &VideoFormatDesc {
        &self.desc
    }

    /// Composite one tick's frames (back to front) into a final frame.
    pub fn mix(&mut self, composite: Vec<ProducerFrame>) -> OutputFrame {
        let mut flat = Vec::new();
        for frame in composite {
            flatten(frame, FrameTransform::default(), &mut flat);
        }
        trace!(layers = flat.len(), frame = self.frame_number, "mixing");

        let width = self.desc.width as usize;
        let height = self.desc.height as usize;
        let mut canvas = vec![0u8; width * height * 4];
        let mut audio_acc: Vec<i64> = Vec::new();

        for (transform, data) in &flat {
            blit(&mut canvas, width, height, &data.image, transform);
            mix_audio(&mut audio_acc, &data.audio, transform.volume);
        }

        let audio: AudioBuffer = audio_acc
            .into_iter()
            .map(|s| s.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .collect();

        let image = ImageBuffer::from_vec(
            self.desc.width,
            self.desc.height,
            PixelFormat::Bgra,
            canvas,
        );
        let number = self.frame_number;
        self.frame_number += 1;
        OutputFrame::new(image, Arc::new(audio), number)
    }
}

/// Depth-first flatten with accumulated transforms; `Empty` and `Eof`
/// contribute nothing.
fn flatten(
    frame: ProducerFrame,
    accumulated: FrameTransform,
    out: &mut Vec<(FrameTransform, Arc<DataFrame>)>,
) {
    match frame {
        ProducerFrame::Data(data) => out.push((accumulated, data)),
        ProducerFrame::Transformed(transform, inner) => {
            flatten(*inner, accumulated.combine(&transform), out)
        }
        ProducerFrame::Group(frames) => {
            for inner in frames {
                flatten(inner, accumulated, out);
            }
        }
        ProducerFrame::Empty | ProducerFrame::Eof => {}
    }
}

/// Source-over blit with translation, texture window, and alpha.
fn blit(
    canvas: &mut [u8],
    canvas_w: usize,
    canvas_h: usize,
    image: &ImageBuffer,
    transform: &FrameTransform,
) {
    if transform.alpha <= 0.0 {
        return;
    }
    let src_w = image.width() as usize;
    let src_h = image.height() as usize;
    if src_w == 0 || src_h == 0 {
        return;
    }

    let offset_x = (transform.translate.0 * canvas_w as f64).round() as i64;
    let offset_y = (transform.translate.1 * canvas_h as f64).round() as i64;
    let (left, bottom, right, top) = transform.texcoord;

    for py in 0..canvas_h as i64 {
        let fy = py - offset_y;
        if fy < 0 || fy >= src_h as i64 {
            continue;
        }
        let v = top + (fy as f64 + 0.5) / src_h as f64 * (bottom - top);
        if !(0.0..1.0).contains(&v) {
            continue;
        }
        let src_y = ((v * src_h as f64) as usize).min(src_h - 1);

        for px in 0..canvas_w as i64 {
            let fx = px - offset_x;
            if fx < 0 || fx >= src_w as i64 {
                continue;
            }
            let u = left + (fx as f64 + 0.5) / src_w as f64 * (right - left);
            if !(0.0..1.0).contains(&u) {
                continue;
            }
            let src_x = ((u * src_w as f64) as usize).min(src_w - 1);

            let src = sample_bgra(image, src_x as u32, src_y as u32);
            let alpha = src[3] as f64 / 255.0 * transform.alpha;
            if alpha <= 0.0 {
                continue;
            }
            let offset = (py as usize * canvas_w + px as usize) * 4;
            for channel in 0..3 {
                let dst = canvas[offset + channel] as f64;
                canvas[offset + channel] =
                    (src[channel] as f64 * alpha + dst * (1.0 - alpha)).round() as u8;
            }
            let dst_a = canvas[offset + 3] as f64;
            canvas[offset + 3] = (alpha * 255.0 + dst_a * (1.0 - alpha)).round() as u8;
        }
    }
}

fn sample_bgra(image: &ImageBuffer, x: u32, y: u32) -> [u8; 4] {
    match image.format() {
        PixelFormat::Bgra => {
            let p = image.pixel(x, y);
            [p[0], p[1], p[2], p[3]]
        }
        PixelFormat::Gray8 => {
            let v = image.pixel(x, y)[0];
            [v, v, v, 255]
        }
    }
}

fn mix_audio(acc: &mut Vec<i64>, samples: &[i32], volume: u8) {
    if samples.len() > acc.len() {
        acc.resize(samples.len(), 0);
    }
    for (slot, &sample) in acc.iter_mut().zip(samples) {
        *slot += sample as i64 * volume as i64 / 255;
    }
}

// ── Tests ────────────────────────────────────────────────────────────
