//! Target video format table.
//!
//! A `VideoFormatDesc` is the immutable contract every stage of the
//! pipeline is paced against: geometry, field mode, rational frame
//! rate, and the audio cadence — the rotating sequence of per-channel
//! sample counts per frame whose cycle sums exactly to
//! `sample_rate × cycle_frames / fps`. Integer rates have a flat
//! cadence; the 1001-family carries the classic 5-entry pattern
//! (29.97 → 1602,1601,1602,1601,1602).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::types::FieldMode;

/// Standard broadcast formats.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoFormat {
    Pal,
    Ntsc,
    Hd720p50,
    Hd720p5994,
    Hd720p60,
    Hd1080i50,
    Hd1080i5994,
    Hd1080i60,
    Hd1080p2398,
    Hd1080p24,
    Hd1080p25,
    Hd1080p2997,
    Hd1080p30,
    Hd1080p50,
    Hd1080p5994,
    Hd1080p60,
}

/// Audio sample rate shared by all standard formats.
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

const NTSC_CADENCE: &[usize] = &[1602, 1601, 1602, 1601, 1602];
const CADENCE_5994: &[usize] = &[801, 800, 801, 801, 801];

impl VideoFormat {
    /// Build the descriptor for this format.
    pub fn desc(self) -> VideoFormatDesc {
        use FieldMode::*;
        use VideoFormat::*;
        let (w, h, field, duration, time_scale, cadence): (u32, u32, _, u32, u32, &[usize]) =
            match self {
                Pal => (720, 576, Upper, 1000, 25_000, &[1920]),
                Ntsc => (720, 486, Lower, 1001, 30_000, NTSC_CADENCE),
                Hd720p50 => (1280, 720, Progressive, 1000, 50_000, &[960]),
                Hd720p5994 => (1280, 720, Progressive, 1001, 60_000, CADENCE_5994),
                Hd720p60 => (1280, 720, Progressive, 1000, 60_000, &[800]),
                Hd1080i50 => (1920, 1080, Upper, 1000, 25_000, &[1920]),
                Hd1080i5994 => (1920, 1080, Upper, 1001, 30_000, NTSC_CADENCE),
                Hd1080i60 => (1920, 1080, Upper, 1000, 30_000, &[1600]),
                Hd1080p2398 => (1920, 1080, Progressive, 1001, 24_000, &[2002]),
                Hd1080p24 => (1920, 1080, Progressive, 1000, 24_000, &[2000]),
                Hd1080p25 => (1920, 1080, Progressive, 1000, 25_000, &[1920]),
                Hd1080p2997 => (1920, 1080, Progressive, 1001, 30_000, NTSC_CADENCE),
                Hd1080p30 => (1920, 1080, Progressive, 1000, 30_000, &[1600]),
                Hd1080p50 => (1920, 1080, Progressive, 1000, 50_000, &[960]),
                Hd1080p5994 => (1920, 1080, Progressive, 1001, 60_000, CADENCE_5994),
                Hd1080p60 => (1920, 1080, Progressive, 1000, 60_000, &[800]),
            };
        VideoFormatDesc {
            width: w,
            height: h,
            field_mode: field,
            duration,
            time_scale,
            audio_sample_rate: AUDIO_SAMPLE_RATE,
            audio_cadence: cadence.to_vec(),
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VideoFormat::Pal => "PAL",
            VideoFormat::Ntsc => "NTSC",
            VideoFormat::Hd720p50 => "720p5000",
            VideoFormat::Hd720p5994 => "720p5994",
            VideoFormat::Hd720p60 => "720p6000",
            VideoFormat::Hd1080i50 => "1080i5000",
            VideoFormat::Hd1080i5994 => "1080i5994",
            VideoFormat::Hd1080i60 => "1080i6000",
            VideoFormat::Hd1080p2398 => "1080p2398",
            VideoFormat::Hd1080p24 => "1080p2400",
            VideoFormat::Hd1080p25 => "1080p2500",
            VideoFormat::Hd1080p2997 => "1080p2997",
            VideoFormat::Hd1080p30 => "1080p3000",
            VideoFormat::Hd1080p50 => "1080p5000",
            VideoFormat::Hd1080p5994 => "1080p5994",
            VideoFormat::Hd1080p60 => "1080p6000",
        };
        write!(f, "{s}")
    }
}

/// Immutable target format descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormatDesc {
    pub width: u32,
    pub height: u32,
    pub field_mode: FieldMode,
    /// Frame duration in `time_scale` units (fps = time_scale / duration).
    pub duration: u32,
    pub time_scale: u32,
    pub audio_sample_rate: u32,
    /// Per-channel sample counts per frame, cycled round-robin.
    pub audio_cadence: Vec<usize>,
}

impl VideoFormatDesc {
    /// Descriptor for a non-standard format. The cadence is derived
    /// from the rational frame rate so that each cycle sums exactly
    /// to `sample_rate × cycle × duration / time_scale`.
    pub fn custom(
        width: u32,
        height: u32,
        field_mode: FieldMode,
        time_scale: u32,
        duration: u32,
        audio_sample_rate: u32,
    ) -> Self {
        assert!(duration > 0 && time_scale > 0, "fps terms must be > 0");
        Self {
            width,
            height,
            field_mode,
            duration,
            time_scale,
            audio_sample_rate,
            audio_cadence: compute_cadence(time_scale, duration, audio_sample_rate),
        }
    }

    pub fn fps(&self) -> f64 {
        self.time_scale as f64 / self.duration as f64
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(self.duration as f64 / self.time_scale as f64)
    }
}

impl fmt::Display for VideoFormatDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}{}{:.5}",
            self.width,
            self.height,
            if self.field_mode.is_interlaced() {
                "i"
            } else {
                "p"
            },
            self.fps()
        )
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Per-frame sample counts whose cycle sums to an exact number of
/// samples: cadence[i] is the difference of consecutive floors of
/// the ideal running sample position.
fn compute_cadence(time_scale: u32, duration: u32, sample_rate: u32) -> Vec<usize> {
    let step = sample_rate as u64 * duration as u64;
    let cycle = time_scale as u64 / gcd(time_scale as u64, step);
    (0..cycle)
        .map(|i| (((i + 1) * step / time_scale as u64) - (i * step / time_scale as u64)) as usize)
        .collect()
}
