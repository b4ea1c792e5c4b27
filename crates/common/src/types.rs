//! Core types with newtype pattern for type safety.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rational number for frame rates and aspect ratios
/// (e.g., 30000/1001 for 29.97fps, 64/45 for PAL widescreen pixels).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const ONE: Self = Self { num: 1, den: 1 };
    pub const FPS_24: Self = Self { num: 24, den: 1 };
    pub const FPS_25: Self = Self { num: 25, den: 1 };
    pub const FPS_30: Self = Self { num: 30, den: 1 };
    pub const FPS_29_97: Self = Self {
        num: 30000,
        den: 1001,
    };
    pub const FPS_50: Self = Self { num: 50, den: 1 };
    pub const FPS_60: Self = Self { num: 60, den: 1 };
    pub const FPS_59_94: Self = Self {
        num: 60000,
        den: 1001,
    };

    pub fn new(num: u32, den: u32) -> Self {
        assert!(den > 0, "Rational denominator must be > 0");
        Self { num, den }
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Field mode of a video signal.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldMode {
    /// Whole frames, no fields.
    #[default]
    Progressive,
    /// Interlaced, upper (top) field first.
    Upper,
    /// Interlaced, lower (bottom) field first.
    Lower,
}

impl FieldMode {
    pub fn is_interlaced(self) -> bool {
        !matches!(self, FieldMode::Progressive)
    }

    /// Number of temporal fields carried per frame (1 or 2).
    pub fn field_count(self) -> u32 {
        if self.is_interlaced() {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for FieldMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldMode::Progressive => "progressive",
            FieldMode::Upper => "upper",
            FieldMode::Lower => "lower",
        };
        write!(f, "{s}")
    }
}

/// Pixel format of a CPU-side image buffer.
///
/// The engine composites and dispatches in BGRA; `Gray8` covers
/// single-plane key (alpha) material travelling through the muxer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    Bgra,
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}
