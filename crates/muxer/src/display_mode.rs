//! Display-mode selection.
//!
//! The display mode is the adaptation rule the muxer applies between
//! source and target cadence. Selection is a pure function of the
//! source field mode and frame rate against the target's, so the same
//! clip always adapts the same way.

use std::fmt;

use po_common::FieldMode;

/// Frame rates within this distance count as equal (PAL/NTSC-family
/// rates like 25 vs 23.98 must not collapse together, 29.97 vs 30 must).
const FPS_EPSILON: f64 = 2.0;

/// How source frames map onto target frames.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DisplayMode {
    /// One source frame per target frame, no adaptation.
    Simple,
    /// Each source frame is emitted twice, with the audio split
    /// between the two copies.
    Duplicate,
    /// Every second source frame is dropped.
    Half,
    /// Two consecutive progressive source frames are woven into one
    /// interlaced target frame.
    Interlace,
    /// Interlaced source to progressive target at the same rate
    /// (single-rate deinterlace).
    Deinterlace,
    /// Interlaced source to progressive target at double rate (each
    /// field becomes a frame).
    DeinterlaceBob,
    /// Interlaced source scaled to a different interlaced geometry
    /// with a field-aware scaler.
    ScaleInterlaced,
    /// Detection has not run or failed; nothing can be emitted.
    Invalid,
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisplayMode::Simple => "simple",
            DisplayMode::Duplicate => "duplicate",
            DisplayMode::Half => "half",
            DisplayMode::Interlace => "interlace",
            DisplayMode::Deinterlace => "deinterlace",
            DisplayMode::DeinterlaceBob => "deinterlace-bob",
            DisplayMode::ScaleInterlaced => "scale-interlaced",
            DisplayMode::Invalid => "invalid",
        };
        write!(f, "{s}")
    }
}

/// Select the adaptation rule for a source cadence against the target.
///
/// Pure in its inputs; geometry-driven adjustments (scaling promotion,
/// SD mis-tag workaround) happen in the muxer before and after this
/// call.
pub fn detect_display_mode(
    source_mode: FieldMode,
    source_fps: f64,
    target_mode: FieldMode,
    target_fps: f64,
) -> DisplayMode {
    if (source_fps - target_fps).abs() < FPS_EPSILON {
        // Same rate: only interlaced -> progressive needs work.
        if source_mode.is_interlaced() && !target_mode.is_interlaced() {
            DisplayMode::Deinterlace
        } else {
            DisplayMode::Simple
        }
    } else if (source_fps / 2.0 - target_fps).abs() < FPS_EPSILON {
        // Source runs twice as fast as the target.
        if source_mode.is_interlaced() {
            DisplayMode::Invalid
        } else if target_mode.is_interlaced() {
            DisplayMode::Interlace
        } else {
            DisplayMode::Half
        }
    } else if (source_fps - target_fps / 2.0).abs() < FPS_EPSILON {
        // Target runs twice as fast as the source.
        if target_mode.is_interlaced() {
            DisplayMode::Invalid
        } else if source_mode.is_interlaced() {
            DisplayMode::DeinterlaceBob
        } else {
            DisplayMode::Duplicate
        }
    } else {
        DisplayMode::Invalid
    }
}

/// SD material is routinely mis-tagged as progressive; anything below
/// 720 lines at under 50 fps is treated as upper-field-first.
pub fn effective_source_mode(tagged: FieldMode, height: u32, source_fps: f64) -> FieldMode {
    if tagged == FieldMode::Progressive && height < 720 && source_fps < 50.0 {
        FieldMode::Upper
    } else {
        tagged
    }
}

// ── Tests ────────────────────────────────────────────────────────────
