//! Layer — one Z-ordered rendering slot.
//!
//! Wraps a foreground producer (and an optional queued background)
//! behind a play/pause/stop state machine:
//!
//! - a paused layer repeats its last emitted frame (identity until one
//!   exists),
//! - a stopped layer emits the identity frame,
//! - a playing layer advances its foreground, following the
//!   end-of-stream hand-off chain.
//!
//! Every producer call is fault-isolated: a producer that fails is
//! dropped and the layer plays empty until something new is loaded.

use std::sync::Arc;

use tracing::{debug, warn};

use po_common::{FrameFactory, ProducerFrame};

use crate::producer::{advance_slot, Producer};

/// How `load` stages the new producer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LoadMode {
    /// Stage in the background; an explicit `play` brings it on air.
    #[default]
    Background,
    /// Show the first frame paused.
    Preview,
    /// Go on air as soon as possible (immediately on an idle layer,
    /// at foreground end-of-stream otherwise).
    AutoPlay,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LayerState {
    Playing,
    Paused,
    Stopped,
}

/// One rendering slot owned by the producer device.
pub struct Layer {
    foreground: Option<Box<dyn Producer>>,
    background: Option<Box<dyn Producer>>,
    state: LayerState,
    auto_play: bool,
    last_frame: ProducerFrame,
    factory: Arc<dyn FrameFactory>,
}

impl Layer {
    pub fn new(factory: Arc<dyn FrameFactory>) -> Self {
        Self {
            foreground: None,
            background: None,
            state: LayerState::Stopped,
            auto_play: false,
            last_frame: ProducerFrame::Empty,
            factory,
        }
    }

    fn is_idle(&self) -> bool {
        self.foreground.is_none() && self.background.is_none()
    }

    /// Stage a producer on this layer.
    pub fn load(&mut self, producer: Box<dyn Producer>, mode: LoadMode) {
        debug!(producer = %producer.name(), ?mode, "layer load");
        if self.is_idle() {
            match mode {
                LoadMode::Preview => {
                    self.foreground = Some(producer);
                    self.state = LayerState::Paused;
                    self.last_frame = ProducerFrame::Empty;
                }
                LoadMode::AutoPlay => {
                    self.background = Some(producer);
                    self.play();
                }
                LoadMode::Background => {
                    self.background = Some(producer);
                    self.state = LayerState::Stopped;
                }
            }
            return;
        }
        match self.state {
            LayerState::Playing | LayerState::Paused => {
                self.background = Some(producer);
                self.auto_play = mode == LoadMode::AutoPlay;
            }
            LayerState::Stopped => {
                self.foreground = Some(producer);
                match mode {
                    LoadMode::Preview => self.state = LayerState::Paused,
                    LoadMode::AutoPlay => self.play(),
                    LoadMode::Background => {}
                }
            }
        }
    }

    /// Bring the layer on air.
    ///
    /// A staged background takes over the foreground; during live
    /// playback the expiring foreground is registered as the incoming
    /// producer's leading producer, which is how transitions acquire
    /// their blend source.
    pub fn play(&mut self) {
        if let Some(mut background) = self.background.take() {
            if let Some(foreground) = self.foreground.take() {
                background.set_leading_producer(foreground);
            }
            self.foreground = Some(background);
            self.auto_play = false;
            self.last_frame = ProducerFrame::Empty;
        }
        self.state = LayerState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state == LayerState::Playing {
            self.state = LayerState::Paused;
        }
    }

    /// Take the layer off air, dropping the foreground. A staged
    /// background survives; the owning device removes the layer
    /// entirely when none remains.
    pub fn stop(&mut self) {
        self.foreground = None;
        self.last_frame = ProducerFrame::Empty;
        self.state = LayerState::Stopped;
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.foreground = None;
        self.background = None;
        self.auto_play = false;
        self.last_frame = ProducerFrame::Empty;
        self.state = LayerState::Stopped;
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    pub fn foreground_name(&self) -> Option<String> {
        self.foreground.as_ref().map(|p| p.name())
    }

    pub fn background_name(&self) -> Option<String> {
        self.background.as_ref().map(|p| p.name())
    }

    /// Produce this layer's contribution for one tick. Never fails;
    /// producer faults degrade to the identity frame.
    pub fn receive(&mut self) -> ProducerFrame {
        match self.state {
            LayerState::Stopped => ProducerFrame::Empty,
            LayerState::Paused => self.last_frame.clone(),
            LayerState::Playing => {
                let frame = self.advance();
                self.last_frame = frame.clone();
                frame
            }
        }
    }

    fn advance(&mut self) -> ProducerFrame {
        let frame = advance_slot(&mut self.foreground, &self.factory);
        if !frame.is_eof() {
            return frame;
        }
        // Foreground exhausted (or gone). Promote an auto-play
        // background, handing it the expiring foreground.
        if self.auto_play && self.background.is_some() {
            let name = self.background_name().unwrap_or_default();
            debug!(producer = %name, "auto-playing background at end of stream");
            self.play();
            let frame = advance_slot(&mut self.foreground, &self.factory);
            if frame.is_eof() {
                return ProducerFrame::Empty;
            }
            return frame;
        }
        ProducerFrame::Empty
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("state", &self.state)
            .field("foreground", &self.foreground_name())
            .field("background", &self.background_name())
            .field("auto_play", &self.auto_play)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
