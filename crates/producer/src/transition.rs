//! Transition producer — blends a source producer into a destination
//! producer over a fixed number of frames.
//!
//! The transition owns the destination outright and acquires the
//! source via `set_leading_producer` when the layer hands over. Each
//! tick both constituents are fetched in parallel and composed
//! according to the transition style; audio volumes cross-fade for
//! every style, including cuts. When the duration is reached the
//! transition reports `Eof` and nominates the destination as its
//! following producer, so the layer continues with plain playback.

use std::sync::Arc;

use tracing::info;

use po_common::{EngineResult, FrameFactory, FrameTransform, ProducerFrame};

use crate::producer::{advance_slot, Producer};

/// Visual style of a transition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    /// Hard picture cut at expiry; audio still cross-fades.
    Cut,
    /// Cross-dissolve.
    Mix,
    /// Incoming pushes the outgoing picture off screen.
    Push,
    /// Incoming slides in over the outgoing picture.
    Slide,
    /// Incoming is revealed by a moving wipe edge.
    Wipe,
}

/// Horizontal direction of push/slide/wipe movement.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TransitionDirection {
    #[default]
    FromLeft,
    FromRight,
}

impl TransitionDirection {
    fn sign(self) -> f64 {
        match self {
            TransitionDirection::FromLeft => 1.0,
            TransitionDirection::FromRight => -1.0,
        }
    }
}

/// Parameters of one transition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransitionInfo {
    pub kind: TransitionKind,
    /// Number of composite frames before hand-off.
    pub duration: u32,
    pub direction: TransitionDirection,
}

impl TransitionInfo {
    pub fn new(kind: TransitionKind, duration: u32) -> Self {
        Self {
            kind,
            duration,
            direction: TransitionDirection::default(),
        }
    }
}

/// Composite producer blending `source` into `dest`.
pub struct TransitionProducer {
    info: TransitionInfo,
    current_frame: u32,
    source: Option<Box<dyn Producer>>,
    dest: Option<Box<dyn Producer>>,
    dest_name: String,
    source_name: Option<String>,
    factory: Option<Arc<dyn FrameFactory>>,
}

impl TransitionProducer {
    pub fn new(dest: Box<dyn Producer>, info: TransitionInfo) -> Self {
        Self {
            info,
            current_frame: 0,
            source: None,
            dest_name: dest.name(),
            dest: Some(dest),
            source_name: None,
            factory: None,
        }
    }

    /// Compose the two constituent frames for the current position.
    fn compose(&self, dest_frame: ProducerFrame, source_frame: ProducerFrame) -> ProducerFrame {
        // An exhausted constituent contributes the compositing identity.
        let dest_frame = if dest_frame.is_eof() {
            ProducerFrame::Empty
        } else {
            dest_frame
        };
        let source_frame = if source_frame.is_eof() {
            ProducerFrame::Empty
        } else {
            source_frame
        };

        let alpha = self.current_frame as f64 / self.info.duration as f64;
        let volume = (alpha * 255.0).round() as u8;
        let dir = self.info.direction.sign();

        let mut source_transform = FrameTransform {
            volume: 255 - volume,
            ..Default::default()
        };
        let mut dest_transform = FrameTransform {
            volume,
            ..Default::default()
        };

        match self.info.kind {
            TransitionKind::Cut => {
                // Picture stays on the source until expiry.
                dest_transform.alpha = 0.0;
            }
            TransitionKind::Mix => {
                dest_transform.alpha = alpha;
            }
            TransitionKind::Slide => {
                dest_transform.translate = ((-1.0 + alpha) * dir, 0.0);
            }
            TransitionKind::Push => {
                dest_transform.translate = ((-1.0 + alpha) * dir, 0.0);
                source_transform.translate = (alpha * dir, 0.0);
            }
            TransitionKind::Wipe => {
                dest_transform.translate = ((-1.0 + alpha) * dir, 0.0);
                dest_transform.texcoord =
                    ((-1.0 + alpha) * dir, 1.0, 1.0 - (1.0 - alpha) * dir, 0.0);
            }
        }

        ProducerFrame::Group(vec![
            source_frame.with_transform(source_transform),
            dest_frame.with_transform(dest_transform),
        ])
    }
}

impl Producer for TransitionProducer {
    fn receive(&mut self) -> EngineResult<ProducerFrame> {
        if self.current_frame == 0 {
            info!(transition = %self.name(), "transition started");
        }
        if self.current_frame >= self.info.duration {
            return Ok(ProducerFrame::Eof);
        }

        let factory = self
            .factory
            .clone()
            .ok_or(po_common::ProducerError::NotInitialized)?;

        let (dest_frame, source_frame) = rayon::join(
            {
                let dest = &mut self.dest;
                let factory = &factory;
                move || advance_slot(dest, factory)
            },
            {
                let source = &mut self.source;
                let factory = &factory;
                move || advance_slot(source, factory)
            },
        );

        let composed = self.compose(dest_frame, source_frame);
        self.current_frame += 1;
        if self.current_frame >= self.info.duration {
            info!(transition = %self.name(), "transition ended");
        }
        Ok(composed)
    }

    fn following_producer(&mut self) -> Option<Box<dyn Producer>> {
        self.dest.take()
    }

    fn set_leading_producer(&mut self, leading: Box<dyn Producer>) {
        self.source_name = Some(leading.name());
        self.source = Some(leading);
    }

    fn initialize(&mut self, factory: &Arc<dyn FrameFactory>) -> EngineResult<()> {
        if let Some(dest) = self.dest.as_mut() {
            dest.initialize(factory)?;
        }
        self.factory = Some(Arc::clone(factory));
        Ok(())
    }

    fn name(&self) -> String {
        format!(
            "transition[{:?} {} -> {}]",
            self.info.kind,
            self.source_name.as_deref().unwrap_or("empty"),
            self.dest_name
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────────
