//! Producer device — the output clock.
//!
//! A serial executor owns the layer map and runs a self-re-arming
//! tick: request a frame from every layer in parallel, submit the
//! composite downstream, re-arm. Layer operations are queued onto the
//! same executor, so they apply atomically between ticks.
//!
//! The tick never stops on errors: a failed submit wipes the layer
//! map, logs, and the loop continues so the sinks keep receiving
//! frames (black, if need be).
//!
//! ```text
//! control surface ──ops──► [executor queue] ──► layers ──► FrameSink
//!                               ▲    tick ──────┘ (parallel receive)
//!                               └──── re-arm
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, error};

use po_common::{
    EngineResult, Executor, ExecutorHandle, FrameFactory, FrameSink, ProducerFrame, TaskFuture,
};

use crate::layer::{Layer, LoadMode};
use crate::producer::Producer;

struct DeviceState {
    layers: BTreeMap<i32, Layer>,
    sink: Box<dyn FrameSink>,
    factory: Arc<dyn FrameFactory>,
}

impl DeviceState {
    /// One production cycle: receive-compose-submit.
    fn tick(&mut self) -> EngineResult<()> {
        // Ascending layer id = back to front.
        let mut layers: Vec<&mut Layer> = self.layers.values_mut().collect();
        let composite: Vec<ProducerFrame> =
            layers.par_iter_mut().map(|layer| layer.receive()).collect();
        self.sink.send(composite)
    }
}

fn tick_loop(state: &mut DeviceState, handle: &ExecutorHandle<DeviceState>) {
    if let Err(err) = state.tick() {
        error!(error = %err, "tick failed; cleared layers in producer device");
        state.layers.clear();
    }
    if handle.is_running() {
        handle.spawn(tick_loop);
    }
}

/// The clocked dispatcher driving all layers.
///
/// Pacing comes from downstream: `FrameSink::send` blocks on the
/// synchronizing consumer (or a frame-period timer), and the next tick
/// does not start until the previous submit returns.
pub struct ProducerDevice {
    executor: Executor<DeviceState>,
    factory: Arc<dyn FrameFactory>,
}

impl ProducerDevice {
    pub fn new(factory: Arc<dyn FrameFactory>, sink: Box<dyn FrameSink>) -> Self {
        let state = DeviceState {
            layers: BTreeMap::new(),
            sink,
            factory: Arc::clone(&factory),
        };
        let executor = Executor::new("producer-device", state);
        executor.spawn(tick_loop);
        Self { executor, factory }
    }

    /// Stage a producer on a layer (creating the layer if needed).
    ///
    /// The producer is initialized against the frame factory on the
    /// calling thread, then handed to the device executor.
    pub fn load(
        &self,
        layer: i32,
        mut producer: Box<dyn Producer>,
        mode: LoadMode,
    ) -> EngineResult<()> {
        producer.initialize(&self.factory)?;
        debug!(layer, producer = %producer.name(), ?mode, "load");
        self.executor.spawn(move |state, _| {
            let factory = Arc::clone(&state.factory);
            state
                .layers
                .entry(layer)
                .or_insert_with(|| Layer::new(factory))
                .load(producer, mode);
        });
        Ok(())
    }

    pub fn play(&self, layer: i32) {
        self.executor.spawn(move |state, _| {
            if let Some(l) = state.layers.get_mut(&layer) {
                l.play();
            }
        });
    }

    pub fn pause(&self, layer: i32) {
        self.executor.spawn(move |state, _| {
            if let Some(l) = state.layers.get_mut(&layer) {
                l.pause();
            }
        });
    }

    /// Stop a layer; the layer is removed entirely when no background
    /// remains staged on it.
    pub fn stop(&self, layer: i32) {
        self.executor.spawn(move |state, _| {
            if let Some(l) = state.layers.get_mut(&layer) {
                l.stop();
                if !l.has_background() {
                    state.layers.remove(&layer);
                }
            }
        });
    }

    pub fn clear(&self, layer: i32) {
        self.executor.spawn(move |state, _| {
            if let Some(mut l) = state.layers.remove(&layer) {
                l.clear();
            }
        });
    }

    pub fn clear_all(&self) {
        self.executor.spawn(|state, _| {
            state.layers.clear();
        });
    }

    /// Name of the producer currently on air on `layer`.
    pub fn foreground(&self, layer: i32) -> TaskFuture<Option<String>> {
        self.executor
            .begin_invoke(move |state, _| state.layers.get(&layer).and_then(|l| l.foreground_name()))
    }

    /// Name of the producer staged behind `layer`.
    pub fn background(&self, layer: i32) -> TaskFuture<Option<String>> {
        self.executor
            .begin_invoke(move |state, _| state.layers.get(&layer).and_then(|l| l.background_name()))
    }

    /// Number of live layers (queries the device executor).
    pub fn layer_count(&self) -> EngineResult<usize> {
        self.executor.invoke(|state, _| state.layers.len())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
