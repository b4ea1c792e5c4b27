//! Channel wiring.

use std::sync::Arc;

use tracing::info;

use po_common::{
    ChannelConfig, EngineResult, FrameFactory, FrameSink, ProducerFrame, TaskFuture,
};
use po_consumer::{Consumer, ConsumerDevice, ConsumerDeviceHandle};
use po_mixer::{Mixer, MixerFrameFactory};
use po_producer::{LoadMode, Producer, ProducerDevice};

/// Mixes each tick's composite and hands the result to the consumer
/// dispatch. Lives inside the producer device's executor, so the tick
/// blocks right here while the synchronizing consumer catches up.
struct MixDispatchSink {
    mixer: Mixer,
    consumers: ConsumerDeviceHandle,
}

impl FrameSink for MixDispatchSink {
    fn send(&mut self, composite: Vec<ProducerFrame>) -> EngineResult<()> {
        let frame = self.mixer.mix(composite);
        self.consumers.send(frame)
    }
}

/// One playout channel: layers in, synchronized frames out.
pub struct Channel {
    // Field order is teardown order: clock first, then the fan-out.
    producers: ProducerDevice,
    consumers: ConsumerDevice,
    factory: Arc<dyn FrameFactory>,
    config: ChannelConfig,
}

impl Channel {
    pub fn new(config: ChannelConfig) -> Self {
        let desc = config.format.desc();
        info!(format = %desc, channel = config.channel_index, "starting channel");

        let factory: Arc<dyn FrameFactory> = Arc::new(MixerFrameFactory::new(desc.clone()));
        let consumers = ConsumerDevice::new(desc.clone(), config.channel_index);
        let sink = MixDispatchSink {
            mixer: Mixer::new(desc),
            consumers: consumers.handle(),
        };
        let producers = ProducerDevice::new(Arc::clone(&factory), Box::new(sink));
        Self {
            producers,
            consumers,
            factory,
            config,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The frame factory producers are initialized against.
    pub fn frame_factory(&self) -> Arc<dyn FrameFactory> {
        Arc::clone(&self.factory)
    }

    // ── Control surface: layers ──────────────────────────────────

    pub fn load(
        &self,
        layer: i32,
        producer: Box<dyn Producer>,
        mode: LoadMode,
    ) -> EngineResult<()> {
        self.producers.load(layer, producer, mode)
    }

    pub fn play(&self, layer: i32) {
        self.producers.play(layer);
    }

    pub fn pause(&self, layer: i32) {
        self.producers.pause(layer);
    }

    pub fn stop(&self, layer: i32) {
        self.producers.stop(layer);
    }

    pub fn clear(&self, layer: i32) {
        self.producers.clear(layer);
    }

    pub fn clear_all(&self) {
        self.producers.clear_all();
    }

    pub fn foreground(&self, layer: i32) -> TaskFuture<Option<String>> {
        self.producers.foreground(layer)
    }

    pub fn background(&self, layer: i32) -> TaskFuture<Option<String>> {
        self.producers.background(layer)
    }

    // ── Control surface: consumers ───────────────────────────────

    pub fn add_consumer(&self, consumer: Box<dyn Consumer>) -> EngineResult<()> {
        self.consumers.add_consumer(consumer)
    }

    pub fn remove_consumer(&self, index: i32) -> EngineResult<bool> {
        self.consumers.remove_consumer(index)
    }

    pub fn consumer_drop_counts(&self) -> EngineResult<Vec<(i32, u64)>> {
        self.consumers.drop_counts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use po_common::VideoFormat;

    #[test]
    fn channel_starts_and_stops_cleanly() {
        let channel = Channel::new(ChannelConfig {
            format: VideoFormat::Pal,
            ..Default::default()
        });
        assert_eq!(channel.config().audio_channels, 2);
        // No consumers: the pacing timer keeps the clock alive until drop.
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
}
