//! Consumer device — fan-out of final frames.
//!
//! A serial executor owns the consumer set. Each dispatched frame goes
//! to every consumer; the single synchronizing consumer's
//! acknowledgement paces the caller (the producer-device tick blocks
//! on `send`), and with no synchronizing consumer registered the
//! device paces itself to the format's frame period. Non-synchronizing
//! consumers are fire-and-forget with per-consumer drop accounting.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use po_common::{
    ConsumerError, EngineResult, Executor, ExecutorHandle, OutputFrame, VideoFormatDesc,
};

use crate::consumer::{Consumer, SendResult};

/// Budget for draining all consumers at teardown.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(10);

struct DeviceState {
    consumers: BTreeMap<i32, Box<dyn Consumer>>,
    desc: VideoFormatDesc,
    channel_index: usize,
    drops: BTreeMap<i32, u64>,
    next_deadline: Option<Instant>,
}

impl DeviceState {
    fn add(&mut self, mut consumer: Box<dyn Consumer>) -> EngineResult<()> {
        consumer.initialize(&self.desc, self.channel_index)?;

        if consumer.has_synchronization_clock() {
            if let Some(existing) = self
                .consumers
                .values()
                .find(|c| c.has_synchronization_clock() && c.index() != consumer.index())
            {
                return Err(ConsumerError::DuplicateSyncClock {
                    existing: existing.index(),
                    adding: consumer.index(),
                }
                .into());
            }
        }

        let index = consumer.index();
        if let Some(previous) = self.consumers.insert(index, consumer) {
            // The replaced consumer flushes on drop.
            warn!(index, name = %previous.name(), "replacing consumer with same index");
        }
        info!(index, "consumer added");
        Ok(())
    }

    fn remove(&mut self, index: i32) -> bool {
        match self.consumers.remove(&index) {
            Some(consumer) => {
                info!(index, name = %consumer.name(), "removing consumer");
                drop(consumer); // synchronous teardown, flushes
                true
            }
            None => false,
        }
    }

    fn dispatch(&mut self, frame: OutputFrame) -> EngineResult<()> {
        let mut sync_ack = None;
        for (&index, consumer) in self.consumers.iter_mut() {
            let mut ack = consumer.send(frame.clone());
            if consumer.has_synchronization_clock() && sync_ack.is_none() {
                sync_ack = Some((index, ack));
            } else if ack.try_ready() == Some(SendResult::Dropped) {
                *self.drops.entry(index).or_default() += 1;
                debug!(consumer = index, frame = frame.number, "frame dropped");
            }
        }

        match sync_ack {
            Some((index, ack)) => {
                // Backpressure point: wait for the clock-bearing sink.
                if ack.wait()? == SendResult::Dropped {
                    *self.drops.entry(index).or_default() += 1;
                    debug!(consumer = index, frame = frame.number, "sync consumer dropped frame");
                }
                self.next_deadline = None;
            }
            None => self.pace(),
        }
        Ok(())
    }

    /// Frame-period pacing for channels without a clock-bearing sink.
    fn pace(&mut self) {
        let period = self.desc.frame_period();
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Re-sync rather than burst when we fell far behind.
        self.next_deadline = Some(if deadline + period < now {
            now + period
        } else {
            deadline + period
        });
    }
}

/// Cloneable submission handle; the channel's sink keeps one.
#[derive(Clone)]
pub struct ConsumerDeviceHandle {
    handle: ExecutorHandle<DeviceState>,
}

impl ConsumerDeviceHandle {
    /// Dispatch one frame to every consumer, blocking until the
    /// synchronizing consumer acknowledges (or the pacing timer
    /// expires).
    pub fn send(&self, frame: OutputFrame) -> EngineResult<()> {
        self.handle
            .begin_invoke(move |state, _| state.dispatch(frame))
            .wait()?
    }
}

/// Owns the consumer set and its dispatch executor.
pub struct ConsumerDevice {
    executor: Executor<DeviceState>,
}

impl ConsumerDevice {
    pub fn new(desc: VideoFormatDesc, channel_index: usize) -> Self {
        let state = DeviceState {
            consumers: BTreeMap::new(),
            desc,
            channel_index,
            drops: BTreeMap::new(),
            next_deadline: None,
        };
        Self {
            executor: Executor::new("consumer-device", state),
        }
    }

    pub fn handle(&self) -> ConsumerDeviceHandle {
        ConsumerDeviceHandle {
            handle: self.executor.handle(),
        }
    }

    /// Initialize and register a consumer. A duplicate index replaces
    /// the prior consumer; a second synchronization clock is rejected.
    pub fn add_consumer(&self, consumer: Box<dyn Consumer>) -> EngineResult<()> {
        self.executor.invoke(move |state, _| state.add(consumer))?
    }

    /// Remove and synchronously destroy a consumer. Returns whether it
    /// existed.
    pub fn remove_consumer(&self, index: i32) -> EngineResult<bool> {
        self.executor.invoke(move |state, _| state.remove(index))
    }

    /// Per-consumer dropped-frame totals observed by the dispatcher.
    pub fn drop_counts(&self) -> EngineResult<Vec<(i32, u64)>> {
        self.executor
            .invoke(|state, _| state.drops.iter().map(|(&i, &n)| (i, n)).collect())
    }

    /// Registered consumer indices, ascending.
    pub fn consumer_indices(&self) -> EngineResult<Vec<i32>> {
        self.executor
            .invoke(|state, _| state.consumers.keys().copied().collect())
    }
}

impl Drop for ConsumerDevice {
    fn drop(&mut self) {
        let done = self
            .executor
            .begin_invoke(|state, _| state.consumers.clear());
        if let Err(err) = done.wait_timeout(TEARDOWN_TIMEOUT) {
            error!(error = %err, "consumer teardown timed out, releasing forcibly");
            self.executor.abandon();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::{AckFuture, ConsumerInfo};
    use po_common::{AudioBuffer, FieldMode, ImageBuffer, PixelFormat, TaskFuture};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn fast_desc() -> VideoFormatDesc {
        // 200 fps: 5 ms pacing period keeps the tests quick.
        VideoFormatDesc::custom(8, 8, FieldMode::Progressive, 200, 1, 48_000)
    }

    fn frame(number: u64) -> OutputFrame {
        OutputFrame::new(
            ImageBuffer::new(8, 8, PixelFormat::Bgra),
            Arc::new(AudioBuffer::new()),
            number,
        )
    }

    /// Records received frame numbers; never blocks.
    #[derive(Clone)]
    struct RecordingConsumer {
        index: i32,
        seen: Arc<Mutex<Vec<u64>>>,
        initialized: Arc<AtomicU64>,
    }

    impl RecordingConsumer {
        fn new(index: i32) -> Self {
            Self {
                index,
                seen: Arc::new(Mutex::new(Vec::new())),
                initialized: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    impl Consumer for RecordingConsumer {
        fn initialize(&mut self, _desc: &VideoFormatDesc, _channel: usize) -> EngineResult<()> {
            self.initialized.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn send(&mut self, frame: OutputFrame) -> AckFuture {
            self.seen.lock().push(frame.number);
            TaskFuture::ready(SendResult::Accepted)
        }

        fn index(&self) -> i32 {
            self.index
        }

        fn name(&self) -> String {
            format!("recording[{}]", self.index)
        }

        fn info(&self) -> ConsumerInfo {
            ConsumerInfo::new("recording")
        }
    }

    /// Synchronizing consumer backed by a bounded channel the test
    /// drains by hand.
    struct StepConsumer {
        index: i32,
        tx: crossbeam::channel::Sender<u64>,
    }

    impl Consumer for StepConsumer {
        fn initialize(&mut self, _desc: &VideoFormatDesc, _channel: usize) -> EngineResult<()> {
            Ok(())
        }

        fn send(&mut self, frame: OutputFrame) -> AckFuture {
            match self.tx.send(frame.number) {
                Ok(()) => TaskFuture::ready(SendResult::Accepted),
                Err(_) => TaskFuture::ready(SendResult::Dropped),
            }
        }

        fn has_synchronization_clock(&self) -> bool {
            true
        }

        fn buffer_depth(&self) -> usize {
            2
        }

        fn index(&self) -> i32 {
            self.index
        }

        fn name(&self) -> String {
            format!("step[{}]", self.index)
        }

        fn info(&self) -> ConsumerInfo {
            ConsumerInfo::new("step")
        }
    }

    /// Always reports a drop.
    struct OverloadedConsumer {
        index: i32,
    }

    impl Consumer for OverloadedConsumer {
        fn initialize(&mut self, _desc: &VideoFormatDesc, _channel: usize) -> EngineResult<()> {
            Ok(())
        }

        fn send(&mut self, _frame: OutputFrame) -> AckFuture {
            TaskFuture::ready(SendResult::Dropped)
        }

        fn index(&self) -> i32 {
            self.index
        }

        fn name(&self) -> String {
            "overloaded".into()
        }

        fn info(&self) -> ConsumerInfo {
            ConsumerInfo::new("overloaded")
        }
    }

    #[test]
    fn frames_reach_all_consumers_in_order() {
        let device = ConsumerDevice::new(fast_desc(), 1);
        let a = RecordingConsumer::new(1);
        let b = RecordingConsumer::new(2);
        device.add_consumer(Box::new(a.clone())).unwrap();
        device.add_consumer(Box::new(b.clone())).unwrap();

        let handle = device.handle();
        for i in 0..5 {
            handle.send(frame(i)).unwrap();
        }
        assert_eq!(*a.seen.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(*b.seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn add_initializes_with_channel_format() {
        let device = ConsumerDevice::new(fast_desc(), 3);
        let consumer = RecordingConsumer::new(1);
        device.add_consumer(Box::new(consumer.clone())).unwrap();
        assert_eq!(consumer.initialized.load(Ordering::Relaxed), 1);
        assert_eq!(device.consumer_indices().unwrap(), vec![1]);
    }

    #[test]
    fn duplicate_index_replaces() {
        let device = ConsumerDevice::new(fast_desc(), 1);
        let first = RecordingConsumer::new(7);
        let second = RecordingConsumer::new(7);
        device.add_consumer(Box::new(first.clone())).unwrap();
        device.add_consumer(Box::new(second.clone())).unwrap();

        device.handle().send(frame(0)).unwrap();
        assert!(first.seen.lock().is_empty());
        assert_eq!(*second.seen.lock(), vec![0]);
        assert_eq!(device.consumer_indices().unwrap(), vec![7]);
    }

    #[test]
    fn second_sync_clock_is_rejected() {
        let (tx1, _rx1) = crossbeam::channel::bounded(64);
        let (tx2, _rx2) = crossbeam::channel::bounded(64);
        let device = ConsumerDevice::new(fast_desc(), 1);
        device
            .add_consumer(Box::new(StepConsumer { index: 1, tx: tx1 }))
            .unwrap();
        let result = device.add_consumer(Box::new(StepConsumer { index: 2, tx: tx2 }));
        assert!(matches!(
            result,
            Err(po_common::EngineError::Consumer(
                ConsumerError::DuplicateSyncClock { existing: 1, adding: 2 }
            ))
        ));
    }

    #[test]
    fn sync_consumer_paces_the_caller() {
        let (tx, rx) = crossbeam::channel::bounded(2);
        let device = ConsumerDevice::new(fast_desc(), 1);
        device
            .add_consumer(Box::new(StepConsumer { index: 1, tx }))
            .unwrap();

        let handle = device.handle();
        let sender = std::thread::spawn(move || {
            for i in 0..6 {
                handle.send(frame(i)).unwrap();
            }
        });

        // With depth 2 and nothing drained, the sender cannot be more
        // than depth + in-flight ahead.
        std::thread::sleep(Duration::from_millis(50));
        assert!(rx.len() <= 2);
        assert!(!sender.is_finished());

        // Drain: the sender finishes.
        let drained: Vec<u64> = (0..6).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4, 5]);
        sender.join().unwrap();
    }

    #[test]
    fn non_sync_drops_are_counted() {
        let device = ConsumerDevice::new(fast_desc(), 1);
        device
            .add_consumer(Box::new(OverloadedConsumer { index: 9 }))
            .unwrap();

        let handle = device.handle();
        for i in 0..4 {
            handle.send(frame(i)).unwrap();
        }
        assert_eq!(device.drop_counts().unwrap(), vec![(9, 4)]);
    }

    #[test]
    fn pacing_holds_frame_period_without_sync_consumer() {
        let device = ConsumerDevice::new(fast_desc(), 1);
        device
            .add_consumer(Box::new(RecordingConsumer::new(1)))
            .unwrap();

        let handle = device.handle();
        let start = Instant::now();
        for i in 0..6 {
            handle.send(frame(i)).unwrap();
        }
        // 6 sends at 5 ms period: at least 5 full periods elapsed.
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn remove_consumer_destroys_synchronously() {
        let device = ConsumerDevice::new(fast_desc(), 1);
        let consumer = RecordingConsumer::new(4);
        device.add_consumer(Box::new(consumer.clone())).unwrap();

        assert!(device.remove_consumer(4).unwrap());
        assert!(!device.remove_consumer(4).unwrap());

        device.handle().send(frame(0)).unwrap();
        assert!(consumer.seen.lock().is_empty());
    }

    #[test]
    fn send_after_device_drop_fails_cleanly() {
        let device = ConsumerDevice::new(fast_desc(), 1);
        let handle = device.handle();
        drop(device);
        assert!(handle.send(frame(0)).is_err());
    }
}
