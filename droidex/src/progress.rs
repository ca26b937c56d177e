use std::sync::Mutex;

use crossbeam::channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

pub trait EventMonitor<T>: Send + Sync {
    fn on_event(&self, evt: T);
}

impl<U> EventMonitor<U> for Box<dyn EventMonitor<U>> {
    fn on_event(&self, evt: U) {
        self.as_ref().on_event(evt)
    }
}

impl<T, U> EventMonitor<U> for Box<T>
where
    T: EventMonitor<U>,
{
    fn on_event(&self, evt: U) {
        self.as_ref().on_event(evt)
    }
}

/// An [EventMonitor] that is just a noop
pub struct NoopMonitor;

impl<T> EventMonitor<T> for NoopMonitor {
    fn on_event(&self, _evt: T) {
        // noop
    }
}

impl NoopMonitor {
    pub fn new() -> Self {
        Self {}
    }
}

/// An [EventMonitor] that just dumps the events onto a channel.
pub struct ChannelEventMonitor<T>
where
    T: Sync + Send,
{
    chan: Sender<T>,
}

impl<T> ChannelEventMonitor<T>
where
    T: Sync + Send,
{
    pub fn create() -> (Self, Receiver<T>) {
        Self::create_with_bound(16)
    }

    pub fn create_with_bound(bound: usize) -> (Self, Receiver<T>) {
        let (tx, rx) = bounded(bound);
        (Self::new(tx), rx)
    }

    pub fn new(chan: Sender<T>) -> Self {
        Self { chan }
    }
}

impl<T> EventMonitor<T> for ChannelEventMonitor<T>
where
    T: Sync + Send,
{
    fn on_event(&self, evt: T) {
        let _ = self.chan.send(evt);
    }
}

/// Keeps every event it sees, mostly useful in tests
pub struct RecordingMonitor<T> {
    events: Mutex<Vec<T>>,
}

impl<T> RecordingMonitor<T> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn take(&self) -> Vec<T> {
        match self.events.lock() {
            Ok(mut lock) => std::mem::take(&mut *lock),
            Err(_) => Vec::new(),
        }
    }
}

impl<T: Send> EventMonitor<T> for RecordingMonitor<T> {
    fn on_event(&self, evt: T) {
        if let Ok(mut lock) = self.events.lock() {
            lock.push(evt);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Step number, fractional values are sub steps
    pub step: f32,
    pub message: String,
    pub percent: u8,
}

/// Forwards [ProgressEvent]s to a monitor.
///
/// Percentages never go backwards and 100 is held back until [done] is
/// called, whatever the caller asks for.
///
/// [done]: ProgressTracker::done
pub struct ProgressTracker<'a> {
    monitor: &'a dyn EventMonitor<ProgressEvent>,
    last: u8,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(monitor: &'a dyn EventMonitor<ProgressEvent>) -> Self {
        Self { monitor, last: 0 }
    }

    pub fn percent(&self) -> u8 {
        self.last
    }

    pub fn update<S: Into<String>>(&mut self, step: f32, message: S, percent: u8) {
        let percent = percent.min(99).max(self.last);
        self.emit(step, message.into(), percent);
    }

    pub fn done<S: Into<String>>(&mut self, step: f32, message: S) {
        self.emit(step, message.into(), 100);
    }

    fn emit(&mut self, step: f32, message: String, percent: u8) {
        self.last = percent;
        log::debug!("[{:>3}%] {} {}", percent, step, message);
        self.monitor.on_event(ProgressEvent {
            step,
            message,
            percent,
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    #[rstest]
    fn test_monotonic_percent() {
        let mon: RecordingMonitor<ProgressEvent> = RecordingMonitor::new();
        let mut tracker = ProgressTracker::new(&mon);
        tracker.update(1.0, "one", 10);
        tracker.update(2.0, "two", 5);
        tracker.update(3.0, "three", 100);
        tracker.done(4.0, "done");

        let percents: Vec<u8> = mon.take().iter().map(|it| it.percent).collect();
        assert_eq!(percents, vec![10, 10, 99, 100]);
    }

    #[rstest]
    fn test_channel_monitor() {
        let (mon, rx) = ChannelEventMonitor::<ProgressEvent>::create();
        let mut tracker = ProgressTracker::new(&mon);
        tracker.update(1.5, "Checking device", 20);
        let evt = rx.try_recv().expect("event sent");
        assert_eq!(evt.step, 1.5);
        assert_eq!(evt.message, "Checking device");
    }
}
