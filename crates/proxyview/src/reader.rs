//! Per-camera acquisition.
//!
//! A [`SourceReader`] owns one capture endpoint and a dedicated thread that
//! reads frames into a private bounded queue, posting the shared readiness
//! signal after every successful read.

use crate::capture::{CancelHandle, CaptureBackend};
use crate::error::{PipelineError, Result};
use crate::frame::SharedFrame;
use crate::queue::{frame_queue, FrameConsumer, FrameProducer, PushOutcome};
use crate::signal::ReadyPoster;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// Counters for one source, readable from any thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub frames_dropped: u64,
    pub read_failures: u64,
}

/// State shared between a reader handle and its acquisition thread.
#[derive(Default)]
struct SourceState {
    running: AtomicBool,
    connected: AtomicBool,
    cancel: Mutex<Option<CancelHandle>>,
    frames_read: AtomicU64,
    frames_dropped: AtomicU64,
    read_failures: AtomicU64,
}

/// One camera input.
///
/// Construction does not start anything; call [`start`](Self::start).
pub struct SourceReader {
    name: String,
    descriptor: String,
    backend: Arc<dyn CaptureBackend>,
    poster: ReadyPoster,
    producer: Mutex<Option<FrameProducer>>,
    consumer: FrameConsumer,
    state: Arc<SourceState>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SourceReader {
    pub fn new(
        name: impl Into<String>,
        descriptor: impl Into<String>,
        queue_capacity: usize,
        poster: ReadyPoster,
        backend: Arc<dyn CaptureBackend>,
    ) -> Result<Self> {
        let (producer, consumer) = frame_queue(queue_capacity)?;
        Ok(Self {
            name: name.into(),
            descriptor: descriptor.into(),
            backend,
            poster,
            producer: Mutex::new(Some(producer)),
            consumer,
            state: Arc::new(SourceState::default()),
            thread: Mutex::new(None),
        })
    }

    /// Spawn the acquisition thread. A second call only logs a warning.
    pub fn start(&self) -> Result<()> {
        let Some(producer) = lock(&self.producer).take() else {
            log::warn!("[{}] Source reader already started", self.name);
            return Ok(());
        };

        self.state.running.store(true, Ordering::SeqCst);
        let acquisition = Acquisition {
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            backend: self.backend.clone(),
            poster: self.poster.clone(),
            producer,
            state: self.state.clone(),
        };
        let spawned = std::thread::Builder::new()
            .name(format!("proxyview-{}", self.name))
            .spawn(move || acquisition.run());

        match spawned {
            Ok(handle) => {
                *lock(&self.thread) = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.state.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Stop acquisition and release the endpoint. Safe to call repeatedly.
    ///
    /// Cancellation is requested through the device, but a backend whose read
    /// ignores it keeps this call waiting until that read returns.
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::SeqCst);
        // Never started: make a later start() a no-op.
        lock(&self.producer).take();

        if let Some(cancel) = lock(&self.state.cancel).clone() {
            cancel.cancel();
        }

        if let Some(handle) = lock(&self.thread).take() {
            log::info!("[{}] Stopping source reader...", self.name);
            if handle.join().is_err() {
                log::error!("[{}] Source reader thread panicked", self.name);
            } else {
                log::info!("[{}] Source reader stopped", self.name);
            }
        }
    }

    /// True while the endpoint is open.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Oldest pending frame, without blocking.
    pub fn get_frame(&self) -> Option<SharedFrame> {
        self.consumer.pop()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.state.frames_read.load(Ordering::Relaxed),
            frames_dropped: self.state.frames_dropped.load(Ordering::Relaxed),
            read_failures: self.state.read_failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SourceReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the acquisition thread owns.
struct Acquisition {
    name: String,
    descriptor: String,
    backend: Arc<dyn CaptureBackend>,
    poster: ReadyPoster,
    producer: FrameProducer,
    state: Arc<SourceState>,
}

impl Acquisition {
    fn run(self) {
        log::info!("[{}] Connecting to '{}'...", self.name, self.descriptor);

        let mut device = match self.backend.open(&self.descriptor) {
            Ok(device) => device,
            Err(e) => {
                // Terminal: this source stays disconnected for the process lifetime.
                log::error!("[{}] Unable to open source: {}", self.name, e);
                self.state.running.store(false, Ordering::SeqCst);
                return;
            }
        };

        *lock(&self.state.cancel) = Some(device.cancel_handle());
        self.state.connected.store(true, Ordering::SeqCst);
        log::info!("[{}] Opened '{}'", self.name, self.descriptor);

        while self.state.running.load(Ordering::SeqCst) {
            match device.read() {
                Ok(frame) if frame.is_empty() => {
                    self.state.read_failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!("[{}] Failed to read a frame: empty frame", self.name);
                }
                Ok(frame) => {
                    self.state.frames_read.fetch_add(1, Ordering::Relaxed);
                    if self.producer.push(frame.into_shared()) == PushOutcome::Dropped {
                        self.state.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    // Posted whether or not the queue accepted the frame.
                    self.poster.post();
                }
                Err(e) => {
                    if !self.state.running.load(Ordering::SeqCst) {
                        break;
                    }
                    self.state.read_failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!("[{}] Failed to read a frame: {}", self.name, e);
                }
            }
        }

        lock(&self.state.cancel).take();
        log::info!("[{}] Releasing '{}'", self.name, self.descriptor);
        device.close();
        self.state.connected.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ChannelBackend, PatternBackend};
    use crate::frame::{Frame, PixelFormat};
    use crate::signal::ready_signal;
    use std::time::{Duration, Instant};

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn gray(value: u8) -> Frame {
        Frame::filled(2, 2, PixelFormat::Gray8, &[value]).unwrap()
    }

    #[test]
    fn test_not_started_until_start() {
        let (poster, waiter) = ready_signal();
        let reader =
            SourceReader::new("source-0", "pattern://2x2/red", 2, poster, Arc::new(PatternBackend))
                .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(!reader.is_connected());
        assert!(reader.get_frame().is_none());
        assert_eq!(waiter.pending(), 0);
    }

    #[test]
    fn test_zero_capacity_is_error() {
        let (poster, _waiter) = ready_signal();
        let result = SourceReader::new("s", "pattern://2x2/red", 0, poster, Arc::new(PatternBackend));
        assert!(matches!(result, Err(PipelineError::ZeroCapacity)));
    }

    #[test]
    fn test_frames_flow_and_signal_posted() {
        let backend = ChannelBackend::new();
        let feed = backend.register("cam");
        let (poster, waiter) = ready_signal();
        let reader =
            SourceReader::new("source-0", "channel://cam", 3, poster, Arc::new(backend)).unwrap();
        reader.start().unwrap();
        assert!(wait_until(|| reader.is_connected()));

        feed.send(gray(1));
        feed.send(gray(2));
        waiter.wait();
        waiter.wait();

        assert_eq!(reader.get_frame().unwrap().as_slice()[0], 1);
        assert_eq!(reader.get_frame().unwrap().as_slice()[0], 2);
        assert!(reader.get_frame().is_none());

        reader.stop();
        assert!(!reader.is_connected());
    }

    #[test]
    fn test_full_queue_drops_newest_but_still_posts() {
        let backend = ChannelBackend::new();
        let feed = backend.register("cam");
        let (poster, waiter) = ready_signal();
        let reader =
            SourceReader::new("source-0", "channel://cam", 2, poster, Arc::new(backend)).unwrap();
        reader.start().unwrap();

        for value in 1..=4 {
            feed.send(gray(value));
        }
        assert!(wait_until(|| waiter.pending() == 4));

        assert_eq!(reader.stats().frames_read, 4);
        assert_eq!(reader.stats().frames_dropped, 2);
        let kept: Vec<u8> = std::iter::from_fn(|| reader.get_frame())
            .map(|f| f.as_slice()[0])
            .collect();
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn test_read_failures_are_retried() {
        let backend = ChannelBackend::new();
        let feed = backend.register("cam");
        let (poster, waiter) = ready_signal();
        let reader =
            SourceReader::new("source-0", "channel://cam", 2, poster, Arc::new(backend)).unwrap();
        reader.start().unwrap();

        feed.fail("glitch");
        feed.send(Frame::blank(0, 0, PixelFormat::Gray8).unwrap());
        feed.send(gray(9));
        waiter.wait();

        assert_eq!(reader.get_frame().unwrap().as_slice()[0], 9);
        let stats = reader.stats();
        assert_eq!(stats.read_failures, 2);
        assert_eq!(stats.frames_read, 1);
        assert!(reader.is_connected());
    }

    #[test]
    fn test_open_failure_is_terminal() {
        let (poster, waiter) = ready_signal();
        let reader = SourceReader::new(
            "source-0",
            "channel://missing",
            2,
            poster,
            Arc::new(ChannelBackend::new()),
        )
        .unwrap();
        reader.start().unwrap();
        assert!(wait_until(|| !reader.state.running.load(Ordering::SeqCst)));
        assert!(!reader.is_connected());
        assert_eq!(waiter.pending(), 0);
        reader.stop();
    }

    #[test]
    fn test_stop_is_idempotent_and_unblocks_read() {
        let backend = ChannelBackend::new();
        let _feed = backend.register("cam");
        let (poster, _waiter) = ready_signal();
        let reader =
            SourceReader::new("source-0", "channel://cam", 2, poster, Arc::new(backend)).unwrap();
        reader.start().unwrap();
        assert!(wait_until(|| reader.is_connected()));

        // The thread is parked inside a blocking read with no frames coming.
        reader.stop();
        reader.stop();
        assert!(!reader.is_connected());

        // Restarting a stopped reader does nothing.
        reader.start().unwrap();
        assert!(!reader.is_connected());
    }

    #[test]
    fn test_stop_before_start() {
        let (poster, _waiter) = ready_signal();
        let reader =
            SourceReader::new("source-0", "pattern://2x2/red", 2, poster, Arc::new(PatternBackend))
                .unwrap();
        reader.stop();
        reader.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(!reader.is_connected());
    }
}
