//! Fan-in of every source into one composite stream.
//!
//! The compositor thread sleeps on the shared readiness signal. On each wake
//! it takes the newest pending frame of every source (or that source's
//! last-known frame), tiles them into one row, resizes the canvas to the
//! output geometry and pushes the result into its own bounded queue.

use crate::capture::CaptureBackend;
use crate::compose;
use crate::error::{self, CompositionError, PipelineError};
use crate::frame::{Frame, PixelFormat, SharedFrame};
use crate::queue::{frame_queue, FrameConsumer, FrameProducer, PushOutcome};
use crate::reader::{SourceReader, SourceStats};
use crate::signal::{ready_signal, ReadyPoster, ReadyWaiter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// Width of the blank frame every source starts from.
pub const DEFAULT_BLANK_WIDTH: u32 = 3840;
/// Height of the blank frame every source starts from.
pub const DEFAULT_BLANK_HEIGHT: u32 = 2160;

/// Geometry and buffering of a compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositorSettings {
    /// Frames buffered per source queue and in the output queue.
    pub queue_capacity: usize,
    pub output_width: u32,
    pub output_height: u32,
    /// Placeholder used for a source until its first frame is composited.
    pub blank_width: u32,
    pub blank_height: u32,
    pub blank_format: PixelFormat,
}

impl CompositorSettings {
    pub fn new(queue_capacity: usize, output_width: u32, output_height: u32) -> Self {
        Self {
            queue_capacity,
            output_width,
            output_height,
            blank_width: DEFAULT_BLANK_WIDTH,
            blank_height: DEFAULT_BLANK_HEIGHT,
            blank_format: PixelFormat::Rgb8,
        }
    }

    pub fn with_blank(mut self, width: u32, height: u32, format: PixelFormat) -> Self {
        self.blank_width = width;
        self.blank_height = height;
        self.blank_format = format;
        self
    }

    fn validate(&self) -> error::Result<()> {
        if self.queue_capacity == 0 {
            return Err(PipelineError::ZeroCapacity);
        }
        if self.output_width == 0 || self.output_height == 0 {
            return Err(PipelineError::ZeroOutputSize(
                self.output_width,
                self.output_height,
            ));
        }
        if self.blank_width == 0 || self.blank_height == 0 {
            return Err(PipelineError::ZeroBlankSize(
                self.blank_width,
                self.blank_height,
            ));
        }
        Ok(())
    }
}

/// The per-wake composition step and the state it carries between wakes.
///
/// Owned by the compositor thread; nothing else touches the last-known
/// frames.
pub struct CompositionCycle {
    last_known: Vec<SharedFrame>,
    // True while source `i` still shows a blank no frame has replaced.
    unfilled: Vec<bool>,
    // One zeroed placeholder per layout, built on first use.
    blanks: HashMap<PixelFormat, SharedFrame>,
    blank_width: u32,
    blank_height: u32,
    output: FrameProducer,
    output_width: u32,
    output_height: u32,
}

impl CompositionCycle {
    /// Seed `sources` last-known frames with blanks and prime the output queue
    /// with one blank composite, so an early pull still gets a valid frame.
    pub fn new(
        sources: usize,
        settings: &CompositorSettings,
    ) -> error::Result<(Self, FrameConsumer)> {
        settings.validate()?;
        let (output, consumer) = frame_queue(settings.queue_capacity)?;

        let blank = Frame::blank(
            settings.blank_width,
            settings.blank_height,
            settings.blank_format,
        )?
        .into_shared();
        let last_known = vec![blank.clone(); sources];
        let blanks = HashMap::from([(settings.blank_format, blank)]);

        let composite = Frame::blank(
            settings.output_width,
            settings.output_height,
            settings.blank_format,
        )?;
        let primed = output.push(composite.into_shared());
        debug_assert!(primed.is_accepted(), "fresh output queue rejected a frame");

        Ok((
            Self {
                last_known,
                unfilled: vec![true; sources],
                blanks,
                blank_width: settings.blank_width,
                blank_height: settings.blank_height,
                output,
                output_width: settings.output_width,
                output_height: settings.output_height,
            },
            consumer,
        ))
    }

    /// Run one composition.
    ///
    /// `pending(i)` yields the newest frame of source `i`, if any. Sources
    /// still showing their initial blank take the pixel layout of the real
    /// frames, so a BGR camera next to an unfilled slot still composes. On
    /// error nothing is pushed and the last-known frames are unchanged.
    pub fn run_once(
        &mut self,
        mut pending: impl FnMut(usize) -> Option<SharedFrame>,
    ) -> Result<PushOutcome, CompositionError> {
        let fresh: Vec<Option<SharedFrame>> =
            (0..self.last_known.len()).map(&mut pending).collect();

        let layout = fresh
            .iter()
            .flatten()
            .chain(
                self.last_known
                    .iter()
                    .zip(&self.unfilled)
                    .filter(|(_, unfilled)| !**unfilled)
                    .map(|(frame, _)| frame),
            )
            .map(|frame| frame.format())
            .next();

        let mut frames = Vec::with_capacity(fresh.len());
        for (i, frame) in fresh.iter().enumerate() {
            let frame = match (frame, layout) {
                (Some(frame), _) => frame.clone(),
                (None, Some(format))
                    if self.unfilled[i] && self.last_known[i].format() != format =>
                {
                    self.blank_as(format)?
                }
                (None, _) => self.last_known[i].clone(),
            };
            frames.push(frame);
        }

        let composite = compose::compose(&frames, self.output_width, self.output_height)?;
        let outcome = self.output.push(composite.into_shared());

        for (unfilled, frame) in self.unfilled.iter_mut().zip(&fresh) {
            *unfilled &= frame.is_none();
        }
        self.last_known = frames;
        Ok(outcome)
    }

    fn blank_as(&mut self, format: PixelFormat) -> Result<SharedFrame, CompositionError> {
        if let Some(blank) = self.blanks.get(&format) {
            return Ok(blank.clone());
        }
        let blank = Frame::blank(self.blank_width, self.blank_height, format)?.into_shared();
        self.blanks.insert(format, blank.clone());
        Ok(blank)
    }

    /// Frame most recently composited for source `index`.
    pub fn last_known(&self, index: usize) -> Option<&SharedFrame> {
        self.last_known.get(index)
    }

    pub fn source_count(&self) -> usize {
        self.last_known.len()
    }
}

/// Counters for the compositor thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositorStats {
    pub composed: u64,
    pub dropped: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    composed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Multi-camera compositor.
///
/// Build with [`new`](Self::new), then [`start`](Self::start) the source
/// readers and the compositor thread. [`get_frame`](Self::get_frame) is the
/// only way composites leave.
pub struct Compositor {
    settings: CompositorSettings,
    readers: Arc<[SourceReader]>,
    poster: ReadyPoster,
    output: FrameConsumer,
    pending_start: Mutex<Option<(CompositionCycle, ReadyWaiter)>>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Compositor {
    /// Build readers for every descriptor. Nothing runs until `start`.
    pub fn new<S: AsRef<str>>(
        settings: CompositorSettings,
        descriptors: &[S],
        backend: Arc<dyn CaptureBackend>,
    ) -> error::Result<Self> {
        settings.validate()?;
        let (poster, waiter) = ready_signal();

        let readers = descriptors
            .iter()
            .enumerate()
            .map(|(i, descriptor)| {
                SourceReader::new(
                    format!("source-{}", i),
                    descriptor.as_ref(),
                    settings.queue_capacity,
                    poster.clone(),
                    backend.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (cycle, output) = CompositionCycle::new(readers.len(), &settings)?;

        Ok(Self {
            settings,
            readers: readers.into(),
            poster,
            output,
            pending_start: Mutex::new(Some((cycle, waiter))),
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            thread: Mutex::new(None),
        })
    }

    /// Start every source reader, then the compositor thread.
    pub fn start(&self) -> error::Result<()> {
        let Some((cycle, waiter)) = lock(&self.pending_start).take() else {
            log::warn!("Compositor already started");
            return Ok(());
        };

        for reader in self.readers.iter() {
            reader.start()?;
        }

        self.running.store(true, Ordering::SeqCst);
        let worker = Worker {
            readers: self.readers.clone(),
            cycle,
            waiter,
            running: self.running.clone(),
            counters: self.counters.clone(),
        };
        let spawned = std::thread::Builder::new()
            .name("proxyview-compositor".to_string())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                *lock(&self.thread) = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Stop the compositor thread, then every source reader. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // Drop an unstarted cycle so a later start() is a no-op.
        lock(&self.pending_start).take();
        self.poster.post();

        if let Some(handle) = lock(&self.thread).take() {
            log::info!("Stopping compositor thread...");
            if handle.join().is_err() {
                log::error!("Compositor thread panicked");
            } else {
                log::info!("Compositor thread stopped");
            }
        }

        for reader in self.readers.iter() {
            reader.stop();
        }
    }

    /// True when there is at least one source and all of them are connected.
    pub fn is_connected(&self) -> bool {
        all_connected(&self.readers)
    }

    /// Newest composite not yet pulled, without blocking.
    pub fn get_frame(&self) -> Option<SharedFrame> {
        self.output.pop()
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.settings.output_width, self.settings.output_height)
    }

    pub fn source_count(&self) -> usize {
        self.readers.len()
    }

    pub fn sources(&self) -> &[SourceReader] {
        &self.readers
    }

    pub fn source_stats(&self) -> Vec<SourceStats> {
        self.readers.iter().map(SourceReader::stats).collect()
    }

    pub fn stats(&self) -> CompositorStats {
        CompositorStats {
            composed: self.counters.composed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn all_connected(readers: &[SourceReader]) -> bool {
    !readers.is_empty() && readers.iter().all(SourceReader::is_connected)
}

/// Everything the compositor thread owns.
struct Worker {
    readers: Arc<[SourceReader]>,
    cycle: CompositionCycle,
    waiter: ReadyWaiter,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl Worker {
    fn run(mut self) {
        // Any source's frame wakes us; re-check the whole set each time.
        while self.running.load(Ordering::SeqCst) && !all_connected(&self.readers) {
            self.waiter.wait();
        }

        if self.running.load(Ordering::SeqCst) {
            log::info!(
                "All {} cameras connected. Starting composition...",
                self.readers.len()
            );
        }

        while self.running.load(Ordering::SeqCst) {
            self.waiter.wait();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let readers = &self.readers;
            match self.cycle.run_once(|i| readers[i].get_frame()) {
                Ok(outcome) => {
                    self.counters.composed.fetch_add(1, Ordering::Relaxed);
                    if outcome == PushOutcome::Dropped {
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    log::error!("Composition failed, dropping this cycle: {}", e);
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
