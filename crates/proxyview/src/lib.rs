//! Multi-camera acquisition and composition into one proxy view.
//!
//! Every camera gets a [`SourceReader`] thread that fills a small bounded
//! queue. A single [`Compositor`] thread wakes whenever any camera delivers,
//! tiles the newest frame of each camera left to right, resizes the result to
//! the output geometry and queues it for [`Compositor::get_frame`].
//!
//! ```no_run
//! use proxyview::{capture::SchemeBackend, Compositor, CompositorSettings};
//! use std::sync::Arc;
//!
//! let settings = CompositorSettings::new(1, 1280, 360);
//! let cameras = ["pattern://640x360/red?fps=30", "pattern://640x360/blue?fps=30"];
//! let compositor = Compositor::new(settings, &cameras, Arc::new(SchemeBackend::new()))?;
//! compositor.start()?;
//! if let Some(frame) = compositor.get_frame() {
//!     println!("{:?}", frame);
//! }
//! compositor.stop();
//! # Ok::<(), proxyview::PipelineError>(())
//! ```

pub mod capture;
pub mod compose;
pub mod compositor;
pub mod config;
pub mod error;
pub mod frame;
pub mod output;
pub mod queue;
pub mod reader;
pub mod signal;

pub use compositor::{CompositionCycle, Compositor, CompositorSettings, CompositorStats};
pub use error::{CaptureError, CompositionError, FrameError, PipelineError};
pub use frame::{Frame, PixelFormat, SharedFrame};
pub use output::{FramePacer, PacedFrame};
pub use queue::PushOutcome;
pub use reader::{SourceReader, SourceStats};
