//! Fixed-rate delivery on top of the non-blocking composite pull.
//!
//! A downstream media sink asks for a frame every `1/fps` seconds whether or
//! not the compositor produced a new one. [`FramePacer`] answers with the
//! freshest composite and repeats the previous one when nothing is pending.

use crate::error::{PipelineError, Result};
use crate::frame::SharedFrame;
use std::time::Duration;

/// One frame handed to the sink, with its presentation timing.
#[derive(Debug, Clone)]
pub struct PacedFrame {
    pub frame: SharedFrame,
    /// Monotonic from 0.
    pub number: u64,
    pub pts: Duration,
    pub duration: Duration,
    /// True when no fresh composite was pending and the previous one repeats.
    pub reused: bool,
}

#[derive(Debug)]
pub struct FramePacer {
    fps: u32,
    frame_duration: Duration,
    last: Option<SharedFrame>,
    number: u64,
    pts: Duration,
}

impl FramePacer {
    pub fn new(fps: u32) -> Result<Self> {
        if fps == 0 {
            return Err(PipelineError::ZeroFps);
        }
        Ok(Self {
            fps,
            frame_duration: Duration::from_secs(1) / fps,
            last: None,
            number: 0,
            pts: Duration::ZERO,
        })
    }

    /// Stamp the next frame.
    ///
    /// Returns `None` only while nothing has ever been delivered; the frame
    /// counter and timestamp do not advance in that case.
    pub fn next(&mut self, fresh: Option<SharedFrame>) -> Option<PacedFrame> {
        let reused = fresh.is_none();
        if let Some(frame) = fresh {
            self.last = Some(frame);
        }
        let frame = self.last.clone()?;

        let paced = PacedFrame {
            frame,
            number: self.number,
            pts: self.pts,
            duration: self.frame_duration,
            reused,
        };
        self.number += 1;
        self.pts += self.frame_duration;
        Some(paced)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Frames stamped so far.
    pub fn delivered(&self) -> u64 {
        self.number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, PixelFormat};
    use std::sync::Arc;

    fn frame(value: u8) -> SharedFrame {
        Frame::filled(2, 2, PixelFormat::Gray8, &[value])
            .unwrap()
            .into_shared()
    }

    #[test]
    fn test_zero_fps_rejected() {
        assert!(matches!(FramePacer::new(0), Err(PipelineError::ZeroFps)));
    }

    #[test]
    fn test_nothing_before_first_frame() {
        let mut pacer = FramePacer::new(30).unwrap();
        assert!(pacer.next(None).is_none());
        assert!(pacer.next(None).is_none());
        assert_eq!(pacer.delivered(), 0);
    }

    #[test]
    fn test_reuses_previous_frame() {
        let mut pacer = FramePacer::new(25).unwrap();
        let a = frame(1);

        let first = pacer.next(Some(a.clone())).unwrap();
        assert!(!first.reused);
        assert_eq!(first.number, 0);
        assert_eq!(first.pts, Duration::ZERO);

        let second = pacer.next(None).unwrap();
        assert!(second.reused);
        assert!(Arc::ptr_eq(&second.frame, &a));
        assert_eq!(second.number, 1);

        let b = frame(2);
        let third = pacer.next(Some(b.clone())).unwrap();
        assert!(!third.reused);
        assert!(Arc::ptr_eq(&third.frame, &b));
    }

    #[test]
    fn test_timestamps_advance_by_frame_duration() {
        let mut pacer = FramePacer::new(25).unwrap();
        assert_eq!(pacer.frame_duration(), Duration::from_millis(40));
        pacer.next(Some(frame(1)));
        pacer.next(None);
        let third = pacer.next(None).unwrap();
        assert_eq!(third.number, 2);
        assert_eq!(third.pts, Duration::from_millis(80));
        assert_eq!(third.duration, Duration::from_millis(40));
    }
}
