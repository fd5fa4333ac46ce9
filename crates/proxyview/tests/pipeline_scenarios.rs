use proxyview::capture::{ChannelBackend, SchemeBackend};
use proxyview::compose;
use proxyview::config::Config;
use proxyview::{
    CompositionCycle, Compositor, CompositorSettings, Frame, PixelFormat, PushOutcome,
    SharedFrame,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const RED: [u8; 3] = [255, 0, 0];
const BLUE: [u8; 3] = [0, 0, 255];

fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
    Frame::filled(width, height, PixelFormat::Rgb8, &rgb).unwrap()
}

fn settings() -> CompositorSettings {
    CompositorSettings::new(3, 640, 360).with_blank(640, 480, PixelFormat::Rgb8)
}

fn is_red_blue(frame: &SharedFrame) -> bool {
    frame.pixel(10, 180) == Some(&RED[..]) && frame.pixel(630, 180) == Some(&BLUE[..])
}

fn poll_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_two_sources_red_blue_cycles() {
    let (mut cycle, output) = CompositionCycle::new(2, &settings()).unwrap();

    let primed = output.pop().unwrap();
    assert_eq!((primed.width(), primed.height()), (640, 360));
    assert!(primed.as_slice().iter().all(|b| *b == 0));

    let red = solid(640, 480, RED).into_shared();
    let blue = solid(640, 480, BLUE).into_shared();
    let sources = [red, blue];

    // Tiled side by side before the anisotropic downscale.
    let canvas = compose::build_canvas(&sources).unwrap();
    assert_eq!((canvas.width(), canvas.height()), (1280, 480));
    assert_eq!(canvas.pixel(639, 479), Some(&RED[..]));
    assert_eq!(canvas.pixel(640, 0), Some(&BLUE[..]));

    let outcomes: Vec<PushOutcome> = (0..5)
        .map(|_| cycle.run_once(|i| Some(sources[i].clone())).unwrap())
        .collect();
    assert_eq!(
        outcomes,
        vec![
            PushOutcome::Accepted,
            PushOutcome::Accepted,
            PushOutcome::Accepted,
            PushOutcome::Dropped,
            PushOutcome::Dropped,
        ]
    );

    let composites: Vec<SharedFrame> = std::iter::from_fn(|| output.pop()).collect();
    assert_eq!(composites.len(), 3);
    for composite in &composites {
        assert_eq!((composite.width(), composite.height()), (640, 360));
        assert_eq!(composite.format(), PixelFormat::Rgb8);
        // Away from the interpolated seam at x = 319/320.
        for y in [0, 90, 180, 359] {
            for x in [0, 160, 316] {
                assert_eq!(composite.pixel(x, y), Some(&RED[..]));
            }
            for x in [323, 480, 639] {
                assert_eq!(composite.pixel(x, y), Some(&BLUE[..]));
            }
        }
    }
    assert!(output.pop().is_none());
    assert!(output.pop().is_none());
}

#[test]
fn test_threaded_channel_sources() {
    let backend = ChannelBackend::new();
    let left = backend.register("left");
    let right = backend.register("right");

    let compositor = Compositor::new(
        settings(),
        &["channel://left", "channel://right"],
        Arc::new(backend),
    )
    .unwrap();
    assert!(!compositor.is_connected());
    assert_eq!(compositor.source_count(), 2);
    assert_eq!(compositor.output_size(), (640, 360));

    compositor.start().unwrap();
    assert!(poll_until(Duration::from_secs(5), || compositor
        .is_connected()));

    let mut seen_red_blue = false;
    let found = poll_until(Duration::from_secs(5), || {
        left.send(solid(640, 480, RED));
        right.send(solid(640, 480, BLUE));
        while let Some(frame) = compositor.get_frame() {
            assert_eq!((frame.width(), frame.height()), (640, 360));
            seen_red_blue |= is_red_blue(&frame);
        }
        seen_red_blue
    });
    assert!(found);

    compositor.stop();
    compositor.stop();
    assert!(!compositor.is_connected());

    // Drain what is left; afterwards the pull keeps returning nothing.
    while compositor.get_frame().is_some() {}
    assert!(compositor.get_frame().is_none());
    assert!(compositor.get_frame().is_none());

    let stats = compositor.source_stats();
    assert!(stats.iter().all(|s| s.frames_read > 0));
}

#[test]
fn test_stalled_source_keeps_last_frame() {
    let backend = ChannelBackend::new();
    let left = backend.register("left");
    let right = backend.register("right");

    let compositor = Compositor::new(
        settings(),
        &["channel://left", "channel://right"],
        Arc::new(backend),
    )
    .unwrap();
    compositor.start().unwrap();
    assert!(poll_until(Duration::from_secs(5), || compositor
        .is_connected()));

    // Get one red|blue composite, then only the left camera keeps sending.
    let mut ready = false;
    assert!(poll_until(Duration::from_secs(5), || {
        left.send(solid(640, 480, RED));
        right.send(solid(640, 480, BLUE));
        while let Some(frame) = compositor.get_frame() {
            ready |= is_red_blue(&frame);
        }
        ready
    }));

    let green = [0, 255, 0];
    let mut seen_green_blue = false;
    assert!(poll_until(Duration::from_secs(5), || {
        left.send(solid(640, 480, green));
        while let Some(frame) = compositor.get_frame() {
            if frame.pixel(10, 180) == Some(&green[..]) {
                assert_eq!(frame.pixel(630, 180), Some(&BLUE[..]));
                seen_green_blue = true;
            }
        }
        seen_green_blue
    }));

    compositor.stop();
}

#[test]
fn test_config_to_composites() {
    let yaml = r#"
input:
  queue_capacity: 2
  locations: ["red", "blue"]
  pipeline_template: "pattern://320x180/{LOCATION}?fps=50"
  blank: { width: 320, height: 180, format: rgb }
output: { width: 640, height: 360, fps: 25 }
"#;
    let config = Config::parse(yaml).unwrap();
    let compositor = Compositor::new(
        config.compositor_settings(),
        config.descriptors(),
        Arc::new(SchemeBackend::new()),
    )
    .unwrap();
    compositor.start().unwrap();

    let mut seen_red_blue = false;
    assert!(poll_until(Duration::from_secs(5), || {
        while let Some(frame) = compositor.get_frame() {
            assert_eq!((frame.width(), frame.height()), (640, 360));
            seen_red_blue |= is_red_blue(&frame);
        }
        seen_red_blue
    }));

    compositor.stop();
    assert!(compositor.stats().composed > 0);
}
