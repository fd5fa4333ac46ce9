use argh::FromArgs;
use proxyview::capture::SchemeBackend;
use proxyview::config::Config;
use proxyview::{Compositor, FramePacer};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(FromArgs)]
/// Compose several camera feeds into one proxy view
struct Args {
    /// path to the configuration file
    #[argh(
        option,
        short = 'c',
        default = "String::from(\"configs/proxyview.yaml\")"
    )]
    config: String,

    /// log level filter (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    log_level: String,
}

const STATS_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(args.log_level.as_str());
    env_logger::init_from_env(env);

    // Load configuration
    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load config from '{}': {}", args.config, e);
            std::process::exit(1);
        }
    };

    log::info!(
        "Loaded configuration with {} cameras, output {}x{} @ {} fps",
        config.descriptors().len(),
        config.output.width,
        config.output.height,
        config.output.fps
    );
    for (i, descriptor) in config.descriptors().iter().enumerate() {
        log::debug!("Camera {}: {}", i, descriptor);
    }
    if let Some(pipeline) = &config.output.pipeline {
        log::info!("Output '{}': {}", config.output.path, pipeline);
    }

    let compositor = Compositor::new(
        config.compositor_settings(),
        config.descriptors(),
        Arc::new(SchemeBackend::new()),
    )?;
    let mut pacer = FramePacer::new(config.output.fps)?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = flume::bounded::<()>(1);

    // Set up Ctrl+C handler
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, shutting down gracefully...");
        let _ = shutdown_tx.try_send(());
    })?;

    compositor.start()?;

    let mut deadline = Instant::now();
    let mut next_report = deadline + STATS_INTERVAL;
    let (mut fresh, mut reused) = (0u64, 0u64);

    loop {
        match shutdown_rx.recv_deadline(deadline) {
            Err(flume::RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => break,
        }
        deadline += pacer.frame_duration();

        if let Some(paced) = pacer.next(compositor.get_frame()) {
            if paced.reused {
                reused += 1;
            } else {
                fresh += 1;
            }
            log::trace!(
                "Frame {} pts={:?} {:?}",
                paced.number,
                paced.pts,
                paced.frame
            );
        }

        let now = Instant::now();
        if now >= next_report {
            let stats = compositor.stats();
            log::info!(
                "Delivered {} fresh / {} reused frames; composed={} dropped={} failed={}; connected={}",
                fresh,
                reused,
                stats.composed,
                stats.dropped,
                stats.failed,
                compositor.is_connected()
            );
            for (reader, source) in compositor.sources().iter().zip(compositor.source_stats()) {
                log::debug!(
                    "[{}] connected={} read={} dropped={} failures={}",
                    reader.name(),
                    reader.is_connected(),
                    source.frames_read,
                    source.frames_dropped,
                    source.read_failures
                );
            }
            fresh = 0;
            reused = 0;
            next_report = now + STATS_INTERVAL;
        }

        // Fell behind: skip the missed slots instead of bursting.
        if deadline < now {
            deadline = now;
        }
    }

    compositor.stop();
    log::info!("Delivered {} frames in total, exiting", pacer.delivered());

    Ok(())
}
