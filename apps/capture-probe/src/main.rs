//! Capture Probe
//!
//! Exercises backend selection and the capture loop against an existing
//! window, without a renderer.

mod cli;
mod probe;

use anyhow::{Context, bail};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use capture::{Platform, preferred_order};
use cli::{Command, Options};
use coordinator::{Coordinator, CoordinatorConfig};
use probe::{ProbeSink, StaticWindow, encode_ppm};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("capture=debug".parse()?)
                .add_directive("coordinator=debug".parse()?)
                .add_directive("capture_probe=debug".parse()?),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, options) = match cli::parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => bail!("{}", e),
    };

    let config = match &options.config {
        Some(path) => CoordinatorConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CoordinatorConfig::default(),
    };

    match command {
        Command::Backends => backends(&options, &config),
        Command::Grab => grab(&options, &config),
        Command::Run => run(&options, config),
    }
}

fn backends(options: &Options, config: &CoordinatorConfig) -> anyhow::Result<()> {
    let platform = Platform::current();
    let order: Vec<String> = preferred_order(platform)
        .iter()
        .map(|kind| kind.to_string())
        .collect();
    info!("Platform {:?}, candidates: {}", platform, order.join(" -> "));

    let mut selected = capture::create_capture(options.window, &config.capture);
    info!(
        "Selected {} (hide around grabs: {})",
        selected.kind,
        selected.backend.needs_hide()
    );
    selected.backend.close();
    Ok(())
}

fn grab(options: &Options, config: &CoordinatorConfig) -> anyhow::Result<()> {
    let mut selected = capture::create_capture(options.window, &config.capture);
    let started = Instant::now();
    let result = selected.backend.grab(options.rect);
    selected.backend.close();

    let Some(frame) = result.context("grab failed")? else {
        warn!("{} grab of {} returned no frame", selected.kind, options.rect);
        return Ok(());
    };
    info!(
        "{} grab of {} -> {}x{} in {:?}",
        selected.kind,
        options.rect,
        frame.width,
        frame.height,
        started.elapsed()
    );

    if let Some(path) = &options.out {
        std::fs::write(path, encode_ppm(&frame))
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn run(options: &Options, config: CoordinatorConfig) -> anyhow::Result<()> {
    let window = StaticWindow::new(options.window, options.rect);
    let mut coordinator = Coordinator::for_overlay(Box::new(window), ProbeSink::default(), config);

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    let duration = Duration::from_secs_f64(options.seconds);
    std::thread::Builder::new()
        .name("probe-timer".into())
        .spawn(move || {
            std::thread::sleep(duration);
            let _ = stop_tx.send(());
        })
        .context("spawning probe timer")?;

    let started = Instant::now();
    coordinator.run(&stop_rx);
    let elapsed = started.elapsed().as_secs_f64();

    let stats = coordinator.stats();
    let sink = coordinator.sink();
    info!(
        "{} backend: {} frames in {:.1}s ({:.1} fps, {} redraws), {} empty, {} errors, {} hide cycles",
        coordinator.backend_kind(),
        sink.frames,
        elapsed,
        sink.frames as f64 / elapsed.max(f64::EPSILON),
        sink.redraws,
        stats.empty_grabs,
        stats.grab_errors,
        stats.hide_cycles
    );
    if let Some(frame) = &sink.last {
        info!("Last frame {}x{}", frame.width, frame.height);
    }

    if let (Some(path), Some(frame)) = (&options.out, &sink.last) {
        std::fs::write(path, encode_ppm(frame))
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}
