//! CurveBug Tracer - Main Entry Point
//!
//! Headless runner: connects to the tracer, keeps the acquisition loop going
//! and logs the status line once a second. Operator keys are read from stdin,
//! one per line:
//!
//! - `space` (or empty line) - cycle excitation mode
//! - `p` pause/resume, `s` single channel, `a` auto-scale
//! - `f` fit to window, `r` reset view
//! - `q` quit
//!
//! Usage: `curvebug [--config PATH] [--port PORT] [--frames N] [--mock]`

use anyhow::Context;
use curvebug_rs::{
    backend::{SerialLink, TracerLink},
    config::{AppState, TracerConfig},
    BackendCommand, BackendMessage, TracerBackend, TracerCommand,
};
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,curvebug_rs=debug";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    port: Option<String>,
    frames: Option<u64>,
    mock: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().context("--config needs a path")?.into()),
            "--port" => args.port = Some(iter.next().context("--port needs a name")?),
            "--frames" => {
                let n = iter.next().context("--frames needs a count")?;
                args.frames = Some(n.parse().with_context(|| format!("bad frame count {}", n))?);
            }
            "--mock" => args.mock = true,
            other => anyhow::bail!("unknown argument {}", other),
        }
    }
    Ok(args)
}

/// Install the fmt layer, plus a daily rolling file when configured
///
/// The returned guard must live until exit so buffered file output is flushed.
fn init_logging(config: &TracerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.logging.filter.as_deref().unwrap_or(DEFAULT_FILTER))
    });

    match &config.logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "curvebug.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

fn key_command(line: &str) -> Option<TracerCommand> {
    match line.trim() {
        "" | "space" => Some(TracerCommand::CycleExcitationMode),
        "p" => Some(TracerCommand::TogglePause),
        "s" => Some(TracerCommand::ToggleSingleChannel),
        "a" => Some(TracerCommand::ToggleAutoScale),
        "f" => Some(TracerCommand::FitToWindow),
        "r" => Some(TracerCommand::ResetView),
        _ => None,
    }
}

/// Forward stdin keys to the backend until `q` or end of input
fn spawn_key_reader(commands: Sender<BackendCommand>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(Result::ok) {
            if line.trim() == "q" {
                break;
            }
            match key_command(&line) {
                Some(cmd) => {
                    if commands.send(BackendCommand::Apply(cmd)).is_err() {
                        return;
                    }
                }
                None => tracing::warn!("Unknown key {:?}", line.trim()),
            }
        }
        let _ = commands.send(BackendCommand::Shutdown);
    });
}

#[cfg(feature = "mock-tracer")]
fn mock_link() -> anyhow::Result<Box<dyn TracerLink>> {
    Ok(Box::new(curvebug_rs::backend::MockTracerLink::new()))
}

#[cfg(not(feature = "mock-tracer"))]
fn mock_link() -> anyhow::Result<Box<dyn TracerLink>> {
    anyhow::bail!("--mock needs the mock-tracer feature")
}

fn make_link(
    args: &Args,
    config: &TracerConfig,
    state: &AppState,
) -> anyhow::Result<Box<dyn TracerLink>> {
    if args.mock {
        return mock_link();
    }
    Ok(Box::new(
        SerialLink::new(config.serial.clone()).with_preferred_port(state.last_port.clone()),
    ))
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let config_path = args.config.clone().or_else(TracerConfig::default_path);
    let mut config = TracerConfig::load_or_default(config_path.as_ref());
    let _log_guard = init_logging(&config);

    tracing::info!("Starting CurveBug tracer");
    if let Some(path) = &config_path {
        tracing::debug!("Config path {:?}", path);
    }

    let mut app_state = AppState::load_or_default();
    if let Some(mode) = app_state.last_mode {
        config.acquisition.initial_mode = mode;
    }

    let link = make_link(&args, &config, &app_state)?;
    let (backend, frontend) = TracerBackend::with_link(config.clone(), link);
    let backend_handle = std::thread::spawn(move || backend.run());

    frontend.connect(args.port.clone());
    spawn_key_reader(frontend.command_sender.clone());

    let mut fps = 0.0;
    let mut last_status = Instant::now();
    loop {
        match frontend.receiver.recv_timeout(Duration::from_millis(250)) {
            Ok(BackendMessage::ConnectionStatus(status)) => {
                tracing::info!("{}", status.serial_banner());
            }
            Ok(BackendMessage::ConnectionError(e)) => tracing::warn!("{}", e),
            Ok(BackendMessage::PortConnected(port)) => {
                app_state.remember_port(&port);
                if let Err(e) = app_state.save() {
                    tracing::warn!("Failed to save app state: {}", e);
                }
            }
            Ok(BackendMessage::Stats(stats)) => fps = stats.effective_cycle_rate,
            Ok(BackendMessage::DecodeError(e)) => tracing::debug!("Decode error: {}", e),
            Ok(BackendMessage::Snapshot(snapshot)) => {
                if args.frames.is_some_and(|n| snapshot.frame_count >= n) {
                    frontend.shutdown();
                }
            }
            Ok(BackendMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if last_status.elapsed() >= Duration::from_secs(1) {
            let snapshot = frontend.latest_snapshot();
            tracing::info!("{}", snapshot.status_line(fps));
            for line in snapshot.statistics.info_lines() {
                tracing::info!("  {}", line);
            }
            frontend.request_stats();
            last_status = Instant::now();
        }
    }

    app_state.last_mode = Some(frontend.latest_snapshot().mode);
    if let Err(e) = app_state.save() {
        tracing::warn!("Failed to save app state: {}", e);
    }

    tracing::info!("Shutting down...");
    if backend_handle.join().is_err() {
        anyhow::bail!("acquisition thread panicked");
    }
    Ok(())
}
