// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod audio_out;
mod config;
mod mux_task;
mod reload;
mod source;
mod status_log;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use sigforge_app::{init_logging, parse_hz, ConfigFile};
use sigforge_core::{format_mhz, DynResult};
use sigforge_dsp::{ChannelListener, Multiplexer};

use audio_out::PcmSinks;
use config::{ReceiverEntry, SampleFormat, ServerConfig, SourceKind};
use mux_task::{spawn_mux_thread, MuxHandle, MuxLoopConfig};
use reload::ReloadAction;

/// Upper bound on each shutdown step that needs the multiplexer thread.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - wideband channelizer daemon");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Wideband centre frequency (e.g. 153350000 or 153.35M)
    #[arg(long = "center", value_name = "FREQ")]
    center: Option<String>,
    /// Wideband sample rate (e.g. 2048000 or 2.048M)
    #[arg(long = "rate", value_name = "RATE")]
    rate: Option<String>,
    /// Read IQ from a file or FIFO; `-` reads stdin
    #[arg(short = 'i', long = "input", value_name = "PATH")]
    input: Option<PathBuf>,
    /// Sample layout of --input
    #[arg(short = 'f', long = "format", value_enum)]
    format: Option<FormatArg>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Cf32,
    Cu8,
}

/// Fold command-line overrides into the file configuration.
fn apply_cli_overrides(cli: &Cli, cfg: &mut ServerConfig) -> DynResult<()> {
    if let Some(center) = cli.center.as_deref() {
        cfg.wideband.center_freq_hz =
            parse_hz(center).ok_or_else(|| format!("Invalid --center '{}'", center))?;
    }
    if let Some(rate) = cli.rate.as_deref() {
        let hz = parse_hz(rate).ok_or_else(|| format!("Invalid --rate '{}'", rate))?;
        cfg.wideband.sample_rate =
            u32::try_from(hz).map_err(|_| format!("--rate '{}' is out of range", rate))?;
    }
    if let Some(input) = cli.input.as_ref() {
        cfg.source.kind = SourceKind::File;
        cfg.source.path = Some(input.clone());
    }
    if let Some(format) = cli.format {
        cfg.source.format = match format {
            FormatArg::Cf32 => SampleFormat::Cf32,
            FormatArg::Cu8 => SampleFormat::Cu8,
        };
    }
    if cli.log_level.is_some() {
        cfg.general.log_level = cli.log_level.clone();
    }
    Ok(())
}

/// Register one configured receiver and start its PCM sink if it has an
/// output.
async fn start_receiver(
    mux_handle: &MuxHandle,
    entry: &ReceiverEntry,
    listener: &ChannelListener,
    sinks: &mut PcmSinks,
) -> DynResult<()> {
    let audio_rx = listener.subscribe_audio();
    mux_handle.add_receiver(entry.receiver_config()).await?;
    if let Some(path) = entry.output.clone() {
        sinks.start(&entry.id, path, audio_rx);
    }
    Ok(())
}

/// Apply the difference between `current` and `next` and return the
/// receiver set that is actually running afterwards.
///
/// A failed removal keeps the old entry; a failed add leaves the entry out,
/// so the next reload tries it again.
async fn apply_reload(
    mux_handle: &MuxHandle,
    listener: &ChannelListener,
    sinks: &mut PcmSinks,
    current: &[ReceiverEntry],
    next: &[ReceiverEntry],
) -> Vec<ReceiverEntry> {
    let mut running = current.to_vec();
    for action in reload::plan_reload(current, next) {
        match action {
            ReloadAction::Remove(id) => match mux_handle.remove_receiver(&id).await {
                Ok(_) => {
                    sinks.stop(&id);
                    running.retain(|entry| entry.id != id);
                }
                Err(e) => error!("Failed to remove receiver {}: {}", id, e),
            },
            ReloadAction::Retune { id, freq_hz } => {
                match mux_handle.retune_receiver(&id, freq_hz).await {
                    Ok(true) => {
                        if let Some(entry) = running.iter_mut().find(|entry| entry.id == id) {
                            entry.center_freq_hz = freq_hz;
                        }
                    }
                    Ok(false) => warn!("Receiver {} is not running, retune skipped", id),
                    Err(e) => error!("Failed to retune receiver {}: {}", id, e),
                }
            }
            ReloadAction::Add(entry) => {
                match start_receiver(mux_handle, &entry, listener, sinks).await {
                    Ok(()) => running.push(entry),
                    Err(e) => error!("Failed to add receiver {}: {}", entry.id, e),
                }
            }
        }
    }
    running
}

/// Re-read the configuration for a SIGHUP. Only `[[receivers]]` is applied;
/// wideband and source changes need a restart.
fn reload_receivers(cli: &Cli, running: &ServerConfig) -> DynResult<Vec<ReceiverEntry>> {
    let (mut cfg, _) = ServerConfig::load(cli.config.as_deref())?;
    apply_cli_overrides(cli, &mut cfg)?;
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;
    if cfg.wideband.center_freq_hz != running.wideband.center_freq_hz
        || cfg.wideband.sample_rate != running.wideband.sample_rate
    {
        warn!("Wideband changes are ignored until restart");
    }
    Ok(cfg.receivers)
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = ServerConfig::load(cli.config.as_deref())?;
    apply_cli_overrides(&cli, &mut cfg)?;
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }
    info!(
        "Starting sigforge-server ({} @ {} S/s, FFT {} every {} frame(s), {} receiver(s))",
        format_mhz(cfg.wideband.center_freq_hz),
        cfg.wideband.sample_rate,
        cfg.wideband.fft_size,
        cfg.wideband.fft_throttle,
        cfg.receivers.len()
    );

    let source = source::build_source(&cfg.source, cfg.wideband.sample_rate)?;
    let listener = ChannelListener::new();
    let mux = Multiplexer::new(cfg.wideband.mux_config(), listener.clone())?;

    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    task_handles.push(tokio::spawn(status_log::run_event_trace(
        listener.subscribe_status(),
        shutdown_rx.clone(),
    )));

    let loop_cfg = MuxLoopConfig {
        center_freq_hz: cfg.wideband.center_freq_hz,
        sample_rate: cfg.wideband.sample_rate,
        frame_samples: cfg.wideband.frame_samples,
        realtime: cfg.source.realtime,
        loop_file: cfg.source.loop_file,
    };
    let (mux_handle, mux_thread) = spawn_mux_thread(mux, source, loop_cfg, shutdown_rx.clone())?;

    let mut sinks = PcmSinks::new();
    for entry in &cfg.receivers {
        start_receiver(&mux_handle, entry, &listener, &mut sinks).await?;
    }
    let mut receivers = cfg.receivers.clone();

    if cfg.general.status_interval_secs > 0 {
        task_handles.push(tokio::spawn(status_log::run_status_log(
            mux_handle.clone(),
            listener.subscribe_spectrum(),
            Duration::from_secs(cfg.general.status_interval_secs),
            shutdown_rx.clone(),
        )));
    }

    let mut hangup_rx = reload::hangup_signal()?;
    loop {
        tokio::select! {
            res = signal::ctrl_c() => {
                res?;
                info!("Ctrl+C received, shutting down");
                break;
            }
            _ = reload::hangup(&mut hangup_rx) => {
                info!("SIGHUP received, reloading receivers");
                match reload_receivers(&cli, &cfg) {
                    Ok(next) => {
                        receivers =
                            apply_reload(&mux_handle, &listener, &mut sinks, &receivers, &next)
                                .await;
                    }
                    Err(e) => error!("Reload failed, keeping current receivers: {}", e),
                }
            }
        }
    }

    for entry in &receivers {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, mux_handle.remove_receiver(&entry.id)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Failed to stop receiver {}: {}", entry.id, e),
            Err(_) => {
                warn!("Multiplexer not responding, skipping receiver teardown");
                break;
            }
        }
    }
    let final_status = tokio::time::timeout(SHUTDOWN_TIMEOUT, mux_handle.status())
        .await
        .ok()
        .and_then(|res| res.ok());

    let _ = shutdown_tx.send(true);
    if !sinks.is_empty() {
        info!("Stopping {} PCM sink(s)", sinks.len());
    }
    task_handles.extend(sinks.shutdown());
    tokio::time::sleep(Duration::from_millis(400)).await;

    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }

    let join = tokio::task::spawn_blocking(move || mux_thread.join());
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, join).await {
        Ok(Ok(Ok(()))) => {}
        Ok(_) => error!("Multiplexer thread did not exit cleanly"),
        Err(_) => warn!("Multiplexer thread still running at exit"),
    }
    let status = final_status.unwrap_or_else(|| mux_handle.latest_status());
    info!("{}", status_log::format_summary(&status, None));
    Ok(())
}
