// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Periodic receiver summaries and lifecycle event tracing.

use std::sync::Arc;
use std::time::Duration;

use sigforge_core::{format_mhz, MultiplexerStatus, ReceiverStatus, SpectrumFrame, StatusEvent};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::mux_task::MuxHandle;

pub fn format_receiver_line(rx: &ReceiverStatus) -> String {
    let name = rx.label.as_deref().unwrap_or(&rx.id);
    let mut line = format!(
        "{} [{}] {} offset={:+} Hz decim={} state={:?} samples={}",
        name,
        rx.mode,
        format_mhz(rx.center_freq_hz),
        rx.offset_hz,
        rx.decimation,
        rx.state,
        rx.samples_emitted
    );
    if rx.faults > 0 {
        line.push_str(&format!(" faults={}", rx.faults));
    }
    if let Some(decoder) = rx.decoder.as_deref() {
        line.push_str(&format!(" -> {}", decoder));
    }
    line
}

pub fn format_summary(status: &MultiplexerStatus, spectrum: Option<&SpectrumFrame>) -> String {
    let mut line = format!(
        "{} @ {} S/s, {} frame(s), {} overrun(s), spectrum {:.1}/s",
        if status.connected {
            format_mhz(status.center_freq_hz)
        } else {
            "disconnected".to_string()
        },
        status.sample_rate,
        status.frames_processed,
        status.overruns,
        status.spectrum_rate_hz
    );
    if let Some((freq_hz, db)) = spectrum.and_then(|s| s.peak().map(|p| (s.bin_freq_hz(p.0), p.1))) {
        line.push_str(&format!(", peak {:.3} MHz at {:.1} dB", freq_hz / 1e6, db));
    }
    line
}

/// Log a summary every `interval` until shutdown.
pub async fn run_status_log(
    handle: MuxHandle,
    spectrum_rx: watch::Receiver<Option<Arc<SpectrumFrame>>>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = handle.latest_status();
                let spectrum = spectrum_rx.borrow().clone();
                info!("{}", format_summary(&status, spectrum.as_deref()));
                for rx in &status.receivers {
                    info!("  {}", format_receiver_line(rx));
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// Trace every lifecycle event as JSON at debug level.
pub async fn run_event_trace(
    mut events_rx: broadcast::Receiver<StatusEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events_rx.recv() => {
                match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => debug!("event {}", json),
                        Err(e) => debug!("event {:?} ({})", event, e),
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("event trace skipped {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
