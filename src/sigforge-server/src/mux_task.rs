// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dedicated multiplexer thread and the async handle used to manage it.
//!
//! The thread owns the [`Multiplexer`] outright. A separate reader thread
//! owns the IQ source and feeds frames through a short bounded queue, so a
//! stalled source never delays management commands. Commands are drained
//! between frames: a command acknowledged to the caller is in effect for
//! the next frame.

use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use sigforge_core::{DynResult, IqFrame, MultiplexerStatus, ReceiverConfig, ReceiverStatus};
use sigforge_dsp::{DspError, Multiplexer, MultiplexerListener};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::source::IqSource;

const MUX_COMMAND_CHANNEL_BUFFER: usize = 32;
/// Frames buffered between the reader and the multiplexer.
const SOURCE_QUEUE_FRAMES: usize = 4;
/// Longest wait for a frame before queued commands are serviced.
const COMMAND_POLL: Duration = Duration::from_millis(20);
/// Poll interval while the source is exhausted.
const IDLE_POLL: Duration = Duration::from_millis(50);
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

pub enum MuxCommand {
    AddReceiver {
        config: ReceiverConfig,
        reply: oneshot::Sender<Result<ReceiverStatus, DspError>>,
    },
    RemoveReceiver {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    RetuneReceiver {
        id: String,
        freq_hz: u64,
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<MultiplexerStatus>,
    },
}

/// Cloneable handle to the multiplexer thread.
#[derive(Clone)]
pub struct MuxHandle {
    tx: mpsc::Sender<MuxCommand>,
    status_rx: watch::Receiver<MultiplexerStatus>,
}

impl MuxHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> MuxCommand,
    ) -> DynResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| "multiplexer thread has stopped")?;
        Ok(rx.await.map_err(|_| "multiplexer thread dropped the request")?)
    }

    pub async fn add_receiver(&self, config: ReceiverConfig) -> DynResult<ReceiverStatus> {
        let status = self
            .request(|reply| MuxCommand::AddReceiver { config, reply })
            .await??;
        Ok(status)
    }

    pub async fn remove_receiver(&self, id: &str) -> DynResult<bool> {
        let id = id.to_string();
        self.request(|reply| MuxCommand::RemoveReceiver { id, reply })
            .await
    }

    pub async fn retune_receiver(&self, id: &str, freq_hz: u64) -> DynResult<bool> {
        let id = id.to_string();
        self.request(|reply| MuxCommand::RetuneReceiver { id, freq_hz, reply })
            .await
    }

    /// Fresh snapshot taken on the multiplexer thread.
    pub async fn status(&self) -> DynResult<MultiplexerStatus> {
        self.request(|reply| MuxCommand::Status { reply }).await
    }

    /// Snapshot published after the most recent frame.
    pub fn latest_status(&self) -> MultiplexerStatus {
        self.status_rx.borrow().clone()
    }
}

/// Wideband parameters and pacing for the read loop.
#[derive(Debug, Clone, Copy)]
pub struct MuxLoopConfig {
    pub center_freq_hz: u64,
    pub sample_rate: u32,
    pub frame_samples: usize,
    pub realtime: bool,
    pub loop_file: bool,
}

/// Spawn the `sigforge-iq-read` and `sigforge-mux` threads.
///
/// Only the multiplexer thread is returned for joining. The reader may be
/// parked in a blocking read; it exits on its own once the source returns
/// and the multiplexer side is gone.
pub fn spawn_mux_thread<L>(
    mux: Multiplexer<L>,
    source: Box<dyn IqSource>,
    cfg: MuxLoopConfig,
    shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<(MuxHandle, JoinHandle<()>)>
where
    L: MultiplexerListener + Send + 'static,
{
    let (frame_tx, frame_rx) = std_mpsc::sync_channel(SOURCE_QUEUE_FRAMES);
    let reader_shutdown = shutdown_rx.clone();
    std::thread::Builder::new()
        .name("sigforge-iq-read".to_string())
        .spawn(move || run_reader_loop(source, cfg, frame_tx, reader_shutdown))?;

    let (tx, rx) = mpsc::channel(MUX_COMMAND_CHANNEL_BUFFER);
    let (status_tx, status_rx) = watch::channel(mux.status());
    let thread = std::thread::Builder::new()
        .name("sigforge-mux".to_string())
        .spawn(move || run_mux_loop(mux, cfg, frame_rx, rx, status_tx, shutdown_rx))?;
    Ok((MuxHandle { tx, status_rx }, thread))
}

fn handle_command<L: MultiplexerListener>(mux: &mut Multiplexer<L>, cmd: MuxCommand) {
    match cmd {
        MuxCommand::AddReceiver { config, reply } => {
            let _ = reply.send(mux.add_receiver(config));
        }
        MuxCommand::RemoveReceiver { id, reply } => {
            let _ = reply.send(mux.remove_receiver(&id));
        }
        MuxCommand::RetuneReceiver { id, freq_hz, reply } => {
            let _ = reply.send(mux.retune_receiver(&id, freq_hz));
        }
        MuxCommand::Status { reply } => {
            let _ = reply.send(mux.status());
        }
    }
}

/// Apply every queued command. Returns `false` once all handles are gone.
fn drain_commands<L: MultiplexerListener>(
    mux: &mut Multiplexer<L>,
    rx: &mut mpsc::Receiver<MuxCommand>,
) -> bool {
    loop {
        match rx.try_recv() {
            Ok(cmd) => handle_command(mux, cmd),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// What the reader thread hands to the multiplexer thread.
enum SourceEvent {
    Frame { samples: Vec<f32>, timestamp_ms: u64 },
    /// End of input, and the source restarted from the beginning.
    Rewound,
    /// End of input for good.
    Exhausted,
}

/// Blocking read loop. Paces frames to the sample rate when `realtime`.
fn run_reader_loop(
    mut source: Box<dyn IqSource>,
    cfg: MuxLoopConfig,
    frame_tx: std_mpsc::SyncSender<SourceEvent>,
    shutdown_rx: watch::Receiver<bool>,
) {
    let frame_duration =
        Duration::from_secs_f64(cfg.frame_samples as f64 / f64::from(cfg.sample_rate.max(1)));
    let mut deadline = Instant::now();

    while !*shutdown_rx.borrow() {
        let mut buf = vec![0.0_f32; cfg.frame_samples * 2];
        let n = match source.read_into(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("IQ source read error: {}; retrying", e);
                std::thread::sleep(READ_ERROR_BACKOFF);
                continue;
            }
        };

        if n == 0 {
            let rewound = cfg.loop_file
                && source.rewind().unwrap_or_else(|e| {
                    error!("{}", e);
                    false
                });
            let event = if rewound {
                SourceEvent::Rewound
            } else {
                SourceEvent::Exhausted
            };
            if frame_tx.send(event).is_err() || !rewound {
                break;
            }
            deadline = Instant::now();
            continue;
        }

        buf.truncate(n);
        let event = SourceEvent::Frame {
            samples: buf,
            timestamp_ms: now_ms(),
        };
        if frame_tx.send(event).is_err() {
            break;
        }

        if cfg.realtime {
            deadline += frame_duration;
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            } else if now - deadline > frame_duration * 8 {
                // Too far behind to catch up; restart pacing from now.
                deadline = now;
            }
        }
    }
    debug!("IQ reader stopped");
}

/// The fan-out loop. Runs until shutdown is signalled.
fn run_mux_loop<L: MultiplexerListener>(
    mut mux: Multiplexer<L>,
    cfg: MuxLoopConfig,
    frame_rx: std_mpsc::Receiver<SourceEvent>,
    mut cmd_rx: mpsc::Receiver<MuxCommand>,
    status_tx: watch::Sender<MultiplexerStatus>,
    shutdown_rx: watch::Receiver<bool>,
) {
    let mut commands_open = true;
    let mut exhausted = false;

    mux.connect(cfg.center_freq_hz, cfg.sample_rate);
    status_tx.send_replace(mux.status());

    while !*shutdown_rx.borrow() {
        if commands_open {
            commands_open = drain_commands(&mut mux, &mut cmd_rx);
        }

        if exhausted {
            status_tx.send_replace(mux.status());
            std::thread::sleep(IDLE_POLL);
            continue;
        }

        match frame_rx.recv_timeout(COMMAND_POLL) {
            Ok(SourceEvent::Frame {
                samples,
                timestamp_ms,
            }) => {
                let frame =
                    IqFrame::new(&samples, cfg.sample_rate, cfg.center_freq_hz, timestamp_ms);
                mux.process_frame(&frame);
            }
            Ok(SourceEvent::Rewound) => {
                mux.disconnect();
                info!("IQ source rewound");
                mux.connect(cfg.center_freq_hz, cfg.sample_rate);
            }
            Ok(SourceEvent::Exhausted) | Err(RecvTimeoutError::Disconnected) => {
                mux.disconnect();
                info!("IQ source exhausted");
                exhausted = true;
            }
            Err(RecvTimeoutError::Timeout) => continue,
        }
        status_tx.send_replace(mux.status());
    }

    mux.disconnect();
    status_tx.send_replace(mux.status());
    info!("Multiplexer thread stopped");
}
