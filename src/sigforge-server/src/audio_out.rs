// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Raw PCM sinks feeding external decoders (e.g. `multimon-ng -t raw`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sigforge_core::AudioFrame;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Append `samples` as signed 16-bit little-endian PCM, clamped to ±1.0.
pub fn encode_s16le(samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Open a file or FIFO for writing. Blocks until a FIFO reader attaches.
pub async fn open_pcm_output(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await
}

/// Copy one receiver's audio to `writer` until stopped or the audio channel
/// closes. Returns the number of bytes written.
pub async fn run_pcm_writer<W: AsyncWrite + Unpin>(
    receiver_id: &str,
    mut writer: W,
    mut audio_rx: broadcast::Receiver<Arc<AudioFrame>>,
    mut stop_rx: watch::Receiver<bool>,
) -> std::io::Result<u64> {
    let mut scratch = Vec::new();
    let mut written = 0u64;
    loop {
        tokio::select! {
            recv = audio_rx.recv() => {
                match recv {
                    Ok(frame) if frame.receiver_id == receiver_id => {
                        scratch.clear();
                        encode_s16le(&frame.samples, &mut scratch);
                        writer.write_all(&scratch).await?;
                        written += scratch.len() as u64;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("PCM sink {}: dropped {} audio frames", receiver_id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
    writer.flush().await?;
    info!("PCM sink {} closed after {} bytes", receiver_id, written);
    Ok(written)
}

/// Open `path` and stream one receiver's PCM into it until stopped.
pub fn spawn_pcm_sink(
    receiver_id: String,
    path: PathBuf,
    audio_rx: broadcast::Receiver<Arc<AudioFrame>>,
    stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let writer = match open_pcm_output(&path).await {
            Ok(file) => file,
            Err(e) => {
                error!(
                    "PCM sink {}: cannot open {}: {}",
                    receiver_id,
                    path.display(),
                    e
                );
                return;
            }
        };
        info!("PCM sink {} -> {}", receiver_id, path.display());
        if let Err(e) = run_pcm_writer(&receiver_id, writer, audio_rx, stop_rx).await {
            error!("PCM sink {} error: {}", receiver_id, e);
        }
    })
}

struct PcmSink {
    path: PathBuf,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Running PCM sinks keyed by receiver id. Each sink has its own stop flag.
#[derive(Default)]
pub struct PcmSinks {
    sinks: HashMap<String, PcmSink>,
    /// Stopped sinks still flushing.
    retired: Vec<JoinHandle<()>>,
}

impl PcmSinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a sink for `receiver_id`, stopping any sink it already had.
    pub fn start(
        &mut self,
        receiver_id: &str,
        path: PathBuf,
        audio_rx: broadcast::Receiver<Arc<AudioFrame>>,
    ) {
        self.stop(receiver_id);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = spawn_pcm_sink(receiver_id.to_string(), path.clone(), audio_rx, stop_rx);
        self.sinks.insert(
            receiver_id.to_string(),
            PcmSink {
                path,
                stop_tx,
                task,
            },
        );
    }

    /// Stop the sink for `receiver_id`. Returns `false` if it had none.
    pub fn stop(&mut self, receiver_id: &str) -> bool {
        self.retired.retain(|task| !task.is_finished());
        let Some(sink) = self.sinks.remove(receiver_id) else {
            return false;
        };
        let _ = sink.stop_tx.send(true);
        self.retired.push(sink.task);
        true
    }

    /// Output path of the running sink for `receiver_id`.
    pub fn path(&self, receiver_id: &str) -> Option<&Path> {
        self.sinks.get(receiver_id).map(|sink| sink.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Stop every sink and hand back all tasks, including retired ones.
    pub fn shutdown(&mut self) -> Vec<JoinHandle<()>> {
        let ids: Vec<String> = self.sinks.keys().cloned().collect();
        for id in ids {
            self.stop(&id);
        }
        std::mem::take(&mut self.retired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str, samples: Vec<f32>) -> Arc<AudioFrame> {
        Arc::new(AudioFrame {
            receiver_id: id.to_string(),
            sample_rate: 22_050,
            samples,
            timestamp_ms: 0,
        })
    }

    #[test]
    fn s16le_clamps_and_scales() {
        let mut out = Vec::new();
        encode_s16le(&[0.0, 1.0, -1.0, 2.5, -7.0, 0.5], &mut out);
        let values: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(values, vec![0, 32767, -32767, 32767, -32767, 16384]);
    }

    #[tokio::test]
    async fn writer_keeps_only_its_receiver() {
        let (tx, rx) = broadcast::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tx.send(frame("pager", vec![0.5, -0.5])).unwrap();
        tx.send(frame("other", vec![1.0; 8])).unwrap();
        tx.send(frame("pager", vec![1.0])).unwrap();
        drop(tx);

        let mut sink = Vec::new();
        let written = run_pcm_writer("pager", &mut sink, rx, shutdown_rx)
            .await
            .unwrap();
        assert_eq!(written, 6);
        assert_eq!(sink.len(), 6);
        assert_eq!(i16::from_le_bytes([sink[4], sink[5]]), i16::MAX);
    }

    #[tokio::test]
    async fn sinks_restart_on_new_path_and_stop() {
        let dir = std::env::temp_dir();
        let first = dir.join(format!("sigforge-sink-a-{}.s16", std::process::id()));
        let second = dir.join(format!("sigforge-sink-b-{}.s16", std::process::id()));
        let (tx, _) = broadcast::channel::<Arc<AudioFrame>>(16);

        let mut sinks = PcmSinks::new();
        assert!(sinks.is_empty());
        sinks.start("pager", first.clone(), tx.subscribe());
        assert_eq!(sinks.path("pager"), Some(first.as_path()));

        sinks.start("pager", second.clone(), tx.subscribe());
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks.path("pager"), Some(second.as_path()));

        assert!(sinks.stop("pager"));
        assert!(!sinks.stop("pager"));
        assert!(sinks.path("pager").is_none());

        for task in sinks.shutdown() {
            task.await.unwrap();
        }
        let _ = std::fs::remove_file(first);
        let _ = std::fs::remove_file(second);
    }

    #[tokio::test]
    async fn writer_stops_on_shutdown() {
        let (_tx, rx) = broadcast::channel::<Arc<AudioFrame>>(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut sink = Vec::new();
            run_pcm_writer("pager", &mut sink, rx, shutdown_rx).await
        });
        shutdown_tx.send(true).unwrap();
        assert_eq!(task.await.unwrap().unwrap(), 0);
    }
}
