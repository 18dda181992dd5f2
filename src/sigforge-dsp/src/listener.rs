// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Typed notifications out of the multiplexer.

use std::sync::Arc;

use sigforge_core::{AudioFrame, SpectrumFrame, StatusEvent};
use tokio::sync::{broadcast, watch};

/// Receiver of multiplexer output.
///
/// All methods have default no-op implementations, so listeners can
/// selectively override only the events they care about. Calls happen
/// synchronously on the thread driving the multiplexer and must not block.
pub trait MultiplexerListener {
    /// A throttled wideband spectrum was computed.
    fn on_spectrum(&mut self, _spectrum: &SpectrumFrame) {}

    /// A receiver produced demodulated PCM for the current frame.
    fn on_receiver_audio(&mut self, _audio: &AudioFrame) {}

    /// Connection or receiver lifecycle changed.
    fn on_status_change(&mut self, _event: &StatusEvent) {}
}

/// Listener that discards everything.
impl MultiplexerListener for () {}

/// PCM broadcast capacity: enough for several frames of latency.
const AUDIO_BROADCAST_CAPACITY: usize = 256;
const STATUS_BROADCAST_CAPACITY: usize = 64;

/// Listener that republishes events on tokio channels.
///
/// Spectrum is latest-wins (`watch`); audio and status events are
/// `broadcast` so any number of consumers can subscribe. Sends never block;
/// slow subscribers observe `Lagged`.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    spectrum_tx: watch::Sender<Option<Arc<SpectrumFrame>>>,
    audio_tx: broadcast::Sender<Arc<AudioFrame>>,
    status_tx: broadcast::Sender<StatusEvent>,
}

impl Default for ChannelListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelListener {
    pub fn new() -> Self {
        let (spectrum_tx, _) = watch::channel(None);
        let (audio_tx, _) = broadcast::channel(AUDIO_BROADCAST_CAPACITY);
        let (status_tx, _) = broadcast::channel(STATUS_BROADCAST_CAPACITY);
        Self {
            spectrum_tx,
            audio_tx,
            status_tx,
        }
    }

    pub fn subscribe_spectrum(&self) -> watch::Receiver<Option<Arc<SpectrumFrame>>> {
        self.spectrum_tx.subscribe()
    }

    /// PCM from every receiver; filter on [`AudioFrame::receiver_id`].
    pub fn subscribe_audio(&self) -> broadcast::Receiver<Arc<AudioFrame>> {
        self.audio_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }
}

impl MultiplexerListener for ChannelListener {
    fn on_spectrum(&mut self, spectrum: &SpectrumFrame) {
        self.spectrum_tx.send_replace(Some(Arc::new(spectrum.clone())));
    }

    fn on_receiver_audio(&mut self, audio: &AudioFrame) {
        // No active receivers is fine.
        let _ = self.audio_tx.send(Arc::new(audio.clone()));
    }

    fn on_status_change(&mut self, event: &StatusEvent) {
        let _ = self.status_tx.send(event.clone());
    }
}
