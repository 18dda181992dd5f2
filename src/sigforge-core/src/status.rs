// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};

use crate::receiver::ReceiverStatus;

/// Aggregate snapshot of the multiplexer and every live receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MultiplexerStatus {
    pub connected: bool,
    pub center_freq_hz: u64,
    pub sample_rate: u32,
    pub fft_size: usize,
    pub fft_throttle: usize,
    /// Spectrum updates per second at the current sample rate.
    pub spectrum_rate_hz: f64,
    pub frames_processed: u64,
    /// Frames whose processing took longer than their real-time duration.
    pub overruns: u64,
    /// Sum of all receivers' fault counters.
    pub faults: u64,
    pub receivers: Vec<ReceiverStatus>,
}

impl MultiplexerStatus {
    pub fn receiver(&self, id: &str) -> Option<&ReceiverStatus> {
        self.receivers.iter().find(|r| r.id == id)
    }
}

/// Lifecycle notification emitted by the multiplexer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum StatusEvent {
    Connected { center_freq_hz: u64, sample_rate: u32 },
    Disconnected,
    /// The shared radio was retuned or resampled by the source.
    WidebandChanged { center_freq_hz: u64, sample_rate: u32 },
    ReceiverAdded(ReceiverStatus),
    ReceiverRemoved { id: String },
    ReceiverRetuned(ReceiverStatus),
}
