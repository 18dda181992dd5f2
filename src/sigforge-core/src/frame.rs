// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Frame types crossing the channelizer boundary.

use serde::{Deserialize, Serialize};

/// One block of wideband IQ delivered by the sample source.
///
/// `samples` holds interleaved `I, Q, I, Q, ...` 32-bit floats. The frame is
/// borrowed for the duration of a single fan-out pass and is never retained
/// by any consumer.
#[derive(Debug, Clone, Copy)]
pub struct IqFrame<'a> {
    pub samples: &'a [f32],
    /// Wideband sample rate (Hz).
    pub sample_rate: u32,
    /// Frequency the shared radio is tuned to (Hz).
    pub center_freq_hz: u64,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl<'a> IqFrame<'a> {
    pub fn new(samples: &'a [f32], sample_rate: u32, center_freq_hz: u64, timestamp_ms: u64) -> Self {
        Self {
            samples,
            sample_rate,
            center_freq_hz,
            timestamp_ms,
        }
    }

    /// Number of complete I/Q pairs. A trailing unpaired float is ignored.
    pub fn pair_count(&self) -> usize {
        self.samples.len() / 2
    }

    /// Iterate `(i, q)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (f32, f32)> + 'a {
        self.samples.chunks_exact(2).map(|pair| (pair[0], pair[1]))
    }

    /// Real-time duration of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.pair_count() as f64 / f64::from(self.sample_rate)
    }
}

/// Wideband magnitude spectrum, DC at `fft_size / 2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumFrame {
    pub magnitudes_db: Vec<f32>,
    pub center_freq_hz: u64,
    pub sample_rate: u32,
    pub fft_size: usize,
    pub timestamp_ms: u64,
}

impl SpectrumFrame {
    /// Index and level of the strongest bin.
    pub fn peak(&self) -> Option<(usize, f32)> {
        self.magnitudes_db
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Absolute frequency (Hz) at the centre of bin `idx`.
    pub fn bin_freq_hz(&self, idx: usize) -> f64 {
        if self.fft_size == 0 {
            return self.center_freq_hz as f64;
        }
        let bin_width = f64::from(self.sample_rate) / self.fft_size as f64;
        self.center_freq_hz as f64 + (idx as f64 - (self.fft_size / 2) as f64) * bin_width
    }
}

/// Demodulated PCM produced by one virtual receiver for one input frame.
///
/// Samples are nominally within `[-1, 1]` but are not clamped; AM envelope
/// output in particular may exceed that range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFrame {
    pub receiver_id: String,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
    pub timestamp_ms: u64,
}
