// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use num_complex::Complex;
use sigforge_core::{IqFrame, SpectrumFrame};

use crate::error::DspError;
use crate::fft::{blackman_harris, Fft};

/// Amplitude floor applied before taking the log.
pub const MAGNITUDE_FLOOR: f32 = 1e-10;

/// Throttled wideband spectrum: every `throttle`-th frame is windowed,
/// transformed and converted to shifted dB magnitudes.
#[derive(Debug, Clone)]
pub struct SpectrumEngine {
    fft: Fft,
    window: Vec<f32>,
    throttle: usize,
    counter: usize,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumEngine {
    pub fn new(fft_size: usize, throttle: usize) -> Result<Self, DspError> {
        if throttle == 0 {
            return Err(DspError::Throttle);
        }
        let fft = Fft::new(fft_size)?;
        let window = blackman_harris(fft_size)
            .into_iter()
            .map(|w| w as f32)
            .collect();
        Ok(Self {
            fft,
            window,
            throttle,
            counter: 0,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft.size()
    }

    pub fn throttle(&self) -> usize {
        self.throttle
    }

    /// Spectrum updates per second at `sample_rate`.
    pub fn update_rate_hz(&self, sample_rate: u32) -> f64 {
        f64::from(sample_rate) / (self.fft.size() * self.throttle) as f64
    }

    /// Count one incoming frame; transform it if the throttle fires.
    ///
    /// Frames shorter than the FFT size still count toward the throttle but
    /// produce no spectrum.
    pub fn on_frame(&mut self, frame: &IqFrame<'_>) -> Option<SpectrumFrame> {
        self.counter += 1;
        if self.counter < self.throttle {
            return None;
        }
        self.counter = 0;
        self.compute(frame)
    }

    /// Transform the first `fft_size` pairs of `frame` unconditionally.
    pub fn compute(&mut self, frame: &IqFrame<'_>) -> Option<SpectrumFrame> {
        let n = self.fft.size();
        if frame.pair_count() < n {
            return None;
        }

        for ((slot, (i, q)), w) in self
            .scratch
            .iter_mut()
            .zip(frame.pairs())
            .zip(self.window.iter())
        {
            *slot = Complex::new(i * w, q * w);
        }
        self.fft.process(&mut self.scratch);

        let half = n / 2;
        let scale = 1.0 / n as f32;
        let magnitudes_db = self.scratch[half..]
            .iter()
            .chain(self.scratch[..half].iter())
            .map(|bin| 20.0 * (bin.norm() * scale).max(MAGNITUDE_FLOOR).log10())
            .collect();

        Some(SpectrumFrame {
            magnitudes_db,
            center_freq_hz: frame.center_freq_hz,
            sample_rate: frame.sample_rate,
            fft_size: n,
            timestamp_ms: frame.timestamp_ms,
        })
    }
}
