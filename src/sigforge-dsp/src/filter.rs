// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::f64::consts::PI;

use crate::error::DspError;
use crate::fft::blackman_harris;

/// Design a Blackman-Harris windowed-sinc low-pass filter.
///
/// `cutoff_norm` is `cutoff_hz / sample_rate` and must lie strictly inside
/// `(0, 0.5)`. `tap_count` must be odd so the filter has a centre tap and
/// linear phase. The returned taps are symmetric and sum to 1.0.
pub fn design_lowpass(tap_count: usize, cutoff_norm: f64) -> Result<Vec<f64>, DspError> {
    if tap_count == 0 || tap_count % 2 == 0 {
        return Err(DspError::TapCount(tap_count));
    }
    if !cutoff_norm.is_finite() || cutoff_norm <= 0.0 || cutoff_norm >= 0.5 {
        return Err(DspError::Cutoff(cutoff_norm));
    }

    let m = (tap_count - 1) / 2;
    let window = blackman_harris(tap_count);
    let mut taps: Vec<f64> = window
        .iter()
        .enumerate()
        .map(|(n, w)| {
            let x = n as f64 - m as f64;
            let sinc = if n == m {
                2.0 * cutoff_norm
            } else {
                (2.0 * PI * cutoff_norm * x).sin() / (PI * x)
            };
            sinc * w
        })
        .collect();

    let sum: f64 = taps.iter().sum();
    let inv = 1.0 / sum;
    for tap in &mut taps {
        *tap *= inv;
    }

    // Pin exact mirror symmetry; the two halves can differ in the last ulp.
    for i in 0..m {
        let mirrored = taps[i];
        taps[tap_count - 1 - i] = mirrored;
    }
    Ok(taps)
}

/// FIR filter over a circular delay line (sample-by-sample interface).
#[derive(Debug, Clone)]
pub struct FirFilter {
    taps: Vec<f32>,
    /// Ring buffer of the last `taps.len()` inputs; `pos` is the oldest.
    delay: Vec<f32>,
    pos: usize,
}

impl FirFilter {
    pub fn new(taps: &[f64]) -> Self {
        let taps: Vec<f32> = taps.iter().map(|&t| t as f32).collect();
        let len = taps.len().max(1);
        Self {
            taps,
            delay: vec![0.0; len],
            pos: 0,
        }
    }

    /// Convenience constructor: design and wrap in one step.
    pub fn lowpass(tap_count: usize, cutoff_norm: f64) -> Result<Self, DspError> {
        Ok(Self::new(&design_lowpass(tap_count, cutoff_norm)?))
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Append one input sample to the delay line.
    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.delay[self.pos] = sample;
        self.pos += 1;
        if self.pos == self.delay.len() {
            self.pos = 0;
        }
    }

    /// Convolve the current delay-line contents with the taps.
    #[inline]
    pub fn output(&self) -> f32 {
        let (newer, older) = self.delay.split_at(self.pos);
        older
            .iter()
            .chain(newer.iter())
            .zip(self.taps.iter().rev())
            .map(|(x, h)| x * h)
            .sum()
    }

    /// Push one sample and return the filtered output.
    pub fn process(&mut self, sample: f32) -> f32 {
        self.push(sample);
        self.output()
    }

    pub fn reset(&mut self) {
        self.delay.fill(0.0);
        self.pos = 0;
    }
}
