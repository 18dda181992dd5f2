// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use num_complex::Complex;
use sigforge_core::DemodMode;

/// Per-sample demodulator operating on filtered, decimated baseband IQ.
///
/// SSB and AM are deliberately simple: no Hilbert sideband separation and
/// no DC removal on the envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Demodulator {
    /// Quadrature discriminator; holds the previous filtered sample.
    Nfm { prev: Complex<f32> },
    /// Raw envelope `|s|`.
    Am,
    /// In-phase component.
    Usb,
    /// Quadrature component.
    Lsb,
    /// In-phase component (CW and RAW).
    Passthrough,
}

impl Demodulator {
    pub fn for_mode(mode: DemodMode) -> Self {
        match mode {
            DemodMode::NFM => Self::Nfm {
                prev: Complex::new(0.0, 0.0),
            },
            DemodMode::AM => Self::Am,
            DemodMode::USB => Self::Usb,
            DemodMode::LSB => Self::Lsb,
            DemodMode::CW | DemodMode::RAW => Self::Passthrough,
        }
    }

    /// Forget discriminator history.
    pub fn reset(&mut self) {
        if let Self::Nfm { prev } = self {
            *prev = Complex::new(0.0, 0.0);
        }
    }

    /// Demodulate one filtered baseband sample.
    #[inline]
    pub fn demodulate(&mut self, sample: Complex<f32>) -> f32 {
        match self {
            Self::Nfm { prev } => {
                let (i, q) = (sample.re, sample.im);
                let y = q * prev.re - i * prev.im;
                let x = i * prev.re + q * prev.im;
                *prev = sample;
                y.atan2(x) * std::f32::consts::FRAC_1_PI
            }
            Self::Am => (sample.re * sample.re + sample.im * sample.im).sqrt(),
            Self::Usb | Self::Passthrough => sample.re,
            Self::Lsb => sample.im,
        }
    }

    /// Demodulate a block of baseband IQ samples.
    pub fn demodulate_block(&mut self, samples: &[Complex<f32>]) -> Vec<f32> {
        samples.iter().map(|&s| self.demodulate(s)).collect()
    }
}
