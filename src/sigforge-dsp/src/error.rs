// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

/// Configuration errors rejected at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DspError {
    #[error("FIR tap count must be odd and non-zero (got {0})")]
    TapCount(usize),

    #[error("normalised cutoff must lie in (0, 0.5) (got {0})")]
    Cutoff(f64),

    #[error("FFT size must be a non-zero power of two (got {0})")]
    FftSize(usize),

    #[error("FFT throttle must be at least 1")]
    Throttle,

    #[error("receiver '{0}': bandwidth must be > 0 Hz")]
    Bandwidth(String),

    #[error("receiver '{0}': output rate must be > 0 Hz")]
    OutputRate(String),

    #[error("wideband sample rate must be > 0 Hz")]
    SampleRate,

    #[error("receiver '{0}' already exists")]
    DuplicateReceiver(String),

    #[error("receiver id must not be empty")]
    EmptyId,

    #[error("unknown receiver '{0}'")]
    UnknownReceiver(String),
}
