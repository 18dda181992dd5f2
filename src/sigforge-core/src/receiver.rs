// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default FIR length for a virtual receiver's channel filter.
pub const DEFAULT_FIR_TAPS: usize = 65;

/// Demodulation mode of a virtual receiver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DemodMode {
    NFM,
    AM,
    USB,
    LSB,
    CW,
    RAW,
}

impl DemodMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NFM => "NFM",
            Self::AM => "AM",
            Self::USB => "USB",
            Self::LSB => "LSB",
            Self::CW => "CW",
            Self::RAW => "RAW",
        }
    }
}

impl fmt::Display for DemodMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DemodMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NFM" | "FM" => Ok(Self::NFM),
            "AM" => Ok(Self::AM),
            "USB" => Ok(Self::USB),
            "LSB" => Ok(Self::LSB),
            "CW" => Ok(Self::CW),
            "RAW" | "IQ" => Ok(Self::RAW),
            other => Err(format!("unknown demodulation mode '{}'", other)),
        }
    }
}

fn default_fir_taps() -> usize {
    DEFAULT_FIR_TAPS
}

/// Configuration of one virtual receiver.
///
/// Only `center_freq_hz` may change after creation, and only through retune.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiverConfig {
    pub id: String,
    pub center_freq_hz: u64,
    /// Channel bandwidth (Hz); the low-pass cutoff is half of this.
    pub bandwidth_hz: u32,
    /// PCM output rate (Hz).
    pub output_rate: u32,
    pub mode: DemodMode,
    /// Tag naming the downstream decoder fed by this receiver (e.g. "pocsag").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Channel filter length; must be odd.
    #[serde(default = "default_fir_taps")]
    pub fir_taps: usize,
}

impl ReceiverConfig {
    pub fn new(
        id: impl Into<String>,
        center_freq_hz: u64,
        bandwidth_hz: u32,
        output_rate: u32,
        mode: DemodMode,
    ) -> Self {
        Self {
            id: id.into(),
            center_freq_hz,
            bandwidth_hz,
            output_rate,
            mode,
            decoder: None,
            label: None,
            fir_taps: DEFAULT_FIR_TAPS,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_decoder(mut self, decoder: impl Into<String>) -> Self {
        self.decoder = Some(decoder.into());
        self
    }

    pub fn with_fir_taps(mut self, taps: usize) -> Self {
        self.fir_taps = taps;
        self
    }

    /// Label if set, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// Lifecycle state of a virtual receiver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ReceiverState {
    #[default]
    Unconfigured,
    Configured,
    Stopped,
}

/// Side-effect-free snapshot of one receiver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiverStatus {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder: Option<String>,
    pub mode: DemodMode,
    pub center_freq_hz: u64,
    pub bandwidth_hz: u32,
    pub output_rate: u32,
    pub offset_hz: i64,
    pub decimation: usize,
    pub fir_taps: usize,
    pub state: ReceiverState,
    pub active: bool,
    /// Non-finite demodulator outputs replaced by zero.
    pub faults: u64,
    pub samples_emitted: u64,
}
