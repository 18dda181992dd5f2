// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for sigforge-server.
//!
//! Config is loaded from the `[sigforge-server]` section of `sigforge.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./sigforge.toml`
//! 3. `~/.config/sigforge/sigforge.toml`
//! 4. `/etc/sigforge/sigforge.toml`

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sigforge_app::ConfigFile;
use sigforge_core::{DemodMode, ReceiverConfig, DEFAULT_FIR_TAPS};
use sigforge_dsp::MultiplexerConfig;

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    /// Shared radio parameters and spectrum settings.
    pub wideband: WidebandConfig,
    /// Where wideband IQ comes from.
    pub source: SourceConfig,
    /// Virtual receivers created at startup.
    pub receivers: Vec<ReceiverEntry>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
    /// Seconds between receiver status summaries; 0 disables them.
    pub status_interval_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            status_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidebandConfig {
    /// Frequency the shared radio is tuned to (Hz).
    pub center_freq_hz: u64,
    /// IQ capture sample rate (Hz).
    pub sample_rate: u32,
    /// Spectrum FFT length; power of two.
    pub fft_size: usize,
    /// Compute a spectrum on every Nth frame.
    pub fft_throttle: usize,
    /// Complex samples per frame handed to the multiplexer.
    pub frame_samples: usize,
}

impl Default for WidebandConfig {
    fn default() -> Self {
        Self {
            center_freq_hz: 153_350_000,
            sample_rate: 2_048_000,
            fft_size: 2048,
            fft_throttle: 4,
            frame_samples: 16_384,
        }
    }
}

impl WidebandConfig {
    pub fn mux_config(&self) -> MultiplexerConfig {
        MultiplexerConfig {
            fft_size: self.fft_size,
            fft_throttle: self.fft_throttle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// All-zero IQ.
    Silence,
    /// Synthetic carrier, optionally FM-modulated by an audio tone.
    #[default]
    Tone,
    /// Recorded IQ from a file, FIFO or stdin.
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Interleaved little-endian f32.
    #[default]
    Cf32,
    /// Interleaved unsigned 8-bit, as written by rtl_sdr.
    Cu8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Input path for `kind = "file"`; `-` reads stdin.
    pub path: Option<PathBuf>,
    pub format: SampleFormat,
    /// Restart from the beginning at end of file.
    pub loop_file: bool,
    /// Pace frames to the sample rate instead of running flat out.
    pub realtime: bool,
    /// Carrier position relative to the wideband centre (Hz).
    pub tone_offset_hz: i64,
    pub tone_amplitude: f32,
    /// Peak FM deviation of the carrier (Hz); 0 leaves it unmodulated.
    pub tone_deviation_hz: f64,
    /// Modulating audio tone (Hz).
    pub tone_audio_hz: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Tone,
            path: None,
            format: SampleFormat::Cf32,
            loop_file: false,
            realtime: true,
            tone_offset_hz: 0,
            tone_amplitude: 0.5,
            tone_deviation_hz: 2_500.0,
            tone_audio_hz: 1_000.0,
        }
    }
}

/// One `[[receivers]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub center_freq_hz: u64,
    pub bandwidth_hz: u32,
    pub output_rate: u32,
    pub mode: DemodMode,
    /// Downstream decoder fed from `output` (informational).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoder: Option<String>,
    pub fir_taps: usize,
    /// Write s16le PCM here (file or FIFO).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl Default for ReceiverEntry {
    fn default() -> Self {
        Self {
            id: String::new(),
            label: None,
            center_freq_hz: 0,
            bandwidth_hz: 12_500,
            output_rate: 22_050,
            mode: DemodMode::NFM,
            decoder: None,
            fir_taps: DEFAULT_FIR_TAPS,
            output: None,
        }
    }
}

impl ReceiverEntry {
    pub fn receiver_config(&self) -> ReceiverConfig {
        let mut config = ReceiverConfig::new(
            self.id.clone(),
            self.center_freq_hz,
            self.bandwidth_hz,
            self.output_rate,
            self.mode,
        )
        .with_fir_taps(self.fir_taps);
        if let Some(label) = &self.label {
            config = config.with_label(label.clone());
        }
        if let Some(decoder) = &self.decoder {
            config = config.with_decoder(decoder.clone());
        }
        config
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        let wb = &self.wideband;
        if wb.center_freq_hz == 0 {
            return Err("[wideband].center_freq_hz must be > 0".to_string());
        }
        if wb.sample_rate == 0 {
            return Err("[wideband].sample_rate must be > 0".to_string());
        }
        if wb.fft_size == 0 || !wb.fft_size.is_power_of_two() {
            return Err(format!(
                "[wideband].fft_size must be a power of two (got {})",
                wb.fft_size
            ));
        }
        if wb.fft_throttle == 0 {
            return Err("[wideband].fft_throttle must be > 0".to_string());
        }
        if wb.frame_samples == 0 {
            return Err("[wideband].frame_samples must be > 0".to_string());
        }

        if self.source.kind == SourceKind::File && self.source.path.is_none() {
            return Err("[source].path is required when kind = \"file\"".to_string());
        }
        if !self.source.tone_amplitude.is_finite() || self.source.tone_amplitude < 0.0 {
            return Err("[source].tone_amplitude must be a non-negative number".to_string());
        }

        let mut seen = HashSet::new();
        let half_rate = i64::from(wb.sample_rate / 2);
        for rx in &self.receivers {
            if rx.id.trim().is_empty() {
                return Err("[[receivers]] id must not be empty".to_string());
            }
            if !seen.insert(rx.id.as_str()) {
                return Err(format!("[[receivers]] duplicate id \"{}\"", rx.id));
            }
            if rx.bandwidth_hz == 0 || rx.output_rate == 0 {
                return Err(format!(
                    "[[receivers]] id=\"{}\" bandwidth_hz and output_rate must be > 0",
                    rx.id
                ));
            }
            if rx.fir_taps == 0 || rx.fir_taps % 2 == 0 {
                return Err(format!(
                    "[[receivers]] id=\"{}\" fir_taps must be odd (got {})",
                    rx.id, rx.fir_taps
                ));
            }
            if rx.bandwidth_hz >= wb.sample_rate {
                return Err(format!(
                    "[[receivers]] id=\"{}\" bandwidth {} Hz does not fit in {} S/s",
                    rx.id, rx.bandwidth_hz, wb.sample_rate
                ));
            }
            let offset = sigforge_core::offset_hz(rx.center_freq_hz, wb.center_freq_hz);
            if offset.abs() >= half_rate {
                return Err(format!(
                    "[[receivers]] id=\"{}\" offset {} Hz exceeds Nyquist limit ±{} Hz",
                    rx.id, offset, half_rate
                ));
            }
        }
        Ok(())
    }

    /// Example configuration wrapped under the `[sigforge-server]` section
    /// header.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "sigforge-server")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
                ..GeneralConfig::default()
            },
            wideband: WidebandConfig::default(),
            source: SourceConfig {
                kind: SourceKind::File,
                path: Some(PathBuf::from("-")),
                format: SampleFormat::Cu8,
                ..SourceConfig::default()
            },
            receivers: vec![
                ReceiverEntry {
                    id: "pager".to_string(),
                    label: Some("POCSAG 153.350".to_string()),
                    center_freq_hz: 153_350_000,
                    decoder: Some("multimon-ng".to_string()),
                    output: Some(PathBuf::from("/tmp/sigforge-pager.s16")),
                    ..ReceiverEntry::default()
                },
                ReceiverEntry {
                    id: "fire".to_string(),
                    center_freq_hz: 153_830_000,
                    bandwidth_hz: 16_000,
                    output_rate: 16_000,
                    ..ReceiverEntry::default()
                },
            ],
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "sigforge-server"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.wideband.center_freq_hz, 153_350_000);
        assert_eq!(config.wideband.sample_rate, 2_048_000);
        assert_eq!(config.wideband.fft_size, 2048);
        assert_eq!(config.wideband.fft_throttle, 4);
        assert_eq!(config.source.kind, SourceKind::Tone);
        assert_eq!(config.general.status_interval_secs, 30);
        assert!(config.receivers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[general]
log_level = "debug"
status_interval_secs = 5

[wideband]
center_freq_hz = 153350000
sample_rate = 2048000
fft_size = 1024

[source]
kind = "file"
path = "/tmp/capture.cu8"
format = "cu8"
loop_file = true

[[receivers]]
id = "pager"
center_freq_hz = 153350000
decoder = "multimon-ng"
output = "/tmp/pager.s16"

[[receivers]]
id = "am"
center_freq_hz = 153000000
mode = "AM"
bandwidth_hz = 8000
output_rate = 16000
fir_taps = 127
"#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.wideband.fft_size, 1024);
        assert_eq!(config.wideband.fft_throttle, 4);
        assert_eq!(config.source.kind, SourceKind::File);
        assert_eq!(config.source.format, SampleFormat::Cu8);
        assert!(config.source.loop_file);
        assert_eq!(config.receivers.len(), 2);

        let pager = config.receivers[0].receiver_config();
        assert_eq!(pager.mode, DemodMode::NFM);
        assert_eq!(pager.bandwidth_hz, 12_500);
        assert_eq!(pager.output_rate, 22_050);
        assert_eq!(pager.fir_taps, DEFAULT_FIR_TAPS);
        assert_eq!(pager.decoder.as_deref(), Some("multimon-ng"));
        assert_eq!(
            config.receivers[0].output.as_deref(),
            Some(std::path::Path::new("/tmp/pager.s16"))
        );
        assert_eq!(config.receivers[1].mode, DemodMode::AM);
        assert_eq!(config.receivers[1].fir_taps, 127);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.general.log_level = Some("loud".to_string());
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.wideband.fft_size = 1000;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.wideband.fft_throttle = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.source.kind = SourceKind::File;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_receivers() {
        let entry = |id: &str, freq: u64| ReceiverEntry {
            id: id.to_string(),
            center_freq_hz: freq,
            ..ReceiverEntry::default()
        };

        let mut config = ServerConfig::default();
        config.receivers = vec![entry("a", 153_350_000), entry("a", 153_360_000)];
        assert!(config.validate().unwrap_err().contains("duplicate"));

        config.receivers = vec![entry("far", 160_000_000)];
        assert!(config.validate().unwrap_err().contains("Nyquist"));

        let mut even = entry("even", 153_350_000);
        even.fir_taps = 64;
        config.receivers = vec![even];
        assert!(config.validate().unwrap_err().contains("fir_taps"));

        config.receivers = vec![entry(" ", 153_350_000)];
        assert!(config.validate().is_err());

        config.receivers = vec![entry("ok", 153_350_000 + 900_000)];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_receiver_config_carries_entry_fields() {
        let entry = ReceiverEntry {
            id: "pager".to_string(),
            label: Some("POCSAG".to_string()),
            center_freq_hz: 152_840_000,
            decoder: Some("multimon-ng".to_string()),
            fir_taps: 95,
            ..Default::default()
        };
        let rx = entry.receiver_config();
        assert_eq!(rx.display_name(), "POCSAG");
        assert_eq!(rx.decoder.as_deref(), Some("multimon-ng"));
        assert_eq!(rx.fir_taps, 95);
        assert_eq!(rx.bandwidth_hz, 12_500);

        let bare = ReceiverEntry {
            id: "bare".to_string(),
            ..Default::default()
        };
        let rx = bare.receiver_config();
        assert_eq!(rx.display_name(), "bare");
        assert!(rx.decoder.is_none());
        assert_eq!(rx.fir_taps, DEFAULT_FIR_TAPS);
    }

    #[test]
    fn test_example_round_trips() {
        let text = ServerConfig::example_combined_toml();
        assert!(text.contains("[sigforge-server"));
        let table: toml::Table = toml::from_str(&text).unwrap();
        let section = toml::to_string(&table["sigforge-server"]).unwrap();
        let config: ServerConfig = toml::from_str(&section).unwrap();
        assert_eq!(config.receivers.len(), 2);
        assert_eq!(config.source.format, SampleFormat::Cu8);
        assert!(config.validate().is_ok());
    }
}
