// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wideband IQ sources: silence, a synthetic carrier, and recorded files.

use std::f64::consts::{PI, TAU};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{SampleFormat, SourceConfig, SourceKind};

/// Producer of interleaved `I, Q` floats.
pub trait IqSource: Send + 'static {
    /// Fill `buf` with interleaved I/Q. Returns the number of floats
    /// written (always even); `Ok(0)` means end of stream.
    fn read_into(&mut self, buf: &mut [f32]) -> Result<usize, String>;

    /// Restart from the beginning. `Ok(false)` when the source cannot.
    fn rewind(&mut self) -> Result<bool, String> {
        Ok(false)
    }
}

/// IQ source that produces silence (all zeros).
pub struct SilenceSource;

impl IqSource for SilenceSource {
    fn read_into(&mut self, buf: &mut [f32]) -> Result<usize, String> {
        let len = buf.len() & !1;
        buf[..len].fill(0.0);
        Ok(len)
    }
}

fn wrap(phase: f64) -> f64 {
    if phase > PI {
        phase - TAU
    } else if phase <= -PI {
        phase + TAU
    } else {
        phase
    }
}

/// Complex carrier at a fixed offset from the wideband centre, optionally
/// frequency-modulated by a sine tone.
pub struct ToneSource {
    sample_rate: f64,
    offset_hz: f64,
    amplitude: f32,
    deviation_hz: f64,
    audio_hz: f64,
    carrier_phase: f64,
    audio_phase: f64,
}

impl ToneSource {
    pub fn new(sample_rate: u32, offset_hz: i64, amplitude: f32) -> Self {
        Self {
            sample_rate: f64::from(sample_rate.max(1)),
            offset_hz: offset_hz as f64,
            amplitude,
            deviation_hz: 0.0,
            audio_hz: 0.0,
            carrier_phase: 0.0,
            audio_phase: 0.0,
        }
    }

    pub fn with_fm(mut self, deviation_hz: f64, audio_hz: f64) -> Self {
        self.deviation_hz = deviation_hz;
        self.audio_hz = audio_hz;
        self
    }
}

impl IqSource for ToneSource {
    fn read_into(&mut self, buf: &mut [f32]) -> Result<usize, String> {
        let audio_step = TAU * self.audio_hz / self.sample_rate;
        for pair in buf.chunks_exact_mut(2) {
            let (sin, cos) = self.carrier_phase.sin_cos();
            pair[0] = cos as f32 * self.amplitude;
            pair[1] = sin as f32 * self.amplitude;

            let inst_hz = self.offset_hz + self.deviation_hz * self.audio_phase.sin();
            self.carrier_phase = wrap(self.carrier_phase + TAU * inst_hz / self.sample_rate);
            self.audio_phase = wrap(self.audio_phase + audio_step);
        }
        Ok(buf.len() & !1)
    }
}

/// Recorded IQ in `cf32` or `cu8` layout from a file, FIFO or stdin.
pub struct FileSource {
    reader: Box<dyn Read + Send>,
    /// `None` for stdin and in-memory readers, which cannot rewind.
    path: Option<PathBuf>,
    format: SampleFormat,
    bytes: Vec<u8>,
}

impl FileSource {
    /// Open `path`; `-` reads stdin.
    pub fn open(path: &Path, format: SampleFormat) -> Result<Self, String> {
        if path == Path::new("-") {
            return Ok(Self::from_reader(Box::new(io::stdin()), format));
        }
        let file = File::open(path)
            .map_err(|e| format!("Failed to open IQ file {}: {}", path.display(), e))?;
        let mut source = Self::from_reader(Box::new(BufReader::new(file)), format);
        source.path = Some(path.to_path_buf());
        Ok(source)
    }

    pub fn from_reader(reader: Box<dyn Read + Send>, format: SampleFormat) -> Self {
        Self {
            reader,
            path: None,
            format,
            bytes: Vec::new(),
        }
    }

    fn bytes_per_float(&self) -> usize {
        match self.format {
            SampleFormat::Cf32 => 4,
            SampleFormat::Cu8 => 1,
        }
    }

    /// Read until `self.bytes` is full or the stream ends.
    fn fill(&mut self) -> Result<usize, String> {
        let mut filled = 0;
        while filled < self.bytes.len() {
            match self.reader.read(&mut self.bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(format!("IQ read failed: {}", e)),
            }
        }
        Ok(filled)
    }
}

impl IqSource for FileSource {
    fn read_into(&mut self, buf: &mut [f32]) -> Result<usize, String> {
        let width = self.bytes_per_float();
        let floats = buf.len() & !1;
        self.bytes.resize(floats * width, 0);

        let filled = self.fill()?;
        // A trailing partial pair at end of stream is dropped.
        let pairs = filled / (2 * width);
        let floats = pairs * 2;
        let bytes = &self.bytes[..floats * width];

        match self.format {
            SampleFormat::Cf32 => {
                for (out, raw) in buf.iter_mut().zip(bytes.chunks_exact(4)) {
                    *out = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                }
            }
            SampleFormat::Cu8 => {
                for (out, &raw) in buf.iter_mut().zip(bytes.iter()) {
                    *out = (f32::from(raw) - 127.5) / 127.5;
                }
            }
        }
        Ok(floats)
    }

    fn rewind(&mut self) -> Result<bool, String> {
        let Some(path) = self.path.as_ref() else {
            return Ok(false);
        };
        let file = File::open(path)
            .map_err(|e| format!("Failed to reopen IQ file {}: {}", path.display(), e))?;
        self.reader = Box::new(BufReader::new(file));
        Ok(true)
    }
}

/// Build the source described by `[source]`.
pub fn build_source(cfg: &SourceConfig, sample_rate: u32) -> Result<Box<dyn IqSource>, String> {
    match cfg.kind {
        SourceKind::Silence => {
            info!("IQ source: silence");
            Ok(Box::new(SilenceSource))
        }
        SourceKind::Tone => {
            info!(
                "IQ source: tone at {:+} Hz (deviation {} Hz, audio {} Hz)",
                cfg.tone_offset_hz, cfg.tone_deviation_hz, cfg.tone_audio_hz
            );
            Ok(Box::new(
                ToneSource::new(sample_rate, cfg.tone_offset_hz, cfg.tone_amplitude)
                    .with_fm(cfg.tone_deviation_hz, cfg.tone_audio_hz),
            ))
        }
        SourceKind::File => {
            let path = cfg
                .path
                .as_deref()
                .ok_or("[source].path is required when kind = \"file\"")?;
            info!("IQ source: {} ({:?})", path.display(), cfg.format);
            Ok(Box::new(FileSource::open(path, cfg.format)?))
        }
    }
}
