// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Virtual receiver: NCO mixer, channel FIR, decimator and demodulator for
//! one narrowband channel carved out of the shared wideband stream.

use std::f64::consts::{PI, TAU};

use num_complex::Complex;
use sigforge_core::{format_mhz, offset_hz, IqFrame, ReceiverConfig, ReceiverState, ReceiverStatus};
use tracing::{debug, warn};

use crate::demod::Demodulator;
use crate::error::DspError;
use crate::filter::{design_lowpass, FirFilter};

/// Wrap an NCO phase into `(-π, π]`.
#[inline]
fn wrap_phase(mut phase: f64) -> f64 {
    while phase > PI {
        phase -= TAU;
    }
    while phase <= -PI {
        phase += TAU;
    }
    phase
}

fn phase_increment(offset_hz: i64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    -TAU * offset_hz as f64 / f64::from(sample_rate)
}

/// Check the parts of a receiver configuration that do not depend on the
/// wideband parameters.
pub fn validate_config(config: &ReceiverConfig) -> Result<(), DspError> {
    if config.id.trim().is_empty() {
        return Err(DspError::EmptyId);
    }
    if config.bandwidth_hz == 0 {
        return Err(DspError::Bandwidth(config.id.clone()));
    }
    if config.output_rate == 0 {
        return Err(DspError::OutputRate(config.id.clone()));
    }
    if config.fir_taps == 0 || config.fir_taps % 2 == 0 {
        return Err(DspError::TapCount(config.fir_taps));
    }
    Ok(())
}

/// Normalised channel cutoff for a receiver against a wideband rate.
pub fn cutoff_norm(bandwidth_hz: u32, sample_rate: u32) -> f64 {
    (f64::from(bandwidth_hz) / 2.0) / f64::from(sample_rate.max(1))
}

/// I and Q delay lines sharing one tap set.
#[derive(Debug, Clone)]
struct ChannelFilter {
    i: FirFilter,
    q: FirFilter,
}

/// One tunable, demodulated channel.
///
/// `Unconfigured -> Configured` only through [`VirtualReceiver::configure`];
/// [`VirtualReceiver::stop`] moves to `Stopped`, where frames are ignored
/// until the receiver is configured again.
#[derive(Debug, Clone)]
pub struct VirtualReceiver {
    config: ReceiverConfig,
    state: ReceiverState,
    active: bool,
    parent_center_hz: u64,
    parent_sample_rate: u32,
    offset_hz: i64,
    decimation: usize,
    filter: Option<ChannelFilter>,
    phase: f64,
    phase_inc: f64,
    /// Input samples since the last decimated output; survives frame edges.
    decim_counter: usize,
    demodulator: Demodulator,
    /// Wideband parameters of the last failed configuration attempt.
    failed_params: Option<(u64, u32)>,
    faults: u64,
    samples_emitted: u64,
}

impl VirtualReceiver {
    /// Create an unconfigured receiver.
    pub fn new(config: ReceiverConfig) -> Result<Self, DspError> {
        validate_config(&config)?;
        let demodulator = Demodulator::for_mode(config.mode);
        Ok(Self {
            config,
            state: ReceiverState::Unconfigured,
            active: true,
            parent_center_hz: 0,
            parent_sample_rate: 0,
            offset_hz: 0,
            decimation: 1,
            filter: None,
            phase: 0.0,
            phase_inc: 0.0,
            decim_counter: 0,
            demodulator,
            failed_params: None,
            faults: 0,
            samples_emitted: 0,
        })
    }

    /// Derive offset, decimation and taps from the wideband parameters and
    /// reset all filter, NCO and demodulator state.
    ///
    /// On error the receiver is left `Unconfigured`.
    pub fn configure(
        &mut self,
        parent_center_hz: u64,
        parent_sample_rate: u32,
    ) -> Result<(), DspError> {
        self.parent_center_hz = parent_center_hz;
        self.parent_sample_rate = parent_sample_rate;
        self.offset_hz = offset_hz(self.config.center_freq_hz, parent_center_hz);

        let taps = if parent_sample_rate == 0 {
            Err(DspError::SampleRate)
        } else {
            design_lowpass(
                self.config.fir_taps,
                cutoff_norm(self.config.bandwidth_hz, parent_sample_rate),
            )
        };
        let taps = match taps {
            Ok(taps) => taps,
            Err(e) => {
                self.state = ReceiverState::Unconfigured;
                self.filter = None;
                self.failed_params = Some((parent_center_hz, parent_sample_rate));
                return Err(e);
            }
        };

        self.decimation = ((parent_sample_rate / self.config.output_rate) as usize).max(1);
        self.filter = Some(ChannelFilter {
            i: FirFilter::new(&taps),
            q: FirFilter::new(&taps),
        });
        self.phase = 0.0;
        self.phase_inc = phase_increment(self.offset_hz, parent_sample_rate);
        self.decim_counter = 0;
        self.demodulator.reset();
        self.failed_params = None;
        self.state = ReceiverState::Configured;
        self.active = true;

        debug!(
            "receiver {}: {} {} offset={} Hz decim={} taps={}",
            self.config.id,
            self.config.mode,
            format_mhz(self.config.center_freq_hz),
            self.offset_hz,
            self.decimation,
            self.config.fir_taps
        );
        Ok(())
    }

    /// Release DSP state and ignore frames until configured again.
    pub fn stop(&mut self) {
        self.state = ReceiverState::Stopped;
        self.active = false;
        self.filter = None;
        self.decim_counter = 0;
        self.demodulator.reset();
    }

    /// Move the channel to `new_center_hz` without redesigning the filter.
    ///
    /// Only the offset and NCO phase change; taps and decimation stay as
    /// they are.
    pub fn retune(&mut self, new_center_hz: u64) {
        self.config.center_freq_hz = new_center_hz;
        self.offset_hz = offset_hz(new_center_hz, self.parent_center_hz);
        self.phase_inc = phase_increment(self.offset_hz, self.parent_sample_rate);
        self.phase = 0.0;
    }

    fn drifted(&self, frame: &IqFrame<'_>) -> bool {
        frame.center_freq_hz != self.parent_center_hz
            || frame.sample_rate != self.parent_sample_rate
    }

    /// Guarded transition into `Configured` for the frame's wideband
    /// parameters. Returns whether the frame may be processed.
    fn ensure_configured(&mut self, frame: &IqFrame<'_>) -> bool {
        match self.state {
            ReceiverState::Stopped => false,
            ReceiverState::Configured if !self.drifted(frame) => true,
            ReceiverState::Unconfigured
                if self.failed_params == Some((frame.center_freq_hz, frame.sample_rate)) =>
            {
                false
            }
            _ => {
                let was_configured = self.state == ReceiverState::Configured;
                match self.configure(frame.center_freq_hz, frame.sample_rate) {
                    Ok(()) => {
                        if was_configured {
                            debug!(
                                "receiver {}: wideband moved to {} @ {} Hz, reconfigured",
                                self.config.id,
                                format_mhz(frame.center_freq_hz),
                                frame.sample_rate
                            );
                        }
                        true
                    }
                    Err(e) => {
                        warn!("receiver {}: cannot configure: {}", self.config.id, e);
                        false
                    }
                }
            }
        }
    }

    /// Run one wideband frame through the channel and return the decimated,
    /// demodulated output for it.
    pub fn process_iq(&mut self, frame: &IqFrame<'_>) -> Vec<f32> {
        if !self.ensure_configured(frame) {
            return Vec::new();
        }
        let Some(filter) = self.filter.as_mut() else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(frame.pair_count() / self.decimation + 1);
        for (i, q) in frame.pairs() {
            let (sin, cos) = self.phase.sin_cos();
            let (lo_re, lo_im) = (cos as f32, sin as f32);
            filter.i.push(i * lo_re - q * lo_im);
            filter.q.push(i * lo_im + q * lo_re);
            self.phase = wrap_phase(self.phase + self.phase_inc);

            self.decim_counter += 1;
            if self.decim_counter < self.decimation {
                continue;
            }
            self.decim_counter = 0;

            let filtered = Complex::new(filter.i.output(), filter.q.output());
            let mut sample = self.demodulator.demodulate(filtered);
            if !sample.is_finite() {
                sample = 0.0;
                self.faults += 1;
            }
            out.push(sample);
        }
        self.samples_emitted += out.len() as u64;
        out
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn offset_hz(&self) -> i64 {
        self.offset_hz
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Channel filter taps, if configured.
    pub fn taps(&self) -> Option<&[f32]> {
        self.filter.as_ref().map(|f| f.i.taps())
    }

    pub fn status(&self) -> ReceiverStatus {
        ReceiverStatus {
            id: self.config.id.clone(),
            label: self.config.label.clone(),
            decoder: self.config.decoder.clone(),
            mode: self.config.mode,
            center_freq_hz: self.config.center_freq_hz,
            bandwidth_hz: self.config.bandwidth_hz,
            output_rate: self.config.output_rate,
            offset_hz: self.offset_hz,
            decimation: self.decimation,
            fir_taps: self.config.fir_taps,
            state: self.state,
            active: self.active,
            faults: self.faults,
            samples_emitted: self.samples_emitted,
        }
    }
}
