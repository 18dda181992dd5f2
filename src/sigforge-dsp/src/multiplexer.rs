// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Fan-out of wideband frames to the spectrum engine and every virtual
//! receiver, plus receiver lifecycle management.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use sigforge_core::{
    format_mhz, AudioFrame, IqFrame, MultiplexerStatus, ReceiverConfig, ReceiverStatus,
    StatusEvent,
};
use tracing::{debug, info, warn};

use crate::error::DspError;
use crate::listener::MultiplexerListener;
use crate::receiver::VirtualReceiver;
use crate::spectrum::SpectrumEngine;

/// Spectrum parameters fixed for the lifetime of a multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    /// FFT length in complex samples (power of two).
    pub fft_size: usize,
    /// Transform every Nth frame.
    pub fft_throttle: usize,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            fft_throttle: 4,
        }
    }
}

/// Owns the shared wideband parameters and all receivers.
///
/// Everything runs synchronously on the caller's thread. Receivers are kept
/// in insertion order and see frames in arrival order.
pub struct Multiplexer<L> {
    listener: L,
    spectrum: SpectrumEngine,
    receivers: Vec<VirtualReceiver>,
    connected: bool,
    center_freq_hz: u64,
    sample_rate: u32,
    frames_processed: u64,
    overruns: u64,
    warned_odd_frame: bool,
}

impl<L: MultiplexerListener> Multiplexer<L> {
    pub fn new(config: MultiplexerConfig, listener: L) -> Result<Self, DspError> {
        let spectrum = SpectrumEngine::new(config.fft_size, config.fft_throttle)?;
        Ok(Self {
            listener,
            spectrum,
            receivers: Vec::new(),
            connected: false,
            center_freq_hz: 0,
            sample_rate: 0,
            frames_processed: 0,
            overruns: 0,
            warned_odd_frame: false,
        })
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn receiver(&self, id: &str) -> Option<&VirtualReceiver> {
        self.receivers.iter().find(|rx| rx.id() == id)
    }

    /// Receiver ids in fan-out order.
    pub fn receiver_ids(&self) -> impl Iterator<Item = &str> {
        self.receivers.iter().map(|rx| rx.id())
    }

    /// Mark the source connected at the given wideband parameters and
    /// configure every registered receiver against them.
    pub fn connect(&mut self, center_freq_hz: u64, sample_rate: u32) {
        self.connected = true;
        self.center_freq_hz = center_freq_hz;
        self.sample_rate = sample_rate;
        for rx in &mut self.receivers {
            if let Err(e) = rx.configure(center_freq_hz, sample_rate) {
                warn!("receiver {}: cannot configure on connect: {}", rx.id(), e);
            }
        }
        info!(
            "Wideband connected: {} @ {} S/s, {} receiver(s)",
            format_mhz(center_freq_hz),
            sample_rate,
            self.receivers.len()
        );
        self.listener.on_status_change(&StatusEvent::Connected {
            center_freq_hz,
            sample_rate,
        });
    }

    /// Mark the source gone. Receivers stay registered and idle.
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        info!("Wideband disconnected");
        self.listener.on_status_change(&StatusEvent::Disconnected);
    }

    /// Register a receiver, configuring it right away when connected.
    pub fn add_receiver(&mut self, config: ReceiverConfig) -> Result<ReceiverStatus, DspError> {
        if self.receiver(&config.id).is_some() {
            return Err(DspError::DuplicateReceiver(config.id));
        }
        let mut rx = VirtualReceiver::new(config)?;
        if self.connected {
            rx.configure(self.center_freq_hz, self.sample_rate)?;
        }

        let status = rx.status();
        info!(
            "Receiver {} added: {} {} bw={} Hz out={} Hz",
            rx.config().display_name(),
            status.mode,
            format_mhz(status.center_freq_hz),
            status.bandwidth_hz,
            status.output_rate
        );
        self.receivers.push(rx);
        self.listener
            .on_status_change(&StatusEvent::ReceiverAdded(status.clone()));
        Ok(status)
    }

    /// Stop and drop a receiver. It sees no frame delivered after this
    /// returns.
    pub fn remove_receiver(&mut self, id: &str) -> bool {
        let Some(idx) = self.receivers.iter().position(|rx| rx.id() == id) else {
            return false;
        };
        let mut rx = self.receivers.remove(idx);
        rx.stop();
        info!("Receiver {} removed", id);
        self.listener.on_status_change(&StatusEvent::ReceiverRemoved {
            id: id.to_string(),
        });
        true
    }

    /// Move a receiver to `freq_hz` keeping its filter and decimation.
    pub fn retune_receiver(&mut self, id: &str, freq_hz: u64) -> bool {
        let Some(rx) = self.receivers.iter_mut().find(|rx| rx.id() == id) else {
            return false;
        };
        rx.retune(freq_hz);
        if self.connected && rx.offset_hz().unsigned_abs() > u64::from(self.sample_rate / 2) {
            warn!(
                "Receiver {} retuned to {}, outside the {} S/s wideband span",
                id,
                format_mhz(freq_hz),
                self.sample_rate
            );
        } else {
            debug!("Receiver {} retuned to {}", id, format_mhz(freq_hz));
        }
        let status = rx.status();
        self.listener
            .on_status_change(&StatusEvent::ReceiverRetuned(status));
        true
    }

    /// Fan one wideband frame out to the spectrum engine and every receiver.
    pub fn process_frame(&mut self, frame: &IqFrame<'_>) {
        let started = Instant::now();

        if frame.sample_rate == 0 {
            warn!("Ignoring IQ frame with zero sample rate");
            return;
        }
        if frame.samples.len() % 2 != 0 && !self.warned_odd_frame {
            warn!(
                "IQ frame has odd length {}; trailing sample ignored",
                frame.samples.len()
            );
            self.warned_odd_frame = true;
        }

        if !self.connected {
            self.connect(frame.center_freq_hz, frame.sample_rate);
        } else if frame.center_freq_hz != self.center_freq_hz
            || frame.sample_rate != self.sample_rate
        {
            self.center_freq_hz = frame.center_freq_hz;
            self.sample_rate = frame.sample_rate;
            info!(
                "Wideband moved to {} @ {} S/s",
                format_mhz(frame.center_freq_hz),
                frame.sample_rate
            );
            self.listener.on_status_change(&StatusEvent::WidebandChanged {
                center_freq_hz: frame.center_freq_hz,
                sample_rate: frame.sample_rate,
            });
        }
        self.frames_processed += 1;

        if let Some(spectrum) = self.spectrum.on_frame(frame) {
            self.listener.on_spectrum(&spectrum);
        }

        for rx in &mut self.receivers {
            if !rx.is_active() {
                continue;
            }
            let samples = rx.process_iq(frame);
            if samples.is_empty() {
                continue;
            }
            self.listener.on_receiver_audio(&AudioFrame {
                receiver_id: rx.id().to_string(),
                sample_rate: rx.config().output_rate,
                samples,
                timestamp_ms: frame.timestamp_ms,
            });
        }

        let elapsed = started.elapsed().as_secs_f64();
        let budget = frame.duration_secs();
        if budget > 0.0 && elapsed > budget {
            self.overruns += 1;
            warn!(
                "Frame overrun: {:.3} ms spent on {:.3} ms of IQ ({} total)",
                elapsed * 1e3,
                budget * 1e3,
                self.overruns
            );
        }
    }

    pub fn status(&self) -> MultiplexerStatus {
        let receivers: Vec<ReceiverStatus> = self.receivers.iter().map(|rx| rx.status()).collect();
        MultiplexerStatus {
            connected: self.connected,
            center_freq_hz: self.center_freq_hz,
            sample_rate: self.sample_rate,
            fft_size: self.spectrum.fft_size(),
            fft_throttle: self.spectrum.throttle(),
            spectrum_rate_hz: self.spectrum.update_rate_hz(self.sample_rate),
            frames_processed: self.frames_processed,
            overruns: self.overruns,
            faults: receivers.iter().map(|r| r.faults).sum(),
            receivers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigforge_core::{DemodMode, ReceiverState, SpectrumFrame};

    const RATE: u32 = 2_048_000;
    const CENTER: u64 = 153_350_000;

    #[derive(Default)]
    struct Recorder {
        spectra: Vec<SpectrumFrame>,
        audio: Vec<AudioFrame>,
        events: Vec<StatusEvent>,
    }

    impl MultiplexerListener for Recorder {
        fn on_spectrum(&mut self, spectrum: &SpectrumFrame) {
            self.spectra.push(spectrum.clone());
        }

        fn on_receiver_audio(&mut self, audio: &AudioFrame) {
            self.audio.push(audio.clone());
        }

        fn on_status_change(&mut self, event: &StatusEvent) {
            self.events.push(event.clone());
        }
    }

    fn mux(fft_size: usize, fft_throttle: usize) -> Multiplexer<Recorder> {
        Multiplexer::new(
            MultiplexerConfig {
                fft_size,
                fft_throttle,
            },
            Recorder::default(),
        )
        .unwrap()
    }

    fn nfm(id: &str, freq: u64) -> ReceiverConfig {
        ReceiverConfig::new(id, freq, 12_500, 22_050, DemodMode::NFM)
    }

    fn audio_ids(mux: &Multiplexer<Recorder>) -> Vec<&str> {
        mux.listener()
            .audio
            .iter()
            .map(|a| a.receiver_id.as_str())
            .collect()
    }

    #[test]
    fn pager_channel_end_to_end() {
        let mut mux = mux(2048, 4);
        let status = mux.add_receiver(nfm("pager", CENTER)).unwrap();
        assert_eq!(status.state, ReceiverState::Unconfigured);

        let buf = vec![0.0_f32; 92 * 100 * 2];
        for ts in 0..4 {
            mux.process_frame(&IqFrame::new(&buf, RATE, CENTER, ts));
        }

        let status = mux.status();
        assert!(status.connected);
        assert_eq!(status.frames_processed, 4);
        let pager = status.receiver("pager").unwrap();
        assert_eq!(pager.offset_hz, 0);
        assert_eq!(pager.decimation, 92);
        assert_eq!(pager.state, ReceiverState::Configured);
        assert_eq!(pager.samples_emitted, 400);

        let rec = mux.listener();
        assert_eq!(
            rec.events[1],
            StatusEvent::Connected {
                center_freq_hz: CENTER,
                sample_rate: RATE
            }
        );
        assert_eq!(rec.audio.len(), 4);
        assert!(rec.audio.iter().all(|a| a.sample_rate == 22_050));
        assert_eq!(rec.audio[3].timestamp_ms, 3);
        assert_eq!(rec.spectra.len(), 1);
        assert_eq!(rec.spectra[0].magnitudes_db.len(), 2048);
    }

    #[test]
    fn add_while_connected_configures_and_validates() {
        let mut mux = mux(1024, 1);
        mux.connect(CENTER, 48_000);

        let status = mux.add_receiver(nfm("a", CENTER + 5_000)).unwrap();
        assert_eq!(status.state, ReceiverState::Configured);
        assert_eq!(status.offset_hz, 5_000);
        assert_eq!(status.decimation, 2);

        assert_eq!(
            mux.add_receiver(nfm("a", CENTER)).unwrap_err(),
            DspError::DuplicateReceiver("a".into())
        );
        let wide = ReceiverConfig::new("wide", CENTER, 60_000, 8_000, DemodMode::AM);
        assert!(matches!(mux.add_receiver(wide), Err(DspError::Cutoff(_))));
        assert!(mux.receiver("wide").is_none());
        assert_eq!(mux.receiver_ids().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn removal_takes_effect_before_next_frame() {
        let mut mux = mux(64, 1);
        mux.add_receiver(nfm("a", CENTER)).unwrap();
        mux.add_receiver(nfm("b", CENTER + 10_000)).unwrap();

        let buf = vec![0.0_f32; 92 * 2 * 2];
        mux.process_frame(&IqFrame::new(&buf, RATE, CENTER, 0));
        assert!(mux.remove_receiver("a"));
        mux.process_frame(&IqFrame::new(&buf, RATE, CENTER, 1));

        assert_eq!(audio_ids(&mux), vec!["a", "b", "b"]);
        assert!(mux
            .listener()
            .events
            .contains(&StatusEvent::ReceiverRemoved { id: "a".into() }));
        assert!(!mux.remove_receiver("a"));
        assert!(mux.status().receiver("a").is_none());
    }

    #[test]
    fn fan_out_follows_insertion_order() {
        let mut mux = mux(64, 1);
        for id in ["zulu", "alpha", "mike"] {
            mux.add_receiver(nfm(id, CENTER)).unwrap();
        }
        let buf = vec![0.0_f32; 92 * 2];
        mux.process_frame(&IqFrame::new(&buf, RATE, CENTER, 0));
        assert_eq!(audio_ids(&mux), vec!["zulu", "alpha", "mike"]);
        let order: Vec<String> = mux.status().receivers.into_iter().map(|r| r.id).collect();
        assert_eq!(order, vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn spectrum_is_throttled() {
        let mut mux = mux(64, 3);
        let buf = vec![0.0_f32; 128];
        for _ in 0..9 {
            mux.process_frame(&IqFrame::new(&buf, 48_000, CENTER, 0));
        }
        assert_eq!(mux.listener().spectra.len(), 3);
        assert!((mux.status().spectrum_rate_hz - 48_000.0 / 192.0).abs() < 1e-9);
    }

    #[test]
    fn short_frames_still_reach_receivers() {
        let mut mux = mux(4096, 1);
        mux.add_receiver(nfm("a", CENTER)).unwrap();
        let buf = vec![0.0_f32; 92 * 2];
        mux.process_frame(&IqFrame::new(&buf, RATE, CENTER, 0));
        assert!(mux.listener().spectra.is_empty());
        assert_eq!(mux.listener().audio.len(), 1);
    }

    #[test]
    fn disconnect_keeps_receivers_and_reconnects_on_frame() {
        let mut mux = mux(64, 1);
        mux.add_receiver(nfm("a", CENTER)).unwrap();
        mux.connect(CENTER, RATE);
        mux.disconnect();
        mux.disconnect();

        let status = mux.status();
        assert!(!status.connected);
        assert_eq!(status.receivers.len(), 1);
        let disconnects = mux
            .listener()
            .events
            .iter()
            .filter(|e| **e == StatusEvent::Disconnected)
            .count();
        assert_eq!(disconnects, 1);

        let buf = vec![0.0_f32; 92 * 2];
        mux.process_frame(&IqFrame::new(&buf, RATE, CENTER, 0));
        assert!(mux.is_connected());
        assert_eq!(mux.listener().audio.len(), 1);
    }

    #[test]
    fn drift_is_reported_and_receivers_follow() {
        let mut mux = mux(64, 1);
        mux.add_receiver(nfm("a", CENTER)).unwrap();
        let buf = vec![0.0_f32; 256];
        mux.process_frame(&IqFrame::new(&buf, RATE, CENTER, 0));
        mux.process_frame(&IqFrame::new(&buf, RATE, CENTER - 20_000, 1));

        assert_eq!(
            mux.listener().events.last(),
            Some(&StatusEvent::WidebandChanged {
                center_freq_hz: CENTER - 20_000,
                sample_rate: RATE
            })
        );
        let status = mux.status();
        assert_eq!(status.center_freq_hz, CENTER - 20_000);
        assert_eq!(status.receiver("a").unwrap().offset_hz, 20_000);
    }

    #[test]
    fn retune_updates_offset_only() {
        let mut mux = mux(64, 1);
        mux.connect(CENTER, RATE);
        mux.add_receiver(nfm("a", CENTER)).unwrap();
        assert!(mux.retune_receiver("a", CENTER + 12_500));
        assert!(!mux.retune_receiver("missing", CENTER));

        let status = mux.status();
        let a = status.receiver("a").unwrap();
        assert_eq!(a.offset_hz, 12_500);
        assert_eq!(a.decimation, 92);
        assert!(matches!(
            mux.listener().events.last(),
            Some(StatusEvent::ReceiverRetuned(s)) if s.center_freq_hz == CENTER + 12_500
        ));

        // Outside the span is accepted.
        assert!(mux.retune_receiver("a", CENTER + 5_000_000));
        assert_eq!(mux.status().receiver("a").unwrap().offset_hz, 5_000_000);
    }

    #[test]
    fn slow_frames_count_as_overruns() {
        let mut mux = mux(64, 1);
        mux.add_receiver(ReceiverConfig::new("a", CENTER, 12_500, 8_000, DemodMode::NFM))
            .unwrap();
        // 4096 pairs claimed to last about one microsecond.
        let buf = vec![0.1_f32; 4096 * 2];
        mux.process_frame(&IqFrame::new(&buf, 4_000_000_000, CENTER, 0));
        assert_eq!(mux.status().overruns, 1);
    }

    #[test]
    fn zero_rate_frames_are_ignored() {
        let mut mux = mux(64, 1);
        let buf = vec![0.0_f32; 256];
        mux.process_frame(&IqFrame::new(&buf, 0, CENTER, 0));
        assert!(!mux.is_connected());
        assert_eq!(mux.status().frames_processed, 0);
    }

    #[test]
    fn rejects_bad_spectrum_parameters() {
        let bad_size = MultiplexerConfig {
            fft_size: 1000,
            fft_throttle: 1,
        };
        assert_eq!(
            Multiplexer::new(bad_size, ()).err(),
            Some(DspError::FftSize(1000))
        );
        let bad_throttle = MultiplexerConfig {
            fft_size: 1024,
            fft_throttle: 0,
        };
        assert_eq!(
            Multiplexer::new(bad_throttle, ()).err(),
            Some(DspError::Throttle)
        );
    }
}
