// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wideband channelizer: spectrum engine, FIR designer, virtual receivers
//! and the multiplexer that fans IQ frames out to them.

pub mod demod;
pub mod error;
pub mod fft;
pub mod filter;
pub mod listener;
pub mod multiplexer;
pub mod receiver;
pub mod spectrum;

pub use demod::Demodulator;
pub use error::DspError;
pub use fft::{blackman_harris, Fft};
pub use filter::{design_lowpass, FirFilter};
pub use listener::{ChannelListener, MultiplexerListener};
pub use multiplexer::{Multiplexer, MultiplexerConfig};
pub use receiver::VirtualReceiver;
pub use spectrum::SpectrumEngine;
