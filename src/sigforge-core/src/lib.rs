// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod frame;
pub mod freq;
pub mod receiver;
pub mod status;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use frame::{AudioFrame, IqFrame, SpectrumFrame};
pub use freq::{format_mhz, offset_hz};
pub use receiver::{DemodMode, DEFAULT_FIR_TAPS, ReceiverConfig, ReceiverState, ReceiverStatus};
pub use status::{MultiplexerStatus, StatusEvent};
