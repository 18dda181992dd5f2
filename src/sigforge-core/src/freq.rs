// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

/// Signed distance (Hz) of `freq_hz` from the wideband `center_hz`.
pub fn offset_hz(freq_hz: u64, center_hz: u64) -> i64 {
    (i128::from(freq_hz) - i128::from(center_hz)) as i64
}

/// Render a frequency as `"153.350000 MHz"` for log lines.
pub fn format_mhz(freq_hz: u64) -> String {
    format!("{:.6} MHz", freq_hz as f64 / 1e6)
}
