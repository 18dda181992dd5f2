// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

/// Parse a frequency or rate such as `153350000`, `153.35M`, `12.5kHz` or
/// `2.048 MHz` into whole hertz.
pub fn parse_hz(text: &str) -> Option<u64> {
    let lower = text.trim().to_ascii_lowercase();
    let number = lower.strip_suffix("hz").unwrap_or(&lower).trim_end();
    let (digits, scale) = match number.chars().last()? {
        'k' => (&number[..number.len() - 1], 1e3),
        'm' => (&number[..number.len() - 1], 1e6),
        'g' => (&number[..number.len() - 1], 1e9),
        _ => (number, 1.0),
    };
    let value: f64 = digits.trim().parse().ok()?;
    let hz = (value * scale).round();
    if !hz.is_finite() || hz < 0.0 || hz > u64::MAX as f64 {
        return None;
    }
    Some(hz as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hz() {
        assert_eq!(parse_hz("153350000"), Some(153_350_000));
        assert_eq!(parse_hz("153.35M"), Some(153_350_000));
        assert_eq!(parse_hz("153.35 MHz"), Some(153_350_000));
        assert_eq!(parse_hz("2.048M"), Some(2_048_000));
        assert_eq!(parse_hz("12.5kHz"), Some(12_500));
        assert_eq!(parse_hz("1.2G"), Some(1_200_000_000));
        assert_eq!(parse_hz(""), None);
        assert_eq!(parse_hz("fast"), None);
        assert_eq!(parse_hz("-5k"), None);
    }
}
