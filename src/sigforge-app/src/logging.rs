// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Parse a level name, falling back to INFO when absent or invalid.
pub fn parse_level(log_level: Option<&str>) -> Level {
    log_level
        .and_then(|s| s.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

/// Install the global fmt subscriber.
///
/// Thread names are shown because the multiplexer runs on its own thread.
pub fn init_logging(log_level: Option<&str>) {
    FmtSubscriber::builder()
        .with_target(false)
        .with_thread_names(true)
        .with_max_level(parse_level(log_level))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing_falls_back_to_info() {
        assert_eq!(parse_level(Some("debug")), Level::DEBUG);
        assert_eq!(parse_level(Some(" WARN ")), Level::WARN);
        assert_eq!(parse_level(Some("chatty")), Level::INFO);
        assert_eq!(parse_level(None), Level::INFO);
    }
}
