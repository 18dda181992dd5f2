// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Receiver set changes applied on SIGHUP.

use crate::config::ReceiverEntry;

#[derive(Debug, Clone, PartialEq)]
pub enum ReloadAction {
    Remove(String),
    Retune { id: String, freq_hz: u64 },
    Add(ReceiverEntry),
}

/// Diff two receiver lists into management actions.
///
/// A receiver whose only change is its centre frequency is retuned in
/// place; any other change replaces it. Removals come first.
pub fn plan_reload(current: &[ReceiverEntry], next: &[ReceiverEntry]) -> Vec<ReloadAction> {
    let mut removals = Vec::new();
    let mut changes = Vec::new();

    for old in current {
        if !next.iter().any(|n| n.id == old.id) {
            removals.push(ReloadAction::Remove(old.id.clone()));
        }
    }

    for new in next {
        let Some(old) = current.iter().find(|c| c.id == new.id) else {
            changes.push(ReloadAction::Add(new.clone()));
            continue;
        };
        if old == new {
            continue;
        }
        let mut moved = old.clone();
        moved.center_freq_hz = new.center_freq_hz;
        if moved == *new {
            changes.push(ReloadAction::Retune {
                id: new.id.clone(),
                freq_hz: new.center_freq_hz,
            });
        } else {
            removals.push(ReloadAction::Remove(new.id.clone()));
            changes.push(ReloadAction::Add(new.clone()));
        }
    }

    removals.extend(changes);
    removals
}

#[cfg(unix)]
pub type Hangup = tokio::signal::unix::Signal;

#[cfg(unix)]
pub fn hangup_signal() -> std::io::Result<Hangup> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
}

/// Resolves on the next SIGHUP.
#[cfg(unix)]
pub async fn hangup(sig: &mut Hangup) {
    if sig.recv().await.is_none() {
        std::future::pending::<()>().await;
    }
}

#[cfg(not(unix))]
pub struct Hangup;

#[cfg(not(unix))]
pub fn hangup_signal() -> std::io::Result<Hangup> {
    Ok(Hangup)
}

#[cfg(not(unix))]
pub async fn hangup(_sig: &mut Hangup) {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigforge_core::DemodMode;

    fn entry(id: &str, freq: u64) -> ReceiverEntry {
        ReceiverEntry {
            id: id.to_string(),
            center_freq_hz: freq,
            ..ReceiverEntry::default()
        }
    }

    #[test]
    fn unchanged_set_is_a_no_op() {
        let set = vec![entry("a", 1), entry("b", 2)];
        assert!(plan_reload(&set, &set).is_empty());
    }

    #[test]
    fn frequency_change_is_a_retune() {
        let current = vec![entry("a", 153_350_000)];
        let next = vec![entry("a", 153_375_000)];
        assert_eq!(
            plan_reload(&current, &next),
            vec![ReloadAction::Retune {
                id: "a".into(),
                freq_hz: 153_375_000
            }]
        );
    }

    #[test]
    fn other_changes_replace_the_receiver() {
        let current = vec![entry("a", 1), entry("gone", 2)];
        let mut changed = entry("a", 5);
        changed.mode = DemodMode::AM;
        let next = vec![changed.clone(), entry("new", 3)];

        assert_eq!(
            plan_reload(&current, &next),
            vec![
                ReloadAction::Remove("gone".into()),
                ReloadAction::Remove("a".into()),
                ReloadAction::Add(changed),
                ReloadAction::Add(entry("new", 3)),
            ]
        );
    }
}
