// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Default search paths for `sigforge.toml`
/// (current directory → XDG config → /etc).
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("sigforge.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("sigforge").join("sigforge.toml"));
    }
    paths.push(PathBuf::from("/etc/sigforge/sigforge.toml"));
    paths
}

/// Extract and deserialize a named section from TOML text.
///
/// `Ok(None)` when the section is absent.
fn parse_section<T: DeserializeOwned>(
    content: &str,
    key: &str,
    path: &Path,
) -> Result<Option<T>, ConfigError> {
    let parse_err =
        |e: &dyn std::fmt::Display| ConfigError::ParseError(path.to_path_buf(), e.to_string());

    let table: toml::Table = toml::from_str(content).map_err(|e| parse_err(&e))?;
    let Some(section) = table.get(key) else {
        return Ok(None);
    };

    // Round-trip through text so serde defaults apply to missing fields.
    let section_toml = toml::to_string(section).map_err(|e| parse_err(&e))?;
    let cfg = toml::from_str::<T>(&section_toml).map_err(|e| parse_err(&e))?;
    Ok(Some(cfg))
}

fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    parse_section(&content, key, path)
}

/// A configuration struct living under `[<section_key>]` in `sigforge.toml`.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    fn section_key() -> &'static str;

    /// Load the section from a specific file; a missing section is an error.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// Load the first default-path file that contains the section, or
    /// `(Default::default(), None)` when there is none.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in config_search_paths() {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(&path, Self::section_key())? {
                    return Ok((cfg, Some(path)));
                }
            }
        }
        Ok((Self::default(), None))
    }

    /// `--config` wins over the search paths.
    fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match explicit {
            Some(path) => Ok((Self::load_from_file(path)?, Some(path.to_path_buf()))),
            None => Self::load_from_default_paths(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        rate: u32,
    }

    impl ConfigFile for Sample {
        fn section_key() -> &'static str {
            "sample"
        }
    }

    fn temp_file(tag: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "sigforge-app-{}-{}.toml",
            tag,
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn section_defaults_apply() {
        let path = Path::new("inline.toml");
        let cfg: Sample = parse_section("[sample]\nname = \"x\"\n", "sample", path)
            .unwrap()
            .unwrap();
        assert_eq!(
            cfg,
            Sample {
                name: "x".into(),
                rate: 0
            }
        );
        assert!(parse_section::<Sample>("[other]\n", "sample", path)
            .unwrap()
            .is_none());
        assert!(matches!(
            parse_section::<Sample>("[sample\n", "sample", path),
            Err(ConfigError::ParseError(_, _))
        ));
    }

    #[test]
    fn explicit_file_must_contain_section() {
        let good = temp_file("good", "[sample]\nrate = 48000\n");
        let (cfg, found) = Sample::load(Some(&good)).unwrap();
        assert_eq!(cfg.rate, 48_000);
        assert_eq!(found.as_deref(), Some(good.as_path()));

        let bad = temp_file("bad", "[nope]\n");
        assert!(Sample::load_from_file(&bad).is_err());

        std::fs::remove_file(good).unwrap();
        std::fs::remove_file(bad).unwrap();
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Sample::load_from_file(Path::new("/nonexistent/sigforge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_, _)));
    }

    #[test]
    fn search_paths_end_in_etc() {
        let paths = config_search_paths();
        assert_eq!(paths[0], PathBuf::from("sigforge.toml"));
        assert_eq!(
            paths.last(),
            Some(&PathBuf::from("/etc/sigforge/sigforge.toml"))
        );
    }
}
