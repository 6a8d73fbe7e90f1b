//! Top-level configuration.
//!
//! Defaults are applied once at construction. Values can then be overlaid
//! from JSON or from `DREAD_*` environment variables:
//!
//! | variable                          | field                                   |
//! |-----------------------------------|-----------------------------------------|
//! | `DREAD_MAX_ATTEMPTS`              | `generator.max_attempts`                |
//! | `DREAD_FIRST_CHUNK_TIMEOUT_MS`    | `generator.first_chunk_timeout`         |
//! | `DREAD_TOTAL_TIMEOUT_MS`          | `generator.total_timeout`               |
//! | `DREAD_BACKOFF_BASE_MS`           | `generator.backoff_base`                |
//! | `DREAD_CONTEXT_SEGMENTS`          | `generator.context_segments`            |
//! | `DREAD_TYPEWRITER`                | `typewriter.enabled`                    |
//! | `DREAD_CPS_MIN` / `DREAD_CPS_MAX` | `typewriter.*_chars_per_second`         |
//! | `DREAD_SANITY`                    | `typewriter.sanity`                     |
//! | `DREAD_SHOW_CURSOR`               | `typewriter.show_cursor`                |
//! | `DREAD_LIVE_TYPING`               | `live_typing`                           |
//! | `DREAD_LANGUAGE`                  | `game.language` (`en` / `zh`)           |

use crate::generator::GeneratorConfig;
use crate::prompt::{GameConfig, Language};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use typewriter::TypewriterConfig;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the core needs to run a story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub generator: GeneratorConfig,
    pub typewriter: TypewriterConfig,
    pub game: GameConfig,
    /// Type streamed chunks as they arrive.
    pub live_typing: bool,
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse::<u64>(key, value).map(Duration::from_millis)
}

fn parse_language(key: &str, value: &str) -> Result<Language, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "en" | "english" => Ok(Language::English),
        "zh" | "chinese" | "中文" => Ok(Language::Chinese),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl CoreConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay values from any key lookup; unset keys are left alone.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |key: &'static str| lookup(key).map(|value| (key, value));

        if let Some((key, value)) = get("DREAD_MAX_ATTEMPTS") {
            self.generator.max_attempts = parse::<u32>(key, &value)?.max(1);
        }
        if let Some((key, value)) = get("DREAD_FIRST_CHUNK_TIMEOUT_MS") {
            self.generator.first_chunk_timeout = parse_millis(key, &value)?;
        }
        if let Some((key, value)) = get("DREAD_TOTAL_TIMEOUT_MS") {
            self.generator.total_timeout = parse_millis(key, &value)?;
        }
        if let Some((key, value)) = get("DREAD_BACKOFF_BASE_MS") {
            self.generator.backoff_base = parse_millis(key, &value)?;
        }
        if let Some((key, value)) = get("DREAD_CONTEXT_SEGMENTS") {
            self.generator.context_segments = parse(key, &value)?;
        }
        if let Some((key, value)) = get("DREAD_TYPEWRITER") {
            self.typewriter.enabled = parse_bool(key, &value)?;
        }
        if let Some((key, value)) = get("DREAD_CPS_MIN") {
            self.typewriter.min_chars_per_second = parse(key, &value)?;
        }
        if let Some((key, value)) = get("DREAD_CPS_MAX") {
            self.typewriter.max_chars_per_second = parse(key, &value)?;
        }
        if let Some((key, value)) = get("DREAD_SANITY") {
            self.typewriter.sanity = parse::<u8>(key, &value)?.min(100);
        }
        if let Some((key, value)) = get("DREAD_SHOW_CURSOR") {
            self.typewriter.show_cursor = parse_bool(key, &value)?;
        }
        if let Some((key, value)) = get("DREAD_LIVE_TYPING") {
            self.live_typing = parse_bool(key, &value)?;
        }
        if let Some((key, value)) = get("DREAD_LANGUAGE") {
            self.game.language = parse_language(key, &value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_apply_vars_overlays_values() {
        let env = vars(&[
            ("DREAD_MAX_ATTEMPTS", "5"),
            ("DREAD_FIRST_CHUNK_TIMEOUT_MS", "1500"),
            ("DREAD_SANITY", "250"),
            ("DREAD_LIVE_TYPING", "yes"),
            ("DREAD_LANGUAGE", "zh"),
        ]);
        let mut config = CoreConfig::default();
        config.apply_vars(|key| env.get(key).cloned()).unwrap();

        assert_eq!(config.generator.max_attempts, 5);
        assert_eq!(config.generator.first_chunk_timeout, Duration::from_millis(1500));
        assert_eq!(config.generator.total_timeout, Duration::from_secs(30));
        assert_eq!(config.typewriter.sanity, 100);
        assert!(config.live_typing);
        assert_eq!(config.game.language, Language::Chinese);
    }

    #[test]
    fn test_invalid_value_names_key() {
        let env = vars(&[("DREAD_TYPEWRITER", "sometimes")]);
        let err = CoreConfig::default()
            .apply_vars(|key| env.get(key).cloned())
            .unwrap_err();
        assert!(err.to_string().contains("DREAD_TYPEWRITER"));
    }

    #[test]
    fn test_from_json_nested_defaults() {
        let config = CoreConfig::from_json(
            r#"{ "live_typing": true, "typewriter": { "sanity": 12 }, "generator": { "backoff_base": 250 } }"#,
        )
        .unwrap();
        assert!(config.live_typing);
        assert_eq!(config.typewriter.sanity, 12);
        assert_eq!(config.generator.backoff_base, Duration::from_millis(250));
        assert_eq!(config.generator.max_attempts, 3);
        assert_eq!(config.game, GameConfig::default());
    }
}
