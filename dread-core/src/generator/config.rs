//! Generator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use typewriter::config::millis;

/// How a trailing choice menu is recognised.
///
/// A header line matching one of `headers` (case-insensitive, trailing colon
/// optional) followed by lines like `1. Open the door` or `2、离开`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoiceSyntax {
    pub headers: Vec<String>,
    pub separators: Vec<char>,
}

impl Default for ChoiceSyntax {
    fn default() -> Self {
        Self {
            headers: vec![
                "choices".to_string(),
                "options".to_string(),
                "选项".to_string(),
                "选择".to_string(),
            ],
            separators: vec!['.', '、'],
        }
    }
}

impl ChoiceSyntax {
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        if !self.separators.contains(&separator) {
            self.separators.push(separator);
        }
        self
    }

    pub(crate) fn is_header(&self, line: &str) -> bool {
        let label = line
            .trim()
            .trim_start_matches('#')
            .trim()
            .trim_matches('*')
            .trim()
            .trim_end_matches([':', '：'])
            .trim()
            .trim_matches('*')
            .trim()
            .to_lowercase();
        !label.is_empty() && self.headers.iter().any(|h| h.to_lowercase() == label)
    }
}

/// Retry, deadline and post-processing settings for [`StoryGenerator`](super::StoryGenerator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Total attempts per turn, including the first.
    pub max_attempts: u32,

    /// Maximum wait for the first non-empty chunk of an attempt.
    #[serde(with = "millis")]
    pub first_chunk_timeout: Duration,

    /// Hard limit on a single attempt.
    #[serde(with = "millis")]
    pub total_timeout: Duration,

    /// Backoff before attempt k is `backoff_base * 2^(k-1)`.
    #[serde(with = "millis")]
    pub backoff_base: Duration,

    /// Number of recent segments passed as context to continuation prompts.
    pub context_segments: usize,

    /// Seeds surface between `seed_offset_min` and `seed_offset_max` turns
    /// after they are planted.
    pub seed_offset_min: u32,
    pub seed_offset_max: u32,

    /// Capacity of the hand-off between a streaming attempt and its supervisor.
    pub chunk_buffer: usize,

    pub choices: ChoiceSyntax,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            first_chunk_timeout: Duration::from_secs(5),
            total_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            context_segments: 3,
            seed_offset_min: 3,
            seed_offset_max: 5,
            chunk_buffer: 64,
            choices: ChoiceSyntax::default(),
        }
    }
}

impl GeneratorConfig {
    /// Wait before the given attempt. Zero for the first attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.backoff_base.saturating_mul(factor)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_first_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.first_chunk_timeout = timeout;
        self
    }

    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_context_segments(mut self, segments: usize) -> Self {
        self.context_segments = segments;
        self
    }

    pub fn with_seed_offset(mut self, min: u32, max: u32) -> Self {
        self.seed_offset_min = min.min(max);
        self.seed_offset_max = max.max(min);
        self
    }

    pub fn with_choice_syntax(mut self, syntax: ChoiceSyntax) -> Self {
        self.choices = syntax;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let config = GeneratorConfig::default().with_backoff_base(Duration::from_millis(100));
        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates() {
        let config = GeneratorConfig::default();
        assert!(config.backoff_delay(200) >= config.backoff_delay(40));
    }

    #[test]
    fn test_header_matching() {
        let syntax = ChoiceSyntax::default();
        assert!(syntax.is_header("Choices:"));
        assert!(syntax.is_header("  CHOICES  "));
        assert!(syntax.is_header("**Options:**"));
        assert!(syntax.is_header("## 选项："));
        assert!(!syntax.is_header("Your choices are limited."));
        assert!(!syntax.is_header(""));
    }

    #[test]
    fn test_deserialize_durations_in_millis() {
        let config: GeneratorConfig =
            serde_json::from_str(r#"{ "max_attempts": 5, "first_chunk_timeout": 2500 }"#).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.first_chunk_timeout, Duration::from_millis(2500));
        assert_eq!(config.total_timeout, Duration::from_secs(30));
        assert_eq!(config.choices, ChoiceSyntax::default());
    }
}
