//! Typewriter configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a typewriter instance.
///
/// Durations are (de)serialised as whole milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypewriterConfig {
    /// When false, playback reveals characters without any pacing.
    pub enabled: bool,

    /// Slowest nominal speed.
    pub min_chars_per_second: f64,

    /// Fastest nominal speed.
    pub max_chars_per_second: f64,

    /// Extra pause after punctuation.
    #[serde(with = "millis")]
    pub punctuation_delay: Duration,

    /// Extra pause after a line break.
    #[serde(with = "millis")]
    pub paragraph_delay: Duration,

    /// Whether `render` appends a cursor glyph while playing.
    pub show_cursor: bool,

    /// Glyph used for the cursor.
    pub cursor_glyph: char,

    /// Sanity at the start of playback (0-100).
    pub sanity: u8,

    /// How long an exhausted buffer waits for more text before finishing.
    #[serde(with = "millis")]
    pub drain_grace: Duration,

    /// Glitch probability at zero sanity.
    pub max_glitch_chance: f64,
}

impl Default for TypewriterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_chars_per_second: 40.0,
            max_chars_per_second: 60.0,
            punctuation_delay: Duration::from_millis(120),
            paragraph_delay: Duration::from_millis(250),
            show_cursor: true,
            cursor_glyph: '▌',
            sanity: 100,
            drain_grace: Duration::from_millis(300),
            max_glitch_chance: 0.3,
        }
    }
}

impl TypewriterConfig {
    /// Delay per character before any modulation: the reciprocal of the
    /// average configured speed.
    pub fn base_delay(&self) -> Duration {
        let average = (self.min_chars_per_second + self.max_chars_per_second) / 2.0;
        if !average.is_finite() || average <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(1.0 / average)
    }

    /// Reveal everything without pacing.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_speed(mut self, min_cps: f64, max_cps: f64) -> Self {
        self.min_chars_per_second = min_cps.min(max_cps);
        self.max_chars_per_second = max_cps.max(min_cps);
        self
    }

    pub fn with_sanity(mut self, sanity: u8) -> Self {
        self.sanity = sanity.min(100);
        self
    }

    pub fn with_punctuation_delay(mut self, delay: Duration) -> Self {
        self.punctuation_delay = delay;
        self
    }

    pub fn with_paragraph_delay(mut self, delay: Duration) -> Self {
        self.paragraph_delay = delay;
        self
    }

    pub fn with_cursor(mut self, show: bool) -> Self {
        self.show_cursor = show;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }
}

/// Serde adapter storing a `Duration` as integer milliseconds.
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_delay_uses_average_speed() {
        let config = TypewriterConfig::default().with_speed(40.0, 60.0);
        assert_eq!(config.base_delay(), Duration::from_millis(20));
    }

    #[test]
    fn test_base_delay_zero_speed() {
        let config = TypewriterConfig::default().with_speed(0.0, 0.0);
        assert_eq!(config.base_delay(), Duration::ZERO);
    }

    #[test]
    fn test_with_speed_orders_bounds() {
        let config = TypewriterConfig::default().with_speed(80.0, 20.0);
        assert_eq!(config.min_chars_per_second, 20.0);
        assert_eq!(config.max_chars_per_second, 80.0);
    }

    #[test]
    fn test_deserialize_partial_config_in_millis() {
        let config: TypewriterConfig =
            serde_json::from_str(r#"{ "sanity": 15, "punctuation_delay": 90 }"#).unwrap();
        assert_eq!(config.sanity, 15);
        assert_eq!(config.punctuation_delay, Duration::from_millis(90));
        assert_eq!(config.paragraph_delay, Duration::from_millis(250));
        assert!(config.enabled);
    }
}
