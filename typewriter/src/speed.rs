//! Speed variation model.
//!
//! Below [`SPEED_VARIATION_THRESHOLD`] sanity the reveal speed wanders: a mode
//! is rolled, held for a while, then rolled again.
//!
//! | roll        | mode   | per-character delay | held for      |
//! |-------------|--------|---------------------|---------------|
//! | `< 0.10`    | fast   | 6-10 ms             | 0.5-1.5 s     |
//! | `< 0.20`    | slow   | 50-100 ms           | 0.5-1.5 s     |
//! | `< 0.25`    | stuck  | one 200-500 ms stop | one character |
//! | otherwise   | normal | base delay          | 2-5 s         |

use crate::config::TypewriterConfig;
use crate::rng::RandomSource;
use std::time::Duration;
use tokio::time::Instant;

/// Sanity below which speed variation is active.
pub const SPEED_VARIATION_THRESHOLD: u8 = 40;

const FAST_CHANCE: f64 = 0.10;
const SLOW_CHANCE: f64 = 0.10;
const STUCK_CHANCE: f64 = 0.05;

/// Current pacing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedMode {
    /// Base delay.
    Normal,
    /// Rapid burst.
    Fast { per_char: Duration },
    /// Dragging crawl.
    Slow { per_char: Duration },
    /// A single long stop.
    Stuck { pause: Duration },
}

impl SpeedMode {
    pub fn name(&self) -> &'static str {
        match self {
            SpeedMode::Normal => "normal",
            SpeedMode::Fast { .. } => "fast",
            SpeedMode::Slow { .. } => "slow",
            SpeedMode::Stuck { .. } => "stuck",
        }
    }
}

/// Roll a new mode and how long it should be held.
///
/// The only side effect is consuming samples from `rng`.
pub fn roll_mode(rng: &mut dyn RandomSource) -> (SpeedMode, Duration) {
    let roll = rng.next_f64();
    if roll < FAST_CHANCE {
        let per_char = Duration::from_millis(rng.range_u64(6, 10));
        let hold = Duration::from_millis(rng.range_u64(500, 1500));
        (SpeedMode::Fast { per_char }, hold)
    } else if roll < FAST_CHANCE + SLOW_CHANCE {
        let per_char = Duration::from_millis(rng.range_u64(50, 100));
        let hold = Duration::from_millis(rng.range_u64(500, 1500));
        (SpeedMode::Slow { per_char }, hold)
    } else if roll < FAST_CHANCE + SLOW_CHANCE + STUCK_CHANCE {
        let pause = Duration::from_millis(rng.range_u64(200, 500));
        (SpeedMode::Stuck { pause }, Duration::ZERO)
    } else {
        let hold = Duration::from_millis(rng.range_u64(2000, 5000));
        (SpeedMode::Normal, hold)
    }
}

/// Per-turn speed modulation state.
#[derive(Debug, Clone)]
pub struct SpeedVariation {
    mode: SpeedMode,
    duration: Duration,
    started: Instant,
}

impl SpeedVariation {
    /// Fresh state; the first delay request rolls a mode.
    pub fn new(now: Instant) -> Self {
        Self {
            mode: SpeedMode::Normal,
            duration: Duration::ZERO,
            started: now,
        }
    }

    pub fn mode(&self) -> SpeedMode {
        self.mode
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Time left before the next re-roll.
    pub fn remaining(&self, now: Instant) -> Duration {
        (self.started + self.duration).saturating_duration_since(now)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.started + self.duration
    }

    /// Delay for the next character under the current mode, re-rolling first
    /// if the mode has run out.
    pub fn next_delay(&mut self, now: Instant, base: Duration, rng: &mut dyn RandomSource) -> Duration {
        if self.is_expired(now) {
            let (mode, duration) = roll_mode(rng);
            self.mode = mode;
            self.duration = duration;
            self.started = now;
        }

        match self.mode {
            SpeedMode::Normal => base,
            SpeedMode::Fast { per_char } | SpeedMode::Slow { per_char } => per_char,
            SpeedMode::Stuck { pause } => {
                // Stuck covers one character only.
                self.duration = Duration::ZERO;
                pause
            }
        }
    }
}

/// Whether a character earns the punctuation pause.
pub fn is_punctuation(c: char) -> bool {
    matches!(
        c,
        '.' | ',' | '!' | '?' | ';' | ':' | '…' | '—' | '，' | '。' | '！' | '？' | '；' | '：' | '、'
    )
}

/// Fixed extra pause after `c`, applied in every mode.
pub fn pause_after(c: char, config: &TypewriterConfig) -> Duration {
    if c == '\n' {
        config.paragraph_delay
    } else if is_punctuation(c) {
        config.punctuation_delay
    } else {
        Duration::ZERO
    }
}
