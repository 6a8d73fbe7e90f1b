//! Committed story turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One committed turn of narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySegment {
    /// Display text with markers removed.
    pub text: String,
    /// Menu choices parsed from the text.
    pub choices: Vec<String>,
    /// HP change attributed to this turn, set by the caller.
    pub hp_delta: i32,
    /// SAN change attributed to this turn, set by the caller.
    pub san_delta: i32,
    pub created_at: DateTime<Utc>,
}

impl StorySegment {
    pub fn new(text: impl Into<String>, choices: Vec<String>) -> Self {
        Self {
            text: text.into(),
            choices,
            hp_delta: 0,
            san_delta: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_deltas(mut self, hp_delta: i32, san_delta: i32) -> Self {
        self.hp_delta = hp_delta;
        self.san_delta = san_delta;
        self
    }
}
