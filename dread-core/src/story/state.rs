//! The append-only story log.

use super::seed::{HiddenSeed, SeedId};
use super::segment::StorySegment;
use serde::{Deserialize, Serialize};

/// Starting (and maximum) value for HP and SAN.
pub const MAX_VITAL: i32 = 100;

/// Ordered story segments, planted seeds, and the HP/SAN totals.
///
/// The turn counter is the number of committed segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryState {
    segments: Vec<StorySegment>,
    seeds: Vec<HiddenSeed>,
    hp: i32,
    san: i32,
}

impl Default for StoryState {
    fn default() -> Self {
        Self::new()
    }
}

impl StoryState {
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            seeds: Vec::new(),
            hp: MAX_VITAL,
            san: MAX_VITAL,
        }
    }

    /// Number of committed turns.
    pub fn turn(&self) -> u32 {
        u32::try_from(self.segments.len()).unwrap_or(u32::MAX)
    }

    pub fn segments(&self) -> &[StorySegment] {
        &self.segments
    }

    pub fn last_segment(&self) -> Option<&StorySegment> {
        self.segments.last()
    }

    pub fn seeds(&self) -> &[HiddenSeed] {
        &self.seeds
    }

    pub fn hp(&self) -> i32 {
        self.hp
    }

    pub fn san(&self) -> i32 {
        self.san
    }

    /// SAN as a 0-100 typewriter input.
    pub fn sanity(&self) -> u8 {
        u8::try_from(self.san.clamp(0, MAX_VITAL)).unwrap_or(0)
    }

    /// Append a finished segment together with the seeds found in it.
    /// Returns the new turn count.
    pub fn commit_turn(&mut self, segment: StorySegment, seeds: Vec<HiddenSeed>) -> u32 {
        self.seeds.extend(seeds);
        self.segments.push(segment);
        self.turn()
    }

    /// Append a segment on its own.
    pub fn append_segment(&mut self, segment: StorySegment) -> u32 {
        self.commit_turn(segment, Vec::new())
    }

    pub fn add_seed(&mut self, seed: HiddenSeed) {
        self.seeds.push(seed);
    }

    pub fn seed(&self, id: SeedId) -> Option<&HiddenSeed> {
        self.seeds.iter().find(|s| s.id == id)
    }

    /// Flag a seed as discovered. Returns false for an unknown id.
    pub fn mark_seed_discovered(&mut self, id: SeedId) -> bool {
        match self.seeds.iter_mut().find(|s| s.id == id) {
            Some(seed) => {
                seed.discovered = true;
                true
            }
            None => false,
        }
    }

    /// Undiscovered seeds whose trigger turn has arrived.
    pub fn due_seeds(&self, turn: u32) -> Vec<&HiddenSeed> {
        self.seeds.iter().filter(|s| s.is_due(turn)).collect()
    }

    /// Undiscovered seeds.
    pub fn pending_seeds(&self) -> impl Iterator<Item = &HiddenSeed> {
        self.seeds.iter().filter(|s| !s.discovered)
    }

    /// Text of the last `count` segments, oldest first, separated by blank lines.
    pub fn recent_context(&self, count: usize) -> String {
        let start = self.segments.len().saturating_sub(count);
        self.segments[start..]
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Apply HP/SAN changes, clamping both to 0..=100.
    pub fn adjust_vitals(&mut self, hp_delta: i32, san_delta: i32) {
        self.hp = self.hp.saturating_add(hp_delta).clamp(0, MAX_VITAL);
        self.san = self.san.saturating_add(san_delta).clamp(0, MAX_VITAL);
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::SeedCategory;

    fn segment(text: &str) -> StorySegment {
        StorySegment::new(text, Vec::new())
    }

    #[test]
    fn test_new_state() {
        let state = StoryState::new();
        assert_eq!(state.turn(), 0);
        assert_eq!(state.hp(), 100);
        assert_eq!(state.san(), 100);
        assert_eq!(state.recent_context(3), "");
    }

    #[test]
    fn test_turn_tracks_segment_count() {
        let mut state = StoryState::new();
        assert_eq!(state.append_segment(segment("one")), 1);
        let seed = HiddenSeed::new(SeedCategory::Item, "a locket", 1, 4);
        assert_eq!(state.commit_turn(segment("two"), vec![seed]), 2);
        assert_eq!(state.turn() as usize, state.segments().len());
        assert_eq!(state.seeds().len(), 1);
        assert_eq!(state.last_segment().map(|s| s.text.as_str()), Some("two"));
    }

    #[test]
    fn test_recent_context_window() {
        let mut state = StoryState::new();
        for text in ["a", "b", "c", "d"] {
            state.append_segment(segment(text));
        }
        assert_eq!(state.recent_context(3), "b\n\nc\n\nd");
        assert_eq!(state.recent_context(10), "a\n\nb\n\nc\n\nd");
        assert_eq!(state.segments().len(), 4);
    }

    #[test]
    fn test_seed_discovery() {
        let mut state = StoryState::new();
        let seed = HiddenSeed::new(SeedCategory::Location, "a sealed ward", 0, 3);
        let id = seed.id;
        state.add_seed(seed);

        assert!(state.due_seeds(2).is_empty());
        assert_eq!(state.due_seeds(3).len(), 1);
        assert!(state.mark_seed_discovered(id));
        assert!(state.due_seeds(3).is_empty());
        assert_eq!(state.pending_seeds().count(), 0);
        assert!(!state.mark_seed_discovered(SeedId::new()));
        assert!(state.seed(id).is_some_and(|s| s.discovered));
    }

    #[test]
    fn test_adjust_vitals_clamps() {
        let mut state = StoryState::new();
        state.adjust_vitals(-30, -85);
        assert_eq!((state.hp(), state.san()), (70, 15));
        assert_eq!(state.sanity(), 15);
        state.adjust_vitals(-100, 200);
        assert_eq!((state.hp(), state.san()), (0, 100));
    }

    #[test]
    fn test_json_snapshot_roundtrip() {
        let mut state = StoryState::new();
        state.commit_turn(
            StorySegment::new("The lift stops between floors.", vec!["Wait".into()]),
            vec![HiddenSeed::new(SeedCategory::Character, "a voice in the shaft", 0, 4)],
        );
        state.adjust_vitals(0, -10);

        let restored = StoryState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(restored, state);
    }
}
