//! Hidden narrative seeds.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedId(Uuid);

impl SeedId {
    /// Create a new unique seed ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SeedId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of element a seed plants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeedCategory {
    Item,
    Event,
    Character,
    Location,
}

impl SeedCategory {
    /// Parse a category tag in English (any case) or Chinese.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "item" | "物品" => Some(SeedCategory::Item),
            "event" | "事件" => Some(SeedCategory::Event),
            "character" | "角色" => Some(SeedCategory::Character),
            "location" | "地点" => Some(SeedCategory::Location),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SeedCategory::Item => "Item",
            SeedCategory::Event => "Event",
            SeedCategory::Character => "Character",
            SeedCategory::Location => "Location",
        }
    }
}

/// A narrative element planted now and meant to surface at a later turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenSeed {
    pub id: SeedId,
    pub category: SeedCategory,
    pub description: String,
    /// Turn at which the seed was planted.
    pub planted_turn: u32,
    /// Turn at which the seed should surface; never before `planted_turn`.
    pub trigger_turn: u32,
    pub discovered: bool,
}

impl HiddenSeed {
    pub fn new(
        category: SeedCategory,
        description: impl Into<String>,
        planted_turn: u32,
        trigger_turn: u32,
    ) -> Self {
        Self {
            id: SeedId::new(),
            category,
            description: description.into(),
            planted_turn,
            trigger_turn: trigger_turn.max(planted_turn),
            discovered: false,
        }
    }

    /// Whether the seed is undiscovered and its trigger turn has arrived.
    pub fn is_due(&self, turn: u32) -> bool {
        !self.discovered && turn >= self.trigger_turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!(SeedCategory::parse("Item"), Some(SeedCategory::Item));
        assert_eq!(SeedCategory::parse(" LOCATION "), Some(SeedCategory::Location));
        assert_eq!(SeedCategory::parse("角色"), Some(SeedCategory::Character));
        assert_eq!(SeedCategory::parse("事件"), Some(SeedCategory::Event));
        assert_eq!(SeedCategory::parse("weapon"), None);
    }

    #[test]
    fn test_trigger_never_before_planting() {
        let seed = HiddenSeed::new(SeedCategory::Item, "a key", 5, 2);
        assert_eq!(seed.trigger_turn, 5);
    }

    #[test]
    fn test_is_due() {
        let mut seed = HiddenSeed::new(SeedCategory::Event, "a phone rings", 1, 4);
        assert!(!seed.is_due(3));
        assert!(seed.is_due(4));
        seed.discovered = true;
        assert!(!seed.is_due(9));
    }
}
