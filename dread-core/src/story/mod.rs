//! Story log data model: committed segments, hidden seeds, and vitals.

mod seed;
mod segment;
mod state;

pub use seed::{HiddenSeed, SeedCategory, SeedId};
pub use segment::StorySegment;
pub use state::{StoryState, MAX_VITAL};
