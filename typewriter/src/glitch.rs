//! Character-level corruption at very low sanity.

use crate::rng::RandomSource;

/// Sanity below which glitches can occur.
pub const GLITCH_THRESHOLD: u8 = 20;

/// What happens to a character about to be revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glitch {
    /// Reveal normally.
    None,
    /// Show the character an extra time before advancing.
    Repeat,
    /// Advance past the character without showing it.
    Drop,
}

/// Probability that a character glitches, scaling linearly from zero at the
/// threshold to `max_chance` at zero sanity.
pub fn glitch_chance(sanity: u8, max_chance: f64) -> f64 {
    if sanity >= GLITCH_THRESHOLD {
        return 0.0;
    }
    let depth = f64::from(GLITCH_THRESHOLD - sanity) / f64::from(GLITCH_THRESHOLD);
    (max_chance * depth).clamp(0.0, 1.0)
}

/// Roll the glitch for one character. At most one outcome applies, and
/// whitespace is never corrupted.
pub fn apply_text_glitch(c: char, sanity: u8, max_chance: f64, rng: &mut dyn RandomSource) -> Glitch {
    if sanity >= GLITCH_THRESHOLD || c.is_whitespace() {
        return Glitch::None;
    }

    let chance = glitch_chance(sanity, max_chance);
    let roll = rng.next_f64();
    if roll < chance / 2.0 {
        Glitch::Repeat
    } else if roll < chance {
        Glitch::Drop
    } else {
        Glitch::None
    }
}
