//! Typewriter playback for narrative text.
//!
//! This crate reveals a growing text buffer one character at a time:
//! - Base pacing derived from a characters-per-second range
//! - Extra pauses after punctuation and line breaks
//! - Randomised speed excursions while sanity is low
//! - Character-level corruption (repeats and drops) while sanity is very low
//!
//! # Example
//!
//! ```ignore
//! use typewriter::{Typewriter, TypewriterConfig};
//!
//! let typewriter = Typewriter::new(TypewriterConfig::default().with_sanity(35));
//! typewriter.on_char(|c| print!("{c}"));
//! typewriter.append("The corridor breathes.");
//! typewriter.start();
//! typewriter.finished().await;
//! ```

pub mod config;
pub mod engine;
pub mod glitch;
pub mod rng;
pub mod speed;

pub use config::TypewriterConfig;
pub use engine::{Typewriter, TypewriterState};
pub use glitch::{apply_text_glitch, Glitch, GLITCH_THRESHOLD};
pub use rng::{RandomSource, SequenceSource, StdSource};
pub use speed::{SpeedMode, SpeedVariation, SPEED_VARIATION_THRESHOLD};
