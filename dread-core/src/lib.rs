//! Story generation and delivery core for an AI-driven horror game.
//!
//! This crate provides:
//! - A generation orchestrator with first-chunk and total deadlines,
//!   exponential-backoff retries and caller cancellation
//! - An append-only story log with hidden seeds and HP/SAN totals
//! - Marker stripping, seed extraction and choice-menu parsing
//! - Sessions that feed generated text into a sanity-aware typewriter
//!
//! # Quick Start
//!
//! ```ignore
//! use dread_core::{StoryGenerator, StorySession, TurnOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let generator = StoryGenerator::default().with_provider(Arc::new(my_provider));
//!     let session = StorySession::new(Arc::new(generator), Arc::new(my_presenter));
//!
//!     let turn = session.play_opening(TurnOptions::new()).await?;
//!     turn.finished().await;
//!     println!("{:?}", turn.result.choices);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod generator;
pub mod prompt;
pub mod provider;
pub mod session;
pub mod story;
pub mod testing;

// Primary public API
pub use config::{ConfigError, CoreConfig};
pub use generator::{
    CancelReason, CancelToken, ChoiceSyntax, GenerateError, GenerationResult, GeneratorConfig, StoryGenerator,
    TurnOptions,
};
pub use prompt::{DefaultPrompts, GameConfig, Language, Prompt, PromptBuilder};
pub use provider::{ChatMessage, ChunkStream, Provider, ProviderError, ProviderResponse, Role};
pub use session::{Presenter, SessionError, StorySession, TurnPlayback};
pub use story::{HiddenSeed, SeedCategory, SeedId, StorySegment, StoryState};
pub use testing::{RecordingPresenter, Reply, ScriptedProvider};

pub use typewriter::{Typewriter, TypewriterConfig, TypewriterState};
