//! Story generation orchestrator.
//!
//! [`StoryGenerator`] turns one player decision into one committed story
//! segment: it builds the prompt, streams the provider under deadlines and
//! the retry policy, post-processes the text, and appends the result to the
//! story log. A turn either commits exactly one segment or changes nothing.

mod cancel;
mod config;
mod error;
pub mod postprocess;
mod retry;

pub use cancel::{CancelReason, CancelToken};
pub use config::{ChoiceSyntax, GeneratorConfig};
pub use error::GenerateError;
pub use postprocess::{LiveFilter, SeedMarker};

use crate::prompt::{DefaultPrompts, GameConfig, PromptBuilder};
use crate::provider::Provider;
use crate::story::{HiddenSeed, SeedId, StorySegment, StoryState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument};

/// Callback receiving each streamed chunk with its attempt number (0-based).
pub type ChunkCallback = Arc<dyn Fn(u32, &str) + Send + Sync>;

/// Per-call options.
#[derive(Clone, Default)]
pub struct TurnOptions {
    pub cancel: CancelToken,
    pub on_chunk: Option<ChunkCallback>,
}

impl TurnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_chunk<F>(mut self, callback: F) -> Self
    where
        F: Fn(u32, &str) + Send + Sync + 'static,
    {
        self.on_chunk = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for TurnOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnOptions")
            .field("cancel", &self.cancel)
            .field("on_chunk", &self.on_chunk.is_some())
            .finish()
    }
}

/// Output of one successful turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    /// Display text with markers removed.
    pub text: String,
    pub choices: Vec<String>,
    /// Seeds planted this turn, as recorded in the story log.
    pub seeds: Vec<HiddenSeed>,
    /// Mood tags for the audio layer.
    pub moods: Vec<String>,
    pub elapsed: Duration,
    /// Failed attempts before the one that succeeded.
    pub retries: u32,
    /// Turn count after this segment was committed.
    pub turn: u32,
}

enum TurnKind<'a> {
    Opening,
    Continuation(&'a str),
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Milliseconds in `duration`, saturating at `u64::MAX`.
fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// The generation orchestrator.
pub struct StoryGenerator {
    provider: RwLock<Option<Arc<dyn Provider>>>,
    prompts: RwLock<Arc<dyn PromptBuilder>>,
    game: RwLock<GameConfig>,
    config: GeneratorConfig,
    story: RwLock<StoryState>,
    in_flight: tokio::sync::Mutex<()>,
    rng: Mutex<StdRng>,
}

impl StoryGenerator {
    /// Create a generator with no provider and the default prompts.
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            provider: RwLock::new(None),
            prompts: RwLock::new(Arc::new(DefaultPrompts)),
            game: RwLock::new(GameConfig::default()),
            config,
            story: RwLock::new(StoryState::new()),
            in_flight: tokio::sync::Mutex::new(()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_provider(self, provider: Arc<dyn Provider>) -> Self {
        self.set_provider(provider);
        self
    }

    pub fn with_prompts(self, prompts: impl PromptBuilder + 'static) -> Self {
        self.set_prompts(prompts);
        self
    }

    pub fn with_game_config(self, game: GameConfig) -> Self {
        self.set_game_config(game);
        self
    }

    /// Make seed trigger offsets reproducible.
    pub fn with_rng_seed(self, seed: u64) -> Self {
        *lock(&self.rng) = StdRng::seed_from_u64(seed);
        self
    }

    pub fn set_provider(&self, provider: Arc<dyn Provider>) {
        *write(&self.provider) = Some(provider);
    }

    pub fn clear_provider(&self) {
        *write(&self.provider) = None;
    }

    pub fn has_provider(&self) -> bool {
        read(&self.provider).is_some()
    }

    pub fn set_prompts(&self, prompts: impl PromptBuilder + 'static) {
        *write(&self.prompts) = Arc::new(prompts);
    }

    pub fn set_game_config(&self, game: GameConfig) {
        *write(&self.game) = game;
    }

    pub fn game_config(&self) -> GameConfig {
        read(&self.game).clone()
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Snapshot of the story log.
    pub fn story(&self) -> StoryState {
        read(&self.story).clone()
    }

    /// Read the story log without cloning it.
    pub fn with_story<R>(&self, f: impl FnOnce(&StoryState) -> R) -> R {
        f(&read(&self.story))
    }

    /// Flag a seed as discovered. Returns false for an unknown id.
    pub fn mark_seed_discovered(&self, id: SeedId) -> bool {
        write(&self.story).mark_seed_discovered(id)
    }

    /// Apply HP/SAN changes to the story totals.
    pub fn adjust_vitals(&self, hp_delta: i32, san_delta: i32) {
        write(&self.story).adjust_vitals(hp_delta, san_delta);
    }

    /// Discard the story log and start a fresh one. Waits for any in-flight
    /// generation to finish first.
    pub async fn reset(&self) {
        let _turn = self.in_flight.lock().await;
        *write(&self.story) = StoryState::new();
        info!("story reset");
    }

    /// Replace the story log with a saved snapshot.
    pub async fn restore(&self, state: StoryState) {
        let _turn = self.in_flight.lock().await;
        *write(&self.story) = state;
    }

    /// Generate the first turn of the story.
    #[instrument(skip_all)]
    pub async fn generate_opening(&self, options: TurnOptions) -> Result<GenerationResult, GenerateError> {
        self.run_turn(TurnKind::Opening, options).await
    }

    /// Generate the turn that follows the player's `choice`.
    #[instrument(skip(self, options))]
    pub async fn generate_continuation(
        &self,
        choice: &str,
        options: TurnOptions,
    ) -> Result<GenerationResult, GenerateError> {
        self.run_turn(TurnKind::Continuation(choice), options).await
    }

    async fn run_turn(&self, kind: TurnKind<'_>, options: TurnOptions) -> Result<GenerationResult, GenerateError> {
        let _turn = self.in_flight.lock().await;
        let started = Instant::now();

        let provider = read(&self.provider).clone().ok_or(GenerateError::NoProvider)?;
        let prompt = {
            let prompts = read(&self.prompts).clone();
            let game = self.game_config();
            match kind {
                TurnKind::Opening => prompts.opening(&game),
                TurnKind::Continuation(choice) => {
                    let context = self.with_story(|story| story.recent_context(self.config.context_segments));
                    prompts.continuation(&game, &context, choice)
                }
            }
        };
        let messages = Arc::new(prompt.into_messages());

        let outcome = retry::generate_with_retry(provider, messages, &self.config, &options).await?;
        let processed = postprocess::process_response(&outcome.text, &self.config.choices);

        let (turn, seeds) = {
            let mut story = write(&self.story);
            let planted = story.turn();
            let seeds: Vec<HiddenSeed> = processed
                .seeds
                .into_iter()
                .map(|marker| {
                    let trigger = planted.saturating_add(self.seed_offset());
                    HiddenSeed::new(marker.category, marker.description, planted, trigger)
                })
                .collect();
            let segment = StorySegment::new(processed.text.clone(), processed.choices.clone());
            let turn = story.commit_turn(segment, seeds.clone());
            (turn, seeds)
        };

        let elapsed = started.elapsed();
        info!(
            turn,
            retries = outcome.retries,
            seeds = seeds.len(),
            elapsed_ms = whole_millis(elapsed),
            "committed story turn"
        );

        Ok(GenerationResult {
            text: processed.text,
            choices: processed.choices,
            seeds,
            moods: processed.moods,
            elapsed,
            retries: outcome.retries,
            turn,
        })
    }

    fn seed_offset(&self) -> u32 {
        let (min, max) = (self.config.seed_offset_min, self.config.seed_offset_max);
        if min >= max {
            return min;
        }
        lock(&self.rng).gen_range(min..=max)
    }
}

impl Default for StoryGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Reply, ScriptedProvider};

    fn generator(provider: &Arc<ScriptedProvider>) -> StoryGenerator {
        StoryGenerator::default()
            .with_provider(provider.clone())
            .with_rng_seed(1)
    }

    #[test]
    fn test_whole_millis_saturates() {
        assert_eq!(whole_millis(Duration::from_millis(1_250)), 1_250);
        assert_eq!(whole_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_provider() {
        let generator = StoryGenerator::default();
        assert!(!generator.has_provider());
        let err = generator.generate_opening(TurnOptions::new()).await.unwrap_err();
        assert_eq!(err, GenerateError::NoProvider);
        assert_eq!(generator.story().turn(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opening_commits_segment_and_seeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![Reply::text(
            "A bell rings twice. [SEED:Item:a brass bell]\n\nChoices:\n1. Follow the sound\n2. Stay",
        )]));
        let generator = generator(&provider);

        let result = generator.generate_opening(TurnOptions::new()).await.unwrap();
        assert_eq!(result.turn, 1);
        assert_eq!(result.retries, 0);
        assert_eq!(result.choices, vec!["Follow the sound", "Stay"]);
        assert!(!result.text.contains("[SEED"));
        assert_eq!(result.seeds.len(), 1);
        let seed = &result.seeds[0];
        assert_eq!(seed.planted_turn, 0);
        assert!((3..=5).contains(&seed.trigger_turn));

        let story = generator.story();
        assert_eq!(story.turn(), 1);
        assert_eq!(story.seeds(), result.seeds.as_slice());
        assert_eq!(story.segments()[0].text, result.text);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuation_sends_recent_context() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Reply::text("one"),
            Reply::text("two"),
            Reply::text("three"),
            Reply::text("four"),
            Reply::text("five"),
        ]));
        let generator = generator(&provider);
        generator.generate_opening(TurnOptions::new()).await.unwrap();
        for choice in ["a", "b", "c"] {
            generator.generate_continuation(choice, TurnOptions::new()).await.unwrap();
        }
        generator.generate_continuation("go left", TurnOptions::new()).await.unwrap();

        let request = provider.requests().pop().unwrap();
        let user = &request[1].content;
        assert!(user.contains("two\n\nthree\n\nfour"));
        assert!(!user.contains("one"));
        assert!(user.contains("go left"));
        assert_eq!(generator.story().turn(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_story() {
        let provider = Arc::new(ScriptedProvider::new(vec![Reply::text("first")]));
        let generator = generator(&provider);
        generator.generate_opening(TurnOptions::new()).await.unwrap();
        generator.adjust_vitals(0, -40);
        generator.reset().await;
        let story = generator.story();
        assert_eq!(story.turn(), 0);
        assert_eq!(story.san(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_continues_from_snapshot() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Reply::text("The lights fail."),
            Reply::text("Footsteps above."),
        ]));
        let generator = generator(&provider);
        generator.generate_opening(TurnOptions::new()).await.unwrap();
        let saved = StoryState::from_json(&generator.story().to_json().unwrap()).unwrap();

        generator.reset().await;
        generator.restore(saved).await;
        let result = generator.generate_continuation("wait", TurnOptions::new()).await.unwrap();
        assert_eq!(result.turn, 2);
        assert!(provider.requests()[1][1].content.contains("The lights fail."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hot_swap_provider() {
        let first = Arc::new(ScriptedProvider::new(vec![Reply::text("from first")]));
        let second = Arc::new(ScriptedProvider::new(vec![Reply::text("from second")]));
        let generator = generator(&first);
        generator.generate_opening(TurnOptions::new()).await.unwrap();

        generator.set_provider(second.clone());
        let result = generator.generate_continuation("next", TurnOptions::new()).await.unwrap();
        assert_eq!(result.text, "from second");
        assert_eq!(first.call_count(), 1);
        assert_eq!(second.call_count(), 1);

        generator.clear_provider();
        assert!(!generator.has_provider());
    }
}
