//! Turn sessions: generation wired to typewriter playback.
//!
//! A [`StorySession`] runs one turn end to end. In buffered mode it waits for
//! the generator's cleaned text and then plays it. In live mode each streamed
//! chunk is filtered for markers and typed as it arrives; if an attempt fails
//! and a retry begins, the partial playback is discarded and a fresh
//! typewriter starts for the new attempt.

use crate::generator::{GenerateError, GenerationResult, LiveFilter, StoryGenerator, TurnOptions};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;
use typewriter::{Typewriter, TypewriterConfig, TypewriterState};

/// Errors from StorySession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Generation error: {0}")]
    Generate(#[from] GenerateError),

    #[error("No choice numbered {0} in the last turn")]
    UnknownChoice(usize),
}

/// Receives what a session shows.
pub trait Presenter: Send + Sync {
    /// A character has been revealed.
    fn on_char(&self, c: char);

    /// Playback of a turn finished.
    fn on_complete(&self, _state: TypewriterState) {}

    /// Everything shown since the last discard belonged to an abandoned
    /// attempt and should be cleared.
    fn on_discard(&self) {}
}

/// A turn's result and the typewriter playing it.
pub struct TurnPlayback {
    pub result: GenerationResult,
    pub typewriter: Arc<Typewriter>,
}

impl TurnPlayback {
    /// Wait for playback to finish.
    pub async fn finished(&self) -> TypewriterState {
        self.typewriter.finished().await
    }
}

enum SessionTurn<'a> {
    Opening,
    Choice(&'a str),
}

#[derive(Default)]
struct LiveTurn {
    attempt: Option<u32>,
    typewriter: Option<Arc<Typewriter>>,
    filter: LiveFilter,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn spawn_typewriter(config: &TypewriterConfig, sanity: u8, presenter: &Arc<dyn Presenter>) -> Arc<Typewriter> {
    let typewriter = Arc::new(Typewriter::new(config.clone().with_sanity(sanity)));
    let on_char = Arc::clone(presenter);
    typewriter.on_char(move |c| on_char.on_char(c));
    let on_complete = Arc::clone(presenter);
    typewriter.on_complete(move |state| on_complete.on_complete(state));
    typewriter
}

/// Runs turns against a shared generator and presents them.
pub struct StorySession {
    generator: Arc<StoryGenerator>,
    presenter: Arc<dyn Presenter>,
    typewriter: TypewriterConfig,
    live_typing: bool,
}

impl StorySession {
    pub fn new(generator: Arc<StoryGenerator>, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            generator,
            presenter,
            typewriter: TypewriterConfig::default(),
            live_typing: false,
        }
    }

    pub fn with_typewriter_config(mut self, config: TypewriterConfig) -> Self {
        self.typewriter = config;
        self
    }

    /// Type chunks as they stream instead of after the turn completes.
    pub fn with_live_typing(mut self, live: bool) -> Self {
        self.live_typing = live;
        self
    }

    pub fn generator(&self) -> &Arc<StoryGenerator> {
        &self.generator
    }

    pub fn is_live(&self) -> bool {
        self.live_typing
    }

    /// Choices offered by the last committed turn.
    pub fn choices(&self) -> Vec<String> {
        self.generator
            .with_story(|story| story.last_segment().map(|s| s.choices.clone()))
            .unwrap_or_default()
    }

    pub async fn play_opening(&self, options: TurnOptions) -> Result<TurnPlayback, SessionError> {
        self.play(SessionTurn::Opening, options).await
    }

    pub async fn play_choice(&self, choice: &str, options: TurnOptions) -> Result<TurnPlayback, SessionError> {
        self.play(SessionTurn::Choice(choice), options).await
    }

    /// Play the 1-based `number`th choice offered by the last turn.
    pub async fn play_choice_number(
        &self,
        number: usize,
        options: TurnOptions,
    ) -> Result<TurnPlayback, SessionError> {
        let choice = number
            .checked_sub(1)
            .and_then(|i| self.choices().into_iter().nth(i))
            .ok_or(SessionError::UnknownChoice(number))?;
        self.play(SessionTurn::Choice(&choice), options).await
    }

    async fn play(&self, turn: SessionTurn<'_>, options: TurnOptions) -> Result<TurnPlayback, SessionError> {
        let sanity = self.generator.with_story(|story| story.sanity());
        if self.live_typing {
            self.play_live(turn, options, sanity).await
        } else {
            let result = self.generate(turn, options).await?;
            let typewriter = spawn_typewriter(&self.typewriter, sanity, &self.presenter);
            typewriter.append(&result.text);
            typewriter.start();
            Ok(TurnPlayback { result, typewriter })
        }
    }

    async fn generate(&self, turn: SessionTurn<'_>, options: TurnOptions) -> Result<GenerationResult, GenerateError> {
        match turn {
            SessionTurn::Opening => self.generator.generate_opening(options).await,
            SessionTurn::Choice(choice) => self.generator.generate_continuation(choice, options).await,
        }
    }

    async fn play_live(
        &self,
        turn: SessionTurn<'_>,
        options: TurnOptions,
        sanity: u8,
    ) -> Result<TurnPlayback, SessionError> {
        let live = Arc::new(Mutex::new(LiveTurn::default()));

        let on_chunk = {
            let live = Arc::clone(&live);
            let presenter = Arc::clone(&self.presenter);
            let config = self.typewriter.clone();
            let forward = options.on_chunk.clone();
            move |attempt: u32, chunk: &str| {
                if let Some(forward) = &forward {
                    forward(attempt, chunk);
                }

                let mut live = lock(&live);
                if live.attempt != Some(attempt) {
                    if let Some(abandoned) = live.typewriter.take() {
                        debug!(attempt, "discarding live playback from failed attempt");
                        abandoned.discard();
                        presenter.on_discard();
                    }
                    let typewriter = spawn_typewriter(&config, sanity, &presenter);
                    typewriter.hold_open();
                    typewriter.start();
                    live.attempt = Some(attempt);
                    live.typewriter = Some(typewriter);
                    live.filter = LiveFilter::new();
                }

                let visible = live.filter.push(chunk);
                if let Some(typewriter) = &live.typewriter {
                    typewriter.append(&visible);
                }
            }
        };
        let options = TurnOptions {
            cancel: options.cancel,
            on_chunk: Some(Arc::new(on_chunk)),
        };

        let outcome = self.generate(turn, options).await;
        let (typewriter, tail) = {
            let mut live = lock(&live);
            let tail = live.filter.finish();
            (live.typewriter.take(), tail)
        };

        match outcome {
            Ok(result) => {
                let typewriter = match typewriter {
                    Some(typewriter) => {
                        typewriter.append(&tail);
                        typewriter
                    }
                    None => {
                        let typewriter = spawn_typewriter(&self.typewriter, sanity, &self.presenter);
                        typewriter.append(&result.text);
                        typewriter.start();
                        typewriter
                    }
                };
                typewriter.seal();
                Ok(TurnPlayback { result, typewriter })
            }
            Err(err) => {
                if let Some(abandoned) = typewriter {
                    abandoned.discard();
                    self.presenter.on_discard();
                }
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingPresenter, Reply, ScriptedProvider};

    #[tokio::test(start_paused = true)]
    async fn test_unknown_choice_number() {
        let generator = Arc::new(StoryGenerator::default());
        let session = StorySession::new(generator, Arc::new(RecordingPresenter::new()));
        assert!(session.choices().is_empty());
        let err = session.play_choice_number(1, TurnOptions::new()).await.err();
        assert!(matches!(err, Some(SessionError::UnknownChoice(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffered_turn_plays_clean_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![Reply::text(
            "Rain on the skylight. [MOOD:rain]\n\nChoices:\n1. Look up\n2. Look away",
        )]));
        let generator = Arc::new(StoryGenerator::default().with_provider(provider));
        let presenter = Arc::new(RecordingPresenter::new());
        let session = StorySession::new(generator, presenter.clone());

        let playback = session.play_opening(TurnOptions::new()).await.unwrap();
        assert_eq!(playback.finished().await, TypewriterState::Done);
        assert_eq!(presenter.shown(), playback.result.text);
        assert_eq!(session.choices(), vec!["Look up", "Look away"]);
        assert_eq!(playback.result.moods, vec!["rain"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_choice_number_uses_offered_choice() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Reply::text("Two doors.\n\nChoices:\n1. Red door\n2. Blue door"),
            Reply::text("The blue door is cold."),
        ]));
        let generator = Arc::new(StoryGenerator::default().with_provider(provider.clone()));
        let session = StorySession::new(generator, Arc::new(RecordingPresenter::new()))
            .with_typewriter_config(TypewriterConfig::default().disabled());

        session.play_opening(TurnOptions::new()).await.unwrap();
        session.play_choice_number(2, TurnOptions::new()).await.unwrap();

        let requests = provider.requests();
        assert!(requests[1][1].content.contains("Blue door"));
    }
}
