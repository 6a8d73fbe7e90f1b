//! The typewriter engine.
//!
//! A [`Typewriter`] owns one turn's text buffer. `start` spawns a single
//! playback worker on the current Tokio runtime; that worker is the only
//! code that advances the display cursor during normal playback. Every other
//! accessor reads a snapshot under the same lock.
//!
//! Control signals (`pause`, `resume`, `skip`) flip the state field and wake
//! the worker through a [`Notify`], which holds at most one pending permit,
//! so sending a signal nobody is waiting for is harmless.

use crate::config::TypewriterConfig;
use crate::glitch::{apply_text_glitch, Glitch};
use crate::rng::{RandomSource, StdSource};
use crate::speed::{pause_after, SpeedVariation, SPEED_VARIATION_THRESHOLD};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

/// Playback lifecycle.
///
/// `Idle -> Playing -> {Paused <-> Playing} -> {Skipped | Done}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypewriterState {
    Idle,
    Playing,
    Paused,
    Skipped,
    Done,
}

impl TypewriterState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TypewriterState::Skipped | TypewriterState::Done)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TypewriterState::Playing | TypewriterState::Paused)
    }
}

type CharCallback = Arc<dyn Fn(char) + Send + Sync>;
type CompleteCallback = Arc<dyn Fn(TypewriterState) + Send + Sync>;

struct Playback {
    buffer: Vec<char>,
    cursor: usize,
    displayed: String,
    state: TypewriterState,
    sanity: u8,
    held_open: bool,
    completed: bool,
}

struct Shared {
    config: TypewriterConfig,
    playback: Mutex<Playback>,
    /// Held while characters are handed to the per-character callback, so the
    /// worker and `skip` never interleave their output.
    emit: Mutex<()>,
    control: Notify,
    appended: Notify,
    state_tx: watch::Sender<TypewriterState>,
    on_char: Mutex<Option<CharCallback>>,
    on_complete: Mutex<Option<CompleteCallback>>,
}

enum Step {
    Revealed,
    Repeated,
    Dropped,
    Interrupted,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn set_state(&self, playback: &mut Playback, state: TypewriterState) {
        playback.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, c: char) {
        let callback = lock(&self.on_char).clone();
        if let Some(callback) = callback {
            callback(c);
        }
    }

    /// Fire the completion callback the first time a terminal state is reached.
    fn complete(&self, state: TypewriterState) {
        {
            let mut playback = lock(&self.playback);
            if playback.completed {
                return;
            }
            playback.completed = true;
        }
        let callback = lock(&self.on_complete).clone();
        if let Some(callback) = callback {
            callback(state);
        }
    }

    fn snapshot(&self) -> (TypewriterState, Option<(usize, char)>, u8) {
        let playback = lock(&self.playback);
        let next = playback
            .buffer
            .get(playback.cursor)
            .map(|&c| (playback.cursor, c));
        (playback.state, next, playback.sanity)
    }

    /// Reveal everything still buffered and move to `target`.
    ///
    /// Returns false when the current state is not one of `from`.
    fn drain(&self, target: TypewriterState, from: &[TypewriterState]) -> bool {
        let emit_guard = lock(&self.emit);
        let rest = {
            let mut playback = lock(&self.playback);
            if !from.contains(&playback.state) {
                return false;
            }
            let rest: Vec<char> = playback.buffer[playback.cursor..].to_vec();
            playback.cursor = playback.buffer.len();
            playback.displayed.extend(rest.iter());
            self.set_state(&mut playback, target);
            rest
        };
        self.control.notify_one();

        for c in rest {
            self.emit(c);
        }
        drop(emit_guard);

        self.complete(target);
        true
    }

    fn reveal(&self, index: usize, glitch: Glitch) -> Step {
        let emit_guard = lock(&self.emit);
        let c = {
            let mut playback = lock(&self.playback);
            if playback.state != TypewriterState::Playing || playback.cursor != index {
                return Step::Interrupted;
            }
            let Some(&c) = playback.buffer.get(index) else {
                return Step::Interrupted;
            };
            match glitch {
                Glitch::Drop => {
                    playback.cursor += 1;
                    return Step::Dropped;
                }
                Glitch::Repeat => playback.displayed.push(c),
                Glitch::None => {
                    playback.displayed.push(c);
                    playback.cursor += 1;
                }
            }
            c
        };
        self.emit(c);
        drop(emit_guard);

        if glitch == Glitch::Repeat {
            Step::Repeated
        } else {
            Step::Revealed
        }
    }

    fn finish_if_drained(&self) -> bool {
        {
            let mut playback = lock(&self.playback);
            if playback.state != TypewriterState::Playing
                || playback.held_open
                || playback.cursor < playback.buffer.len()
            {
                return false;
            }
            self.set_state(&mut playback, TypewriterState::Done);
        }
        self.complete(TypewriterState::Done);
        true
    }

    fn char_delay(
        &self,
        c: char,
        sanity: u8,
        variation: &mut SpeedVariation,
        rng: &mut dyn RandomSource,
    ) -> Duration {
        if !self.config.enabled {
            return Duration::ZERO;
        }
        let base = self.config.base_delay();
        let paced = if sanity < SPEED_VARIATION_THRESHOLD {
            variation.next_delay(Instant::now(), base, rng)
        } else {
            base
        };
        paced + pause_after(c, &self.config)
    }
}

/// The playback worker.
async fn run(shared: Arc<Shared>, mut rng: Box<dyn RandomSource>) {
    let mut variation = SpeedVariation::new(Instant::now());
    let mut repeated_at: Option<usize> = None;

    loop {
        let (state, next, sanity) = shared.snapshot();
        match state {
            TypewriterState::Playing => {}
            TypewriterState::Paused => {
                shared.control.notified().await;
                continue;
            }
            _ => return,
        }

        let Some((index, c)) = next else {
            if !shared.config.enabled && shared.finish_if_drained() {
                return;
            }
            // Buffer exhausted for now; live text may still be arriving.
            tokio::select! {
                _ = shared.appended.notified() => {}
                _ = shared.control.notified() => {}
                _ = time::sleep(shared.config.drain_grace) => {
                    if shared.finish_if_drained() {
                        return;
                    }
                }
            }
            continue;
        };

        let delay = shared.char_delay(c, sanity, &mut variation, rng.as_mut());
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shared.control.notified() => continue,
            }
        }

        let glitch = if !shared.config.enabled || repeated_at == Some(index) {
            Glitch::None
        } else {
            apply_text_glitch(c, sanity, shared.config.max_glitch_chance, rng.as_mut())
        };

        match shared.reveal(index, glitch) {
            Step::Repeated => repeated_at = Some(index),
            Step::Dropped => debug!(index, "glitch dropped a character"),
            Step::Revealed | Step::Interrupted => {}
        }
    }
}

/// Handle to one turn's typewriter playback.
///
/// Callbacks run on the playback worker (or on the caller of `skip`) and must
/// not call `skip` themselves.
pub struct Typewriter {
    shared: Arc<Shared>,
    rng: Mutex<Option<Box<dyn RandomSource>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Typewriter {
    /// Create a typewriter with an entropy-seeded random source.
    pub fn new(config: TypewriterConfig) -> Self {
        Self::with_rng(config, Box::new(StdSource::from_entropy()))
    }

    /// Create a typewriter with an explicit random source.
    pub fn with_rng(config: TypewriterConfig, rng: Box<dyn RandomSource>) -> Self {
        let (state_tx, _) = watch::channel(TypewriterState::Idle);
        let sanity = config.sanity.min(100);
        Self {
            shared: Arc::new(Shared {
                config,
                playback: Mutex::new(Playback {
                    buffer: Vec::new(),
                    cursor: 0,
                    displayed: String::new(),
                    state: TypewriterState::Idle,
                    sanity,
                    held_open: false,
                    completed: false,
                }),
                emit: Mutex::new(()),
                control: Notify::new(),
                appended: Notify::new(),
                state_tx,
                on_char: Mutex::new(None),
                on_complete: Mutex::new(None),
            }),
            rng: Mutex::new(Some(rng)),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TypewriterConfig {
        &self.shared.config
    }

    /// Register the per-character callback.
    pub fn on_char<F>(&self, callback: F)
    where
        F: Fn(char) + Send + Sync + 'static,
    {
        *lock(&self.shared.on_char) = Some(Arc::new(callback));
    }

    /// Register the completion callback. It fires once, on Done or Skipped.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: Fn(TypewriterState) + Send + Sync + 'static,
    {
        *lock(&self.shared.on_complete) = Some(Arc::new(callback));
    }

    /// Add text to the pending buffer. Ignored once playback has ended.
    pub fn append(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        {
            let mut playback = lock(&self.shared.playback);
            if playback.state.is_terminal() {
                debug!(state = ?playback.state, "ignoring text appended after playback ended");
                return;
            }
            playback.buffer.extend(text.chars());
        }
        self.shared.appended.notify_one();
    }

    /// Begin playback. Only the first call from Idle has any effect.
    ///
    /// Without a Tokio runtime the buffer is revealed immediately.
    pub fn start(&self) {
        {
            let mut playback = lock(&self.shared.playback);
            if playback.state != TypewriterState::Idle {
                return;
            }
            self.shared.set_state(&mut playback, TypewriterState::Playing);
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime available, revealing text immediately");
            self.shared.drain(TypewriterState::Done, &[TypewriterState::Playing]);
            return;
        };

        let rng = lock(&self.rng)
            .take()
            .unwrap_or_else(|| Box::new(StdSource::from_entropy()));
        let worker = runtime.spawn(run(Arc::clone(&self.shared), rng));
        *lock(&self.worker) = Some(worker);
    }

    pub fn pause(&self) {
        self.transition(TypewriterState::Playing, TypewriterState::Paused);
    }

    pub fn resume(&self) {
        self.transition(TypewriterState::Paused, TypewriterState::Playing);
    }

    /// Reveal everything buffered right now through the per-character
    /// callback and end in Skipped. No-op unless Playing or Paused.
    pub fn skip(&self) {
        self.shared.drain(
            TypewriterState::Skipped,
            &[TypewriterState::Playing, TypewriterState::Paused],
        );
    }

    /// Abandon playback without revealing the rest or firing the completion
    /// callback.
    ///
    /// Waits for a character callback already in progress to return; once
    /// this returns, `on_char` is never called again.
    pub fn discard(&self) {
        let _emit = lock(&self.shared.emit);
        {
            let mut playback = lock(&self.shared.playback);
            if playback.state.is_terminal() {
                return;
            }
            playback.completed = true;
            self.shared.set_state(&mut playback, TypewriterState::Skipped);
        }
        self.shared.control.notify_one();
        if let Some(worker) = lock(&self.worker).take() {
            worker.abort();
        }
    }

    /// Keep playback alive through an exhausted buffer until `seal` is called.
    pub fn hold_open(&self) {
        let mut playback = lock(&self.shared.playback);
        if !playback.state.is_terminal() {
            playback.held_open = true;
        }
    }

    /// Release `hold_open`; playback finishes after the drain grace once the
    /// buffer runs dry.
    pub fn seal(&self) {
        lock(&self.shared.playback).held_open = false;
        self.shared.appended.notify_one();
    }

    /// Change the sanity used for the remaining characters.
    pub fn set_sanity(&self, sanity: u8) {
        lock(&self.shared.playback).sanity = sanity.min(100);
    }

    pub fn state(&self) -> TypewriterState {
        lock(&self.shared.playback).state
    }

    /// Percentage of buffered characters revealed; 100 for an empty buffer.
    pub fn progress(&self) -> f64 {
        let playback = lock(&self.shared.playback);
        if playback.buffer.is_empty() {
            return 100.0;
        }
        playback.cursor as f64 * 100.0 / playback.buffer.len() as f64
    }

    /// Everything appended so far.
    pub fn get_full(&self) -> String {
        lock(&self.shared.playback).buffer.iter().collect()
    }

    /// What the viewer has seen so far, glitches included.
    pub fn get_displayed(&self) -> String {
        lock(&self.shared.playback).displayed.clone()
    }

    /// Displayed text plus the cursor glyph while playback is active.
    pub fn render(&self) -> String {
        let playback = lock(&self.shared.playback);
        let mut out = playback.displayed.clone();
        if self.shared.config.show_cursor && playback.state.is_active() {
            out.push(self.shared.config.cursor_glyph);
        }
        out
    }

    /// Wait until playback reaches Done or Skipped.
    ///
    /// Never resolves for a typewriter that is never started.
    pub async fn finished(&self) -> TypewriterState {
        let mut rx = self.shared.state_tx.subscribe();
        let result = rx.wait_for(|state| state.is_terminal()).await.map(|state| *state);
        match result {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }

    fn transition(&self, from: TypewriterState, to: TypewriterState) {
        let changed = {
            let mut playback = lock(&self.shared.playback);
            if playback.state == from {
                self.shared.set_state(&mut playback, to);
                true
            } else {
                false
            }
        };
        if changed {
            self.shared.control.notify_one();
        }
    }
}

impl Drop for Typewriter {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            worker.abort();
        }
    }
}
