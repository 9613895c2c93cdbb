//! Host-facing facade. Owns every subsystem and routes commands between them.
//!
//! The host renders whatever [`GameUpdate`] comes back and calls
//! [`Game::tick`] often enough to run delayed steps (at least every
//! `question_tick_ms` while a session is running).

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::GameConfig;
use crate::events::{GameEvent, Screen, SessionResults};
use crate::math_facts::{Level, LEVELS};
use crate::preferences::{AnswerMode, Preferences, Theme};
use crate::progress::{ProgressDocument, ProgressStore};
use crate::session::{SessionEngine, SessionSnapshot};
use crate::stats::{self, LevelCard, MasteryFilter, MasteryGrid, StatsSummary};
use crate::storage::Storage;

/// Result of every command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    pub events: Vec<GameEvent>,
    pub snapshot: Option<SessionSnapshot>,
    pub coins: u64,
    pub screen: Screen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeSummary {
    pub levels: Vec<LevelCard>,
    pub coins: u64,
    pub preferences: Preferences,
    /// False when progress only lives in memory
    pub durable: bool,
}

pub struct Game {
    config: GameConfig,
    levels: &'static [Level],
    clock: Box<dyn Clock>,
    progress: ProgressStore,
    prefs: Preferences,
    engine: SessionEngine,
    screen: Screen,
    mastery_filter: MasteryFilter,
}

impl Game {
    /// Wall clock, default config, entropy-seeded shuffles
    pub fn new(storage: Storage) -> Self {
        Self::with_options(storage, Box::new(SystemClock), GameConfig::default(), None)
    }

    pub fn with_options(mut storage: Storage, clock: Box<dyn Clock>, config: GameConfig, seed: Option<u64>) -> Self {
        let prefs = Preferences::load(&mut storage, &config.storage_keys);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let levels: &'static [Level] = &LEVELS;

        let mut engine = SessionEngine::new(levels, config.clone(), rng);
        engine.set_answer_mode(prefs.answer_mode);
        engine.set_fast_mode(prefs.fast_mode);

        let progress = ProgressStore::new(storage, config.storage_keys.clone(), levels.len(), config.save_debounce_ms);
        log::debug!(
            "[PREFS] loaded mode={} fast={} theme={}",
            prefs.answer_mode.as_str(),
            prefs.fast_mode,
            prefs.theme.as_str()
        );

        Self {
            config,
            levels,
            clock,
            progress,
            prefs,
            engine,
            screen: Screen::Home,
            mastery_filter: MasteryFilter::default(),
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    fn navigate(&mut self, screen: Screen, events: &mut Vec<GameEvent>) {
        if self.screen != screen {
            self.screen = screen;
            events.push(GameEvent::Navigated(screen));
        }
    }

    fn finish(&mut self, mut events: Vec<GameEvent>) -> GameUpdate {
        if events.iter().any(|e| matches!(e, GameEvent::SessionCompleted(_))) {
            self.navigate(Screen::Results, &mut events);
        }
        let now = self.now();
        GameUpdate {
            snapshot: self.engine.snapshot(now),
            coins: self.progress.get().coins,
            screen: self.screen,
            events,
        }
    }

    // ==================== SESSION COMMANDS ====================

    /// Start `level` if it is open. Locked or unknown levels leave everything unchanged.
    pub fn start_level(&mut self, level: usize) -> GameUpdate {
        let now = self.now();
        let Some(session_events) = self.engine.start(level, &mut self.progress, now) else {
            return self.finish(Vec::new());
        };
        let mut events = Vec::new();
        self.navigate(Screen::Game, &mut events);
        events.extend(session_events);
        self.finish(events)
    }

    pub fn submit_answer(&mut self, raw: &str) -> GameUpdate {
        let now = self.now();
        let events = self.engine.submit(raw, &mut self.progress, now);
        self.finish(events)
    }

    pub fn submit_choice(&mut self, value: u32) -> GameUpdate {
        let now = self.now();
        let events = self.engine.submit_choice(value, &mut self.progress, now);
        self.finish(events)
    }

    /// Sanitized input value for the text field, plus any fast-mode submission
    pub fn input_changed(&mut self, raw: &str) -> (String, GameUpdate) {
        let now = self.now();
        let (value, events) = self.engine.input_changed(raw, &mut self.progress, now);
        (value, self.finish(events))
    }

    /// Leave the session (or results) for the home screen without recording level results
    pub fn quit_session(&mut self) -> GameUpdate {
        let mut events = Vec::new();
        if self.engine.quit(&mut self.progress) {
            self.navigate(Screen::Home, &mut events);
        }
        self.finish(events)
    }

    pub fn request_next_level(&mut self) -> GameUpdate {
        let next = self.engine.current_level() + 1;
        if next >= self.levels.len() {
            log::debug!("request_next_level: already on the last level");
            return self.finish(Vec::new());
        }
        self.start_level(next)
    }

    pub fn retry_current_level(&mut self) -> GameUpdate {
        self.start_level(self.engine.current_level())
    }

    /// Run every due scheduled step and any pending debounced save
    pub fn tick(&mut self) -> GameUpdate {
        let now = self.now();
        let events = self.engine.advance_to(now, &mut self.progress);
        self.progress.poll(now);
        self.finish(events)
    }

    /// Earliest time `tick` has work to do
    pub fn next_wakeup(&self) -> Option<u64> {
        match (self.engine.next_fire_at(), self.progress.save_due_at()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ==================== NAVIGATION ====================

    pub fn go_home(&mut self) -> GameUpdate {
        let mut events = Vec::new();
        self.engine.quit(&mut self.progress);
        self.navigate(Screen::Home, &mut events);
        self.finish(events)
    }

    pub fn show_stats(&mut self) -> GameUpdate {
        let mut events = Vec::new();
        self.engine.quit(&mut self.progress);
        self.navigate(Screen::Stats, &mut events);
        self.finish(events)
    }

    pub fn set_mastery_filter(&mut self, filter: MasteryFilter) -> MasteryGrid {
        self.mastery_filter = filter;
        stats::mastery_grid(self.progress.document(), filter)
    }

    /// Wipe progress and preferences, returning to a fresh home screen
    pub fn reset_all_progress(&mut self) -> GameUpdate {
        let mut events = Vec::new();
        self.engine.quit(&mut self.progress);
        self.progress.reset_all();
        self.prefs = Preferences::default();
        events.extend(self.engine.set_answer_mode(self.prefs.answer_mode));
        self.engine.set_fast_mode(self.prefs.fast_mode);
        self.navigate(Screen::Home, &mut events);
        self.finish(events)
    }

    // ==================== PREFERENCES ====================

    pub fn toggle_answer_mode(&mut self) -> GameUpdate {
        let mode = self.prefs.toggle_answer_mode(self.progress.storage_mut(), &self.config.storage_keys);
        let events = self.engine.set_answer_mode(mode);
        self.finish(events)
    }

    pub fn toggle_fast_mode(&mut self) -> GameUpdate {
        let enabled = self.prefs.toggle_fast_mode(self.progress.storage_mut(), &self.config.storage_keys);
        self.engine.set_fast_mode(enabled);
        self.finish(Vec::new())
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.prefs.toggle_theme(self.progress.storage_mut(), &self.config.storage_keys)
    }

    // ==================== QUERIES ====================

    pub fn home_summary(&mut self) -> HomeSummary {
        let durable = self.progress.storage_mut().is_durable();
        let doc = self.progress.document();
        HomeSummary {
            levels: stats::level_cards(doc, self.levels),
            coins: doc.coins,
            preferences: self.prefs,
            durable,
        }
    }

    pub fn stats_summary(&mut self) -> StatsSummary {
        stats::stats_summary(self.progress.document(), self.levels, self.mastery_filter, self.config.weak_fact_limit)
    }

    pub fn session_snapshot(&self) -> Option<SessionSnapshot> {
        self.engine.snapshot(self.now())
    }

    pub fn results(&self) -> Option<&SessionResults> {
        self.engine.results()
    }

    pub fn progress(&mut self) -> &ProgressDocument {
        self.progress.document()
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn preferences(&self) -> Preferences {
        self.prefs
    }

    pub fn answer_mode(&self) -> AnswerMode {
        self.prefs.answer_mode
    }

    pub fn mastery_filter(&self) -> MasteryFilter {
        self.mastery_filter
    }

    pub fn levels(&self) -> &'static [Level] {
        self.levels
    }

    /// Write anything still pending; call before the host goes away
    pub fn teardown(&mut self) {
        if self.progress.flush() {
            log::info!("[PROGRESS] flushed on teardown");
        }
    }
}
