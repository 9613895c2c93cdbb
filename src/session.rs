//! One play-through of a level.
//!
//! Every fact of the level is asked once in shuffled order. A wrong answer
//! costs a life and the same question is asked again; the session passes when
//! every fact has been answered correctly at least once. Delayed steps go
//! through a [`Scheduler`] tagged with the engine generation, which moves on
//! whenever a question is presented or the session ends. Stale tasks are
//! dropped when they come due.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use serde::Serialize;

use crate::config::GameConfig;
use crate::events::{AttemptRecord, GameEvent, GradeOutcome, Mood, Overlay, QuestionView, ResultTitle, SessionResults};
use crate::math_facts::{FactKey, Level};
use crate::preferences::AnswerMode;
use crate::progress::{percent, ProgressStore};
use crate::questions::{generate_choices, generate_session, level_progress_label};
use crate::scheduler::{Scheduled, Scheduler};
use crate::stats::star_rating;

/// Accuracy at or above this earns confetti on the results screen
const CELEBRATE_ACCURACY: u32 = 93;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTask {
    /// Move past a correctly answered question
    Advance,
    /// Out of lives
    Complete,
    Tick,
    DismissOverlay(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    AwaitingAnswer,
    /// Graded correct, waiting out the advance delay
    Advancing,
    /// Out of lives, waiting out the fail delay
    Failing,
}

// ==================== SCORING ====================

/// Coins for a correct answer at the given streak (after incrementing)
pub fn coin_reward(streak: u32) -> u64 {
    if streak >= 5 {
        3
    } else if streak >= 3 {
        2
    } else {
        1
    }
}

pub fn milestone_text(streak: u32) -> Option<&'static str> {
    match streak {
        3 => Some("ON FIRE!"),
        5 => Some("UNSTOPPABLE!"),
        10 => Some("MATH WIZARD!"),
        _ => None,
    }
}

/// Digits of `raw` read as a non-negative integer; `None` when it has no digits.
/// Leading zeros and any other characters are ignored.
pub fn parse_answer(raw: &str) -> Option<u64> {
    let mut digits = raw.chars().filter_map(|c| c.to_digit(10)).peekable();
    digits.peek()?;
    Some(digits.fold(0u64, |acc, d| acc.saturating_mul(10).saturating_add(u64::from(d))))
}

/// Elapsed time with one decimal, e.g. `"2.4s"`
pub fn format_elapsed(ms: u64) -> String {
    let tenths = ms.saturating_add(50) / 100;
    format!("{}.{}s", tenths / 10, tenths % 10)
}

// ==================== STATE ====================

#[derive(Debug, Clone)]
struct ActiveSession {
    level: usize,
    questions: Vec<FactKey>,
    /// Distinct facts in the sequence
    total: usize,
    cursor: usize,
    log: Vec<AttemptRecord>,
    streak: u32,
    max_streak: u32,
    lives: u8,
    mastered: BTreeSet<FactKey>,
    question_start: u64,
    phase: Phase,
    /// Fast mode already auto-submitted for this question
    fast_submitted: bool,
    choices: Option<Vec<u32>>,
    timer_text: Option<String>,
}

impl ActiveSession {
    fn current(&self) -> Option<FactKey> {
        self.questions.get(self.cursor).copied()
    }
}

#[derive(Debug, Clone)]
enum EngineState {
    Idle,
    Active(ActiveSession),
    Complete(SessionResults),
}

/// Read-only view of the running session for rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub level: usize,
    pub level_name: &'static str,
    /// Tables covered, e.g. `"3×1-10"`
    pub level_label: String,
    pub fact: Option<FactKey>,
    pub question_text: Option<String>,
    /// 1-based, capped at `total`
    pub question_number: usize,
    pub total: usize,
    pub expected_len: usize,
    pub choices: Option<Vec<u32>>,
    pub lives: u8,
    pub max_lives: u8,
    pub streak: u32,
    pub max_streak: u32,
    pub mastered: usize,
    pub progress_pct: u32,
    pub elapsed_text: String,
    pub phase: Phase,
    pub answer_mode: AnswerMode,
    pub fast_mode: bool,
    pub overlay: Option<Overlay>,
    pub generation: u64,
}

pub struct SessionEngine {
    levels: &'static [Level],
    config: GameConfig,
    rng: StdRng,
    scheduler: Scheduler<SessionTask>,
    /// Bumped on every question and every session end
    generation: u64,
    state: EngineState,
    current_level: usize,
    answer_mode: AnswerMode,
    fast_mode: bool,
    overlay: Option<(u64, Overlay)>,
    overlay_seq: u64,
}

impl SessionEngine {
    pub fn new(levels: &'static [Level], config: GameConfig, rng: StdRng) -> Self {
        Self {
            levels,
            config,
            rng,
            scheduler: Scheduler::new(),
            generation: 0,
            state: EngineState::Idle,
            current_level: 0,
            answer_mode: AnswerMode::default(),
            fast_mode: false,
            overlay: None,
            overlay_seq: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Level of the running or most recent session
    pub fn current_level(&self) -> usize {
        self.current_level
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, EngineState::Active(_))
    }

    pub fn phase(&self) -> Option<Phase> {
        match &self.state {
            EngineState::Active(session) => Some(session.phase),
            _ => None,
        }
    }

    pub fn current_fact(&self) -> Option<FactKey> {
        match &self.state {
            EngineState::Active(session) => session.current(),
            _ => None,
        }
    }

    /// Results of the last session, until a new one starts or it is quit
    pub fn results(&self) -> Option<&SessionResults> {
        match &self.state {
            EngineState::Complete(results) => Some(results),
            _ => None,
        }
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref().map(|(_, overlay)| overlay)
    }

    /// Earliest pending task time, stale tasks included
    pub fn next_fire_at(&self) -> Option<u64> {
        self.scheduler.next_fire_at()
    }

    pub fn answer_mode(&self) -> AnswerMode {
        self.answer_mode
    }

    pub fn fast_mode(&self) -> bool {
        self.fast_mode
    }

    pub fn set_fast_mode(&mut self, enabled: bool) {
        self.fast_mode = enabled;
    }

    /// Switch answer mode; the current question's choices are regenerated
    pub fn set_answer_mode(&mut self, mode: AnswerMode) -> Vec<GameEvent> {
        if self.answer_mode == mode {
            return Vec::new();
        }
        self.answer_mode = mode;
        let EngineState::Active(session) = &mut self.state else {
            return Vec::new();
        };
        session.choices = match mode {
            AnswerMode::Choice => session.current().map(|fact| generate_choices(fact.product(), &mut self.rng)),
            AnswerMode::Type => None,
        };
        vec![GameEvent::ChoicesChanged(session.choices.clone())]
    }

    // ==================== LIFECYCLE ====================

    /// Begin a session on `level`. Returns `None` if the level is out of range or locked.
    pub fn start(&mut self, level: usize, progress: &mut ProgressStore, now: u64) -> Option<Vec<GameEvent>> {
        let Some(def) = self.levels.get(level) else {
            log::debug!("start_level: level {} out of range", level);
            return None;
        };
        if !progress.get().is_unlocked(level) {
            log::debug!("start_level: level {} is locked", level);
            return None;
        }
        if self.is_active() {
            progress.flush();
        }

        let questions = generate_session(def, &mut self.rng);
        let total = questions.iter().collect::<BTreeSet<_>>().len();
        log::info!("[SESSION] start level {} ({}) with {} facts", level, def.name, questions.len());

        self.generation += 1;
        self.current_level = level;
        self.overlay = None;
        self.state = EngineState::Active(ActiveSession {
            level,
            questions,
            total,
            cursor: 0,
            log: Vec::new(),
            streak: 0,
            max_streak: 0,
            lives: self.config.max_lives,
            mastered: BTreeSet::new(),
            question_start: now,
            phase: Phase::AwaitingAnswer,
            fast_submitted: false,
            choices: None,
            timer_text: None,
        });

        let mut events = Vec::new();
        self.present_next(now, progress, &mut events);
        Some(events)
    }

    /// End the session without recording results. Returns false when idle.
    pub fn quit(&mut self, progress: &mut ProgressStore) -> bool {
        let ended = match std::mem::replace(&mut self.state, EngineState::Idle) {
            EngineState::Active(session) => {
                log::info!("[SESSION] quit level {} after {} attempts", session.level, session.log.len());
                true
            }
            EngineState::Complete(_) => true,
            EngineState::Idle => false,
        };
        progress.flush();
        self.generation += 1;
        self.overlay = None;
        ended
    }

    fn present_next(&mut self, now: u64, progress: &mut ProgressStore, events: &mut Vec<GameEvent>) {
        let next = match &self.state {
            EngineState::Active(session) => session.current(),
            _ => return,
        };
        let Some(fact) = next else {
            self.complete(now, progress, events);
            return;
        };

        self.generation += 1;
        let EngineState::Active(session) = &mut self.state else {
            return;
        };
        session.phase = Phase::AwaitingAnswer;
        session.question_start = now;
        session.timer_text = None;
        session.fast_submitted = false;
        session.choices = match self.answer_mode {
            AnswerMode::Choice => Some(generate_choices(fact.product(), &mut self.rng)),
            AnswerMode::Type => None,
        };
        self.scheduler
            .schedule(now.saturating_add(self.config.question_tick_ms), self.generation, SessionTask::Tick);

        events.push(GameEvent::QuestionPresented(QuestionView {
            fact,
            text: fact.question_text(),
            number: session.cursor + 1,
            total: session.questions.len(),
            expected_len: fact.answer_len(),
            choices: session.choices.clone(),
        }));
    }

    fn complete(&mut self, at: u64, progress: &mut ProgressStore, events: &mut Vec<GameEvent>) {
        let session = match std::mem::replace(&mut self.state, EngineState::Idle) {
            EngineState::Active(session) => session,
            other => {
                self.state = other;
                return;
            }
        };

        let total = session.total.max(1);
        let attempts = session.log.len();
        let correct_times: Vec<u64> = session.log.iter().filter(|r| r.correct).map(|r| r.elapsed_ms).collect();
        let correct = correct_times.len();
        let accuracy_pct = percent(correct as u64, attempts.max(1) as u64);
        let passed = session.mastered.len() >= total;
        let avg_correct_ms = (!correct_times.is_empty())
            .then(|| correct_times.iter().fold(0u64, |acc, t| acc.saturating_add(*t)) / correct_times.len() as u64);

        let doc = progress.get();
        if let Some(stat) = doc.level_stats.get_mut(session.level) {
            stat.record_session(attempts as u64, correct as u64, &correct_times, accuracy_pct);
        }
        let next = session.level + 1;
        let next_level_available = passed && next < doc.level_count();
        let newly_unlocked = (next_level_available && doc.unlock(next)).then_some(next);
        if let Some(level) = newly_unlocked {
            log::info!("[UNLOCK] level {} opened", level);
        }
        progress.queue_save(at);
        progress.flush();
        self.generation += 1;

        log::info!(
            "[SESSION] level {} complete: {}/{} correct, {}% accuracy, passed={}",
            session.level,
            correct,
            attempts,
            accuracy_pct,
            passed
        );

        let skip = attempts.saturating_sub(self.config.answer_log_rows);
        let results = SessionResults {
            level: session.level,
            attempts,
            correct,
            accuracy_pct,
            stars: star_rating(accuracy_pct),
            avg_correct_ms,
            max_streak: session.max_streak,
            mastered: session.mastered.len().min(total),
            total,
            passed,
            next_level_available,
            newly_unlocked,
            title: ResultTitle::from_score(accuracy_pct, passed),
            celebrate: accuracy_pct >= CELEBRATE_ACCURACY,
            answer_log: session.log[skip..].to_vec(),
        };
        events.push(GameEvent::SessionCompleted(results.clone()));
        self.state = EngineState::Complete(results);
    }

    // ==================== ANSWERS ====================

    /// Grade typed input. Input without digits is ignored.
    pub fn submit(&mut self, raw: &str, progress: &mut ProgressStore, now: u64) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let Some(answer) = parse_answer(raw) else {
            log::debug!("submit_answer: ignoring input {:?}", raw);
            return events;
        };
        self.grade(answer, progress, now, &mut events);
        events
    }

    /// Grade one of the offered choices; anything else is ignored
    pub fn submit_choice(&mut self, value: u32, progress: &mut ProgressStore, now: u64) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if self.answer_mode != AnswerMode::Choice {
            log::debug!("submit_choice: not in choice mode");
            return events;
        }
        let offered = match &self.state {
            EngineState::Active(session) => session.choices.as_ref().is_some_and(|c| c.contains(&value)),
            _ => false,
        };
        if !offered {
            log::debug!("submit_choice: {} was not offered", value);
            return events;
        }
        self.grade(u64::from(value), progress, now, &mut events);
        events
    }

    /// Sanitize live input. In fast mode a full-length answer is submitted once per question.
    pub fn input_changed(&mut self, raw: &str, progress: &mut ProgressStore, now: u64) -> (String, Vec<GameEvent>) {
        let mut value: String = raw.chars().filter(char::is_ascii_digit).collect();
        let mut events = Vec::new();
        let auto_submit = self.fast_mode && self.answer_mode == AnswerMode::Type;
        let EngineState::Active(session) = &mut self.state else {
            return (value, events);
        };
        let Some(fact) = session.current() else {
            return (value, events);
        };

        let expected_len = fact.answer_len();
        value.truncate(expected_len);
        if auto_submit && session.phase == Phase::AwaitingAnswer && !session.fast_submitted && value.len() == expected_len
        {
            session.fast_submitted = true;
            if let Some(answer) = parse_answer(&value) {
                self.grade(answer, progress, now, &mut events);
            }
        }
        (value, events)
    }

    fn grade(&mut self, answer: u64, progress: &mut ProgressStore, now: u64, events: &mut Vec<GameEvent>) {
        let generation = self.generation;
        let EngineState::Active(session) = &mut self.state else {
            log::debug!("submit_answer: no active session");
            return;
        };
        if session.phase != Phase::AwaitingAnswer {
            log::debug!("submit_answer: question locked");
            return;
        }
        let Some(fact) = session.current() else {
            return;
        };

        let expected = fact.product();
        let correct = answer == u64::from(expected);
        let elapsed_ms = now.saturating_sub(session.question_start);
        session.log.push(AttemptRecord { fact, answer, correct, elapsed_ms });

        let doc = progress.get();
        doc.record_fact(fact, correct);

        let mut coins_awarded = 0;
        let mut newly_mastered = false;
        let mut milestone = None;
        let overlay;
        let mood;
        if correct {
            session.streak = session.streak.saturating_add(1);
            session.max_streak = session.max_streak.max(session.streak);
            coins_awarded = coin_reward(session.streak);
            doc.add_coins(coins_awarded);
            newly_mastered = session.mastered.insert(fact);
            milestone = milestone_text(session.streak);
            mood = if session.streak >= 5 { Mood::Dance } else { Mood::Happy };
            overlay = milestone.map(|text| {
                (Overlay::Milestone { streak: session.streak, text }, self.config.milestone_overlay_ms)
            });

            session.phase = Phase::Advancing;
            self.scheduler
                .schedule(now.saturating_add(self.config.advance_delay_ms), generation, SessionTask::Advance);
        } else {
            session.streak = 0;
            session.lives = session.lives.saturating_sub(1);
            mood = Mood::Sad;
            overlay = Some((Overlay::WrongAnswer { equation: fact.equation_text() }, self.config.wrong_overlay_ms));

            if session.lives == 0 {
                session.phase = Phase::Failing;
                self.scheduler
                    .schedule(now.saturating_add(self.config.fail_delay_ms), generation, SessionTask::Complete);
            } else {
                // Same question again with a fresh timer
                session.question_start = now;
                session.timer_text = None;
            }
        }
        progress.queue_save(now);

        events.push(GameEvent::Graded(GradeOutcome {
            fact,
            answer,
            expected,
            correct,
            elapsed_ms,
            lives: session.lives,
            streak: session.streak,
            coins_awarded,
            newly_mastered,
            mastered: session.mastered.len(),
            total: session.total,
            mood,
            milestone,
            out_of_lives: session.lives == 0,
        }));

        if let Some((overlay, ttl)) = overlay {
            self.show_overlay(overlay, now.saturating_add(ttl), events);
        }
    }

    fn show_overlay(&mut self, overlay: Overlay, dismiss_at: u64, events: &mut Vec<GameEvent>) {
        self.overlay_seq += 1;
        let id = self.overlay_seq;
        self.overlay = Some((id, overlay.clone()));
        self.scheduler.schedule(dismiss_at, self.generation, SessionTask::DismissOverlay(id));
        events.push(GameEvent::OverlayShown { id, overlay });
    }

    // ==================== SCHEDULED ====================

    /// Run every task due at or before `now`, in firing order
    pub fn advance_to(&mut self, now: u64, progress: &mut ProgressStore) -> Vec<GameEvent> {
        let mut events = Vec::new();
        while let Some(due) = self.scheduler.pop_due(now) {
            self.run_task(due, now, progress, &mut events);
        }
        events
    }

    fn run_task(&mut self, due: Scheduled<SessionTask>, now: u64, progress: &mut ProgressStore, events: &mut Vec<GameEvent>) {
        if let SessionTask::DismissOverlay(id) = due.task {
            if self.overlay.as_ref().is_some_and(|(current, _)| *current == id) {
                self.overlay = None;
                events.push(GameEvent::OverlayDismissed { id });
            }
            return;
        }
        if due.generation != self.generation {
            return;
        }

        match due.task {
            SessionTask::Advance => {
                let EngineState::Active(session) = &mut self.state else {
                    return;
                };
                if session.phase != Phase::Advancing {
                    return;
                }
                session.cursor += 1;
                self.present_next(due.fire_at, progress, events);
            }
            SessionTask::Complete => self.complete(due.fire_at, progress, events),
            SessionTask::Tick => self.tick(now, events),
            SessionTask::DismissOverlay(_) => {}
        }
    }

    /// Emit elapsed time when its text changes; stops once the question is answered
    fn tick(&mut self, now: u64, events: &mut Vec<GameEvent>) {
        let EngineState::Active(session) = &mut self.state else {
            return;
        };
        if session.phase != Phase::AwaitingAnswer {
            return;
        }
        let text = format_elapsed(now.saturating_sub(session.question_start));
        if session.timer_text.as_deref() != Some(text.as_str()) {
            session.timer_text = Some(text.clone());
            events.push(GameEvent::TimerTick { text });
        }
        self.scheduler
            .schedule(now.saturating_add(self.config.question_tick_ms), self.generation, SessionTask::Tick);
    }

    pub fn snapshot(&self, now: u64) -> Option<SessionSnapshot> {
        let EngineState::Active(session) = &self.state else {
            return None;
        };
        let level = self.levels.get(session.level)?;
        let fact = session.current();
        let total = session.questions.len();
        let elapsed_text = match (session.phase, &session.timer_text) {
            (Phase::AwaitingAnswer, _) => format_elapsed(now.saturating_sub(session.question_start)),
            (_, Some(text)) => text.clone(),
            (_, None) => format_elapsed(0),
        };

        Some(SessionSnapshot {
            level: session.level,
            level_name: level.name,
            level_label: level_progress_label(level),
            fact,
            question_text: fact.map(|f| f.question_text()),
            question_number: (session.cursor + 1).min(total.max(1)),
            total,
            expected_len: fact.map_or(0, |f| f.answer_len()),
            choices: session.choices.clone(),
            lives: session.lives,
            max_lives: self.config.max_lives,
            streak: session.streak,
            max_streak: session.max_streak,
            mastered: session.mastered.len(),
            progress_pct: percent(session.mastered.len() as u64, session.total.max(1) as u64),
            elapsed_text,
            phase: session.phase,
            answer_mode: self.answer_mode,
            fast_mode: self.fast_mode,
            overlay: self.overlay().cloned(),
            generation: self.generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageKeys;
    use crate::math_facts::LEVELS;
    use crate::storage::Storage;
    use rand::SeedableRng;

    fn engine_with(config: GameConfig) -> SessionEngine {
        SessionEngine::new(&LEVELS, config, StdRng::seed_from_u64(11))
    }

    fn engine() -> SessionEngine {
        engine_with(GameConfig::default())
    }

    fn store() -> ProgressStore {
        ProgressStore::new(Storage::volatile(), StorageKeys::default(), LEVELS.len(), 600)
    }

    fn answer_right(engine: &mut SessionEngine, store: &mut ProgressStore, now: u64) -> Vec<GameEvent> {
        let fact = engine.current_fact().unwrap();
        engine.submit(&fact.product().to_string(), store, now)
    }

    /// Wrong answer with the same number of digits
    fn wrong_value(fact: FactKey) -> u32 {
        match fact.product() {
            9 => 8,
            100 => 99,
            p => p + 1,
        }
    }

    fn answer_wrong(engine: &mut SessionEngine, store: &mut ProgressStore, now: u64) -> Vec<GameEvent> {
        let fact = engine.current_fact().unwrap();
        engine.submit(&wrong_value(fact).to_string(), store, now)
    }

    fn graded(events: &[GameEvent]) -> Option<&GradeOutcome> {
        events.iter().find_map(|e| match e {
            GameEvent::Graded(outcome) => Some(outcome),
            _ => None,
        })
    }

    fn completed(events: &[GameEvent]) -> Option<&SessionResults> {
        events.iter().find_map(|e| match e {
            GameEvent::SessionCompleted(results) => Some(results),
            _ => None,
        })
    }

    fn presented(events: &[GameEvent]) -> Option<&QuestionView> {
        events.iter().find_map(|e| match e {
            GameEvent::QuestionPresented(view) => Some(view),
            _ => None,
        })
    }

    /// Answer every question correctly, 400 ms after each is presented
    fn play_perfect(
        engine: &mut SessionEngine,
        store: &mut ProgressStore,
        presented_at: u64,
    ) -> (SessionResults, Vec<GameEvent>) {
        let mut all = Vec::new();
        let mut now = presented_at;
        loop {
            now += 400;
            all.extend(answer_right(engine, store, now));
            now += 700;
            let events = engine.advance_to(now, store);
            let done = completed(&events).cloned();
            all.extend(events);
            if let Some(results) = done {
                return (results, all);
            }
        }
    }

    #[test]
    fn test_scoring_helpers() {
        assert_eq!(coin_reward(1), 1);
        assert_eq!(coin_reward(2), 1);
        assert_eq!(coin_reward(3), 2);
        assert_eq!(coin_reward(4), 2);
        assert_eq!(coin_reward(5), 3);
        assert_eq!(coin_reward(40), 3);

        assert_eq!(milestone_text(3), Some("ON FIRE!"));
        assert_eq!(milestone_text(5), Some("UNSTOPPABLE!"));
        assert_eq!(milestone_text(10), Some("MATH WIZARD!"));
        assert_eq!(milestone_text(4), None);
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("42"), Some(42));
        assert_eq!(parse_answer("007"), Some(7));
        assert_eq!(parse_answer(" 1 2 "), Some(12));
        assert_eq!(parse_answer("a1b"), Some(1));
        assert_eq!(parse_answer(""), None);
        assert_eq!(parse_answer("abc"), None);
        assert_eq!(parse_answer("99999999999999999999999"), Some(u64::MAX));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "0.0s");
        assert_eq!(format_elapsed(250), "0.3s");
        assert_eq!(format_elapsed(1049), "1.0s");
        assert_eq!(format_elapsed(12_960), "13.0s");
    }

    #[test]
    fn test_start_rejects_locked_and_out_of_range() {
        let mut engine = engine();
        let mut store = store();
        assert!(engine.start(1, &mut store, 0).is_none());
        assert!(engine.start(LEVELS.len(), &mut store, 0).is_none());
        assert!(!engine.is_active());
        assert_eq!(engine.generation(), 0);

        let events = engine.start(0, &mut store, 0).unwrap();
        let view = presented(&events).unwrap();
        assert_eq!(view.number, 1);
        assert_eq!(view.total, 10);
        assert_eq!(view.fact.a, 1);
        assert!(view.choices.is_none());

        let snapshot = engine.snapshot(0).unwrap();
        assert_eq!(snapshot.lives, 3);
        assert_eq!(snapshot.streak, 0);
        assert_eq!(snapshot.level_label, "1×1-10");
    }

    #[test]
    fn test_correct_answer_locks_then_advances() {
        let mut engine = engine();
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        let first = engine.current_fact().unwrap();

        let events = answer_right(&mut engine, &mut store, 1000);
        let outcome = graded(&events).unwrap();
        assert!(outcome.correct);
        assert_eq!(outcome.elapsed_ms, 1000);
        assert_eq!(outcome.coins_awarded, 1);
        assert!(outcome.newly_mastered);
        assert_eq!(outcome.mood, Mood::Happy);
        assert_eq!(engine.phase(), Some(Phase::Advancing));
        assert_eq!(store.document().fact_stat(first).correct, 1);
        assert_eq!(store.document().coins, 1);

        // Locked while advancing
        assert!(answer_right(&mut engine, &mut store, 1100).is_empty());

        let events = engine.advance_to(1699, &mut store);
        assert!(presented(&events).is_none());
        let events = engine.advance_to(1700, &mut store);
        assert_eq!(presented(&events).unwrap().number, 2);
        assert_ne!(engine.current_fact(), Some(first));
    }

    #[test]
    fn test_wrong_answer_retries_same_fact() {
        let mut engine = engine();
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        let fact = engine.current_fact().unwrap();

        let events = answer_wrong(&mut engine, &mut store, 500);
        let outcome = graded(&events).unwrap();
        assert!(!outcome.correct);
        assert_eq!(outcome.lives, 2);
        assert_eq!(outcome.streak, 0);
        assert_eq!(outcome.mood, Mood::Sad);
        assert!(!outcome.out_of_lives);
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::OverlayShown { overlay: Overlay::WrongAnswer { .. }, .. }
        )));

        assert_eq!(engine.current_fact(), Some(fact));
        assert_eq!(engine.phase(), Some(Phase::AwaitingAnswer));
        assert_eq!(store.document().fact_stat(fact), crate::progress::FactStat { attempts: 1, correct: 0 });

        let events = engine.advance_to(1800, &mut store);
        assert!(events.iter().any(|e| matches!(e, GameEvent::OverlayDismissed { .. })));
        assert!(engine.overlay().is_none());

        // Timer restarted at the miss
        let events = answer_right(&mut engine, &mut store, 2000);
        assert_eq!(graded(&events).unwrap().elapsed_ms, 1500);
    }

    #[test]
    fn test_out_of_lives_fails_after_delay() {
        let mut engine = engine();
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        answer_wrong(&mut engine, &mut store, 100);
        answer_wrong(&mut engine, &mut store, 200);
        let events = answer_wrong(&mut engine, &mut store, 300);
        assert!(graded(&events).unwrap().out_of_lives);
        assert_eq!(engine.phase(), Some(Phase::Failing));
        assert!(answer_right(&mut engine, &mut store, 400).is_empty());

        assert!(completed(&engine.advance_to(1699, &mut store)).is_none());
        let events = engine.advance_to(1700, &mut store);
        let results = completed(&events).unwrap();
        assert!(!results.passed);
        assert_eq!(results.attempts, 3);
        assert_eq!(results.correct, 0);
        assert_eq!(results.accuracy_pct, 0);
        assert_eq!(results.stars, 0);
        assert_eq!(results.avg_correct_ms, None);
        assert_eq!(results.title, ResultTitle::KeepPracticing);
        assert_eq!(results.newly_unlocked, None);
        assert!(!engine.is_active());

        let doc = store.document();
        assert_eq!(doc.level_stats[0].attempts, 3);
        assert_eq!(doc.level_stats[0].best_time_ms, None);
        assert!(!doc.is_unlocked(1));
        assert!(!store.has_pending_save());
    }

    #[test]
    fn test_perfect_session_unlocks_next_level() {
        let mut engine = engine();
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        let (results, events) = play_perfect(&mut engine, &mut store, 0);

        assert!(results.passed);
        assert_eq!(results.attempts, 10);
        assert_eq!(results.accuracy_pct, 100);
        assert_eq!(results.stars, 3);
        assert_eq!(results.title, ResultTitle::Perfect);
        assert!(results.celebrate);
        assert_eq!(results.max_streak, 10);
        assert_eq!(results.mastered, 10);
        assert_eq!(results.avg_correct_ms, Some(400));
        assert_eq!(results.newly_unlocked, Some(1));
        assert!(results.next_level_available);

        let milestones: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                GameEvent::Graded(GradeOutcome { milestone: Some(text), .. }) => Some(*text),
                _ => None,
            })
            .collect();
        assert_eq!(milestones, ["ON FIRE!", "UNSTOPPABLE!", "MATH WIZARD!"]);

        let doc = store.document();
        assert!(doc.is_unlocked(1));
        assert_eq!(doc.coins, 24);
        assert_eq!(doc.level_stats[0].best_accuracy_pct, 100);
        assert_eq!(doc.level_stats[0].best_time_ms, Some(400));
        assert_eq!(engine.results().map(|r| r.level), Some(0));
    }

    #[test]
    fn test_passing_with_misses() {
        let mut engine = engine();
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        answer_wrong(&mut engine, &mut store, 100);
        answer_wrong(&mut engine, &mut store, 200);
        let (results, _) = play_perfect(&mut engine, &mut store, 200);

        assert!(results.passed);
        assert_eq!(results.attempts, 12);
        assert_eq!(results.accuracy_pct, 83);
        assert_eq!(results.stars, 2);
        assert_eq!(results.title, ResultTitle::Great);
        assert!(!results.celebrate);
        assert!(store.document().is_unlocked(1));
    }

    #[test]
    fn test_quit_drops_pending_advance() {
        let mut engine = engine();
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        let fact = engine.current_fact().unwrap();
        answer_right(&mut engine, &mut store, 100);

        assert!(engine.quit(&mut store));
        assert!(!store.has_pending_save());
        let events = engine.advance_to(10_000, &mut store);
        assert!(presented(&events).is_none());
        assert!(completed(&events).is_none());
        assert!(!engine.is_active());

        // Fact stats survive, level stats untouched
        assert_eq!(store.document().fact_stat(fact).correct, 1);
        assert_eq!(store.document().level_stats[0].attempts, 0);
        assert!(!engine.quit(&mut store));
    }

    #[test]
    fn test_restart_ignores_old_advance() {
        let mut engine = engine();
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        answer_right(&mut engine, &mut store, 100);
        engine.start(0, &mut store, 200).unwrap();

        let events = engine.advance_to(800, &mut store);
        assert!(presented(&events).is_none());
        assert_eq!(engine.snapshot(800).unwrap().question_number, 1);
    }

    #[test]
    fn test_non_numeric_submit_is_ignored() {
        let mut engine = engine();
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        assert!(engine.submit("abc", &mut store, 100).is_empty());
        assert!(engine.submit("", &mut store, 100).is_empty());
        assert_eq!(engine.snapshot(100).unwrap().lives, 3);
        assert!(!store.has_pending_save());

        let fact = engine.current_fact().unwrap();
        let padded = format!("00{}", fact.product());
        assert!(graded(&engine.submit(&padded, &mut store, 200)).unwrap().correct);
    }

    #[test]
    fn test_timer_ticks_only_when_text_changes() {
        let config = GameConfig { question_tick_ms: 20, ..GameConfig::default() };
        let mut engine = engine_with(config);
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();

        let texts = |events: Vec<GameEvent>| -> Vec<String> {
            events
                .into_iter()
                .filter_map(|e| match e {
                    GameEvent::TimerTick { text } => Some(text),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(texts(engine.advance_to(20, &mut store)), ["0.0s"]);
        assert!(texts(engine.advance_to(40, &mut store)).is_empty());
        assert_eq!(texts(engine.advance_to(60, &mut store)), ["0.1s"]);

        answer_right(&mut engine, &mut store, 70);
        assert!(texts(engine.advance_to(690, &mut store)).is_empty());
        assert_eq!(engine.snapshot(690).unwrap().elapsed_text, "0.1s");
    }

    #[test]
    fn test_fast_mode_submits_once_per_question() {
        let mut engine = engine();
        let mut store = store();
        engine.set_fast_mode(true);
        engine.start(0, &mut store, 0).unwrap();
        let fact = engine.current_fact().unwrap();

        // Partial input of a two-digit answer does nothing
        if fact.answer_len() > 1 {
            let (value, events) = engine.input_changed("1", &mut store, 50);
            assert_eq!(value, "1");
            assert!(events.is_empty());
        }

        let (value, events) = engine.input_changed(&format!("{}", wrong_value(fact)), &mut store, 100);
        assert_eq!(value.len(), fact.answer_len());
        assert!(!graded(&events).unwrap().correct);

        // No second auto-submit on the retry
        let (value, events) = engine.input_changed(&format!("x{}99", fact.product()), &mut store, 200);
        assert_eq!(value, fact.product().to_string());
        assert!(events.is_empty());
        assert!(graded(&engine.submit(&value, &mut store, 300)).unwrap().correct);

        // Fresh question re-arms it
        engine.advance_to(1000, &mut store);
        let next = engine.current_fact().unwrap();
        let (_, events) = engine.input_changed(&next.product().to_string(), &mut store, 1100);
        assert!(graded(&events).unwrap().correct);
    }

    #[test]
    fn test_choice_mode() {
        let mut engine = engine();
        let mut store = store();
        engine.set_answer_mode(AnswerMode::Choice);
        let events = engine.start(0, &mut store, 0).unwrap();
        let view = presented(&events).unwrap();
        let choices = view.choices.clone().unwrap();
        assert_eq!(choices.len(), 4);
        assert!(choices.contains(&view.fact.product()));

        let not_offered = (1..200).find(|v| !choices.contains(v)).unwrap();
        assert!(engine.submit_choice(not_offered, &mut store, 100).is_empty());

        let wrong = *choices.iter().find(|c| **c != view.fact.product()).unwrap();
        assert!(!graded(&engine.submit_choice(wrong, &mut store, 200)).unwrap().correct);
        // Choices stay for the retry
        assert_eq!(engine.snapshot(200).unwrap().choices, Some(choices));
        assert!(graded(&engine.submit_choice(view.fact.product(), &mut store, 300)).unwrap().correct);
    }

    #[test]
    fn test_toggling_mode_mid_question() {
        let mut engine = engine();
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        let fact = engine.current_fact().unwrap();
        assert!(engine.submit_choice(fact.product(), &mut store, 10).is_empty());

        let events = engine.set_answer_mode(AnswerMode::Choice);
        match events.as_slice() {
            [GameEvent::ChoicesChanged(Some(choices))] => assert!(choices.contains(&fact.product())),
            other => panic!("unexpected events {:?}", other),
        }
        assert!(engine.set_answer_mode(AnswerMode::Choice).is_empty());
        assert_eq!(engine.set_answer_mode(AnswerMode::Type), vec![GameEvent::ChoicesChanged(None)]);
    }

    #[test]
    fn test_answer_log_keeps_latest_rows() {
        let config = GameConfig { answer_log_rows: 2, ..GameConfig::default() };
        let mut engine = engine_with(config);
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        for t in [10, 20, 30] {
            answer_wrong(&mut engine, &mut store, t);
        }
        let events = engine.advance_to(5000, &mut store);
        let results = completed(&events).unwrap();
        assert_eq!(results.answer_log.len(), 2);
        assert_eq!(results.answer_log[1].elapsed_ms, 10);
    }

    #[test]
    fn test_off_by_one_is_wrong_for_every_fact() {
        let config = GameConfig { max_lives: u8::MAX, ..GameConfig::default() };
        let mut engine = engine_with(config);
        let mut store = store();
        for level in 0..LEVELS.len() {
            store.get().unlock(level);
        }

        let mut checked = BTreeSet::new();
        let mut now = 0;
        for level in 0..LEVELS.len() {
            engine.start(level, &mut store, now).unwrap();
            while let Some(fact) = engine.current_fact() {
                now += 100;
                let events = engine.submit(&(fact.product() + 1).to_string(), &mut store, now);
                assert!(!graded(&events).unwrap().correct, "{:?} accepted {}", fact, fact.product() + 1);
                checked.insert(fact);
                answer_right(&mut engine, &mut store, now);
                now += 700;
                engine.advance_to(now, &mut store);
            }
        }
        assert_eq!(checked.len(), 100);
    }

    #[test]
    fn test_overlay_cleared_by_quit_and_restart() {
        let mut engine = engine();
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        answer_wrong(&mut engine, &mut store, 100);
        assert!(engine.overlay().is_some());
        engine.quit(&mut store);
        engine.start(0, &mut store, 200).unwrap();
        assert_eq!(engine.snapshot(200).unwrap().overlay, None);

        answer_wrong(&mut engine, &mut store, 300);
        engine.start(0, &mut store, 400).unwrap();
        assert_eq!(engine.snapshot(400).unwrap().overlay, None);
        // Old dismissal deadline passes quietly
        let events = engine.advance_to(1700, &mut store);
        assert!(!events.iter().any(|e| matches!(e, GameEvent::OverlayDismissed { .. })));
    }

    #[test]
    fn test_milestone_overlay_outlives_session() {
        let mut engine = engine();
        let mut store = store();
        engine.start(0, &mut store, 0).unwrap();
        let (_, events) = play_perfect(&mut engine, &mut store, 0);
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::OverlayShown { overlay: Overlay::Milestone { streak: 10, .. }, .. }
        )));
        assert!(matches!(engine.overlay(), Some(Overlay::Milestone { streak: 10, .. })));

        let events = engine.advance_to(100_000, &mut store);
        assert!(events.iter().any(|e| matches!(e, GameEvent::OverlayDismissed { .. })));
        assert!(engine.overlay().is_none());
    }
}
