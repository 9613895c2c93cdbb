//! Read-only summaries derived from the progress document.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::math_facts::{all_fact_keys, FactKey, Level, TOTAL_FACTS};
use crate::progress::{percent, FactStat, ProgressDocument};
use crate::questions::build_level_fact_pool;

/// Facts at or above this accuracy count as strong
const STRONG_ACCURACY: u64 = 85;

/// Facts below this accuracy are struggling
const STRUGGLING_ACCURACY: u64 = 60;

/// 3 stars at 93%+, 2 at 80%+, 1 for anything above zero
pub fn star_rating(accuracy_pct: u32) -> u8 {
    if accuracy_pct >= 93 {
        3
    } else if accuracy_pct >= 80 {
        2
    } else if accuracy_pct > 0 {
        1
    } else {
        0
    }
}

/// `true` when `correct / attempts >= threshold%`, compared without rounding
fn meets_accuracy(stat: &FactStat, threshold: u64) -> bool {
    stat.attempts > 0 && stat.correct.saturating_mul(100) >= threshold.saturating_mul(stat.attempts)
}

// ==================== FACT STATUS ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FactStatus {
    Untried,
    /// Below 60% accuracy
    Struggling,
    /// Below 85% accuracy
    Learning,
    Mastered,
}

impl FactStatus {
    pub fn of(stat: &FactStat) -> Self {
        if stat.attempts == 0 {
            FactStatus::Untried
        } else if !meets_accuracy(stat, STRUGGLING_ACCURACY) {
            FactStatus::Struggling
        } else if !meets_accuracy(stat, STRONG_ACCURACY) {
            FactStatus::Learning
        } else {
            FactStatus::Mastered
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MasteryFilter {
    #[default]
    All,
    /// Struggling or untried
    Weak,
    Untried,
}

impl MasteryFilter {
    /// Unknown names fall back to `All`
    pub fn parse(raw: &str) -> Self {
        match raw {
            "weak" => MasteryFilter::Weak,
            "untried" => MasteryFilter::Untried,
            _ => MasteryFilter::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MasteryFilter::All => "all",
            MasteryFilter::Weak => "weak",
            MasteryFilter::Untried => "untried",
        }
    }

    pub fn shows(&self, status: FactStatus) -> bool {
        match self {
            MasteryFilter::All => true,
            MasteryFilter::Weak => matches!(status, FactStatus::Struggling | FactStatus::Untried),
            MasteryFilter::Untried => status == FactStatus::Untried,
        }
    }
}

// ==================== OVERVIEW ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_attempts: u64,
    pub total_correct: u64,
    pub accuracy_pct: u32,
    /// Facts answered correctly at least once
    pub learned: usize,
    /// Attempted facts at 85%+ accuracy
    pub strong: usize,
    pub total_facts: usize,
    pub learned_pct: u32,
    pub unlocked: usize,
    pub level_count: usize,
    pub coins: u64,
}

pub fn overview(doc: &ProgressDocument) -> Overview {
    let mut total_attempts = 0u64;
    let mut total_correct = 0u64;
    let mut learned = 0;
    let mut strong = 0;

    for key in all_fact_keys() {
        let stat = doc.fact_stat(key);
        total_attempts = total_attempts.saturating_add(stat.attempts);
        total_correct = total_correct.saturating_add(stat.correct);
        if stat.correct > 0 {
            learned += 1;
        }
        if meets_accuracy(&stat, STRONG_ACCURACY) {
            strong += 1;
        }
    }

    Overview {
        total_attempts,
        total_correct,
        accuracy_pct: percent(total_correct, total_attempts),
        learned,
        strong,
        total_facts: TOTAL_FACTS,
        learned_pct: percent(learned as u64, TOTAL_FACTS as u64),
        unlocked: doc.unlocked_count(),
        level_count: doc.level_count(),
        coins: doc.coins,
    }
}

// ==================== LEVELS ====================

/// Facts of a level answered correctly at least once (lifetime)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelFactProgress {
    pub mastered: usize,
    pub total: usize,
}

impl LevelFactProgress {
    pub fn pct(&self) -> u32 {
        percent(self.mastered as u64, self.total as u64)
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.mastered >= self.total
    }
}

pub fn level_fact_progress(doc: &ProgressDocument, level: &Level) -> LevelFactProgress {
    let pool = build_level_fact_pool(level);
    let mastered = pool.iter().filter(|key| doc.fact_stat(**key).correct > 0).count();
    LevelFactProgress { mastered, total: pool.len() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LevelStatus {
    Locked,
    InProgress,
    Mastered,
}

impl LevelStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LevelStatus::Locked => "Locked",
            LevelStatus::InProgress => "In Progress",
            LevelStatus::Mastered => "Mastered",
        }
    }
}

pub fn level_status(doc: &ProgressDocument, level: usize, progress: &LevelFactProgress) -> LevelStatus {
    if !doc.is_unlocked(level) {
        LevelStatus::Locked
    } else if progress.is_complete() {
        LevelStatus::Mastered
    } else {
        LevelStatus::InProgress
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelPerformance {
    pub index: usize,
    pub name: &'static str,
    pub color: &'static str,
    /// `None` until the level has been played to the end
    pub accuracy_pct: Option<u32>,
    pub avg_correct_ms: Option<u64>,
    pub status: LevelStatus,
    pub mastery_pct: u32,
}

impl LevelPerformance {
    /// Average speed as `"1.8s"`, or a dash when unknown
    pub fn speed_text(&self) -> String {
        match self.avg_correct_ms {
            Some(ms) => crate::session::format_elapsed(ms),
            None => "—".to_string(),
        }
    }
}

pub fn level_performance(doc: &ProgressDocument, levels: &[Level]) -> Vec<LevelPerformance> {
    levels
        .iter()
        .enumerate()
        .map(|(i, level)| {
            let progress = level_fact_progress(doc, level);
            let stat = doc.level_stats.get(i).copied().unwrap_or_default();
            LevelPerformance {
                index: i,
                name: level.name,
                color: level.color,
                accuracy_pct: (stat.attempts > 0).then(|| stat.accuracy_pct()),
                avg_correct_ms: stat.avg_correct_ms(),
                status: level_status(doc, i, &progress),
                mastery_pct: progress.pct(),
            }
        })
        .collect()
}

/// One button on the home screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelCard {
    pub index: usize,
    pub name: &'static str,
    pub friendly: &'static str,
    pub color: &'static str,
    pub unlocked: bool,
    /// First locked level, highlighted as the next goal
    pub next_target: bool,
    pub stars: u8,
    pub mastered: usize,
    pub total: usize,
    pub pct: u32,
    /// "Locked", "Mastered" or "m/t facts"
    pub status_line: String,
    /// Empty while locked
    pub hint: String,
}

pub fn level_cards(doc: &ProgressDocument, levels: &[Level]) -> Vec<LevelCard> {
    let next_target = doc.next_target_level();
    levels
        .iter()
        .enumerate()
        .map(|(i, level)| {
            let unlocked = doc.is_unlocked(i);
            let stat = doc.level_stats.get(i).copied().unwrap_or_default();
            let progress = level_fact_progress(doc, level);
            let status_line = if !unlocked {
                LevelStatus::Locked.label().to_string()
            } else if progress.mastered >= progress.total {
                LevelStatus::Mastered.label().to_string()
            } else {
                format!("{}/{} facts", progress.mastered, progress.total)
            };
            LevelCard {
                index: i,
                name: level.name,
                friendly: level.friendly,
                color: level.color,
                unlocked,
                next_target: i == next_target && !unlocked,
                stars: star_rating(stat.accuracy_pct()),
                mastered: progress.mastered,
                total: progress.total,
                pct: progress.pct(),
                status_line,
                hint: if unlocked { level.hint_line() } else { String::new() },
            }
        })
        .collect()
}

// ==================== MASTERY GRID ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryCell {
    pub fact: FactKey,
    pub attempts: u64,
    pub correct: u64,
    pub status: FactStatus,
    /// Matches the active filter; others are rendered muted
    pub visible: bool,
}

impl MasteryCell {
    /// Product once attempted, blank before
    pub fn label(&self) -> String {
        if self.attempts > 0 {
            self.fact.product().to_string()
        } else {
            String::new()
        }
    }

    pub fn tooltip(&self) -> String {
        format!("{} | {}/{} correct", self.fact.equation_text(), self.correct, self.attempts)
    }
}

/// 10×10 grid, row-major by the first factor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryGrid {
    pub filter: MasteryFilter,
    pub cells: Vec<MasteryCell>,
    /// False when the filter hides every cell
    pub has_match: bool,
}

impl MasteryGrid {
    pub fn cell(&self, key: FactKey) -> Option<&MasteryCell> {
        self.cells.iter().find(|c| c.fact == key)
    }
}

pub fn mastery_grid(doc: &ProgressDocument, filter: MasteryFilter) -> MasteryGrid {
    let cells: Vec<MasteryCell> = all_fact_keys()
        .map(|fact| {
            let stat = doc.fact_stat(fact);
            let status = FactStatus::of(&stat);
            MasteryCell {
                fact,
                attempts: stat.attempts,
                correct: stat.correct,
                status,
                visible: filter.shows(status),
            }
        })
        .collect();
    let has_match = cells.iter().any(|c| c.visible);
    MasteryGrid { filter, cells, has_match }
}

// ==================== WEAK FACTS ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakFact {
    pub fact: FactKey,
    pub attempts: u64,
    pub correct: u64,
    pub accuracy_pct: u32,
}

impl WeakFact {
    pub fn label(&self) -> String {
        if self.attempts == 0 {
            "Not tried yet".to_string()
        } else {
            format!("{}/{} right · {}%", self.correct, self.attempts, self.accuracy_pct)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WeakFacts {
    /// Target level has no facts
    NoFocus,
    /// Every fact of the target level is attempted and perfect
    Clean { level: usize, name: &'static str },
    Focus { level: usize, facts: Vec<WeakFact> },
}

/// Facts of the next target level most in need of practice.
///
/// Attempted but imperfect facts come first, lowest accuracy first, then more
/// attempts, then smaller `a + b`. Untried facts fill the remaining slots.
pub fn weak_facts(doc: &ProgressDocument, levels: &[Level], limit: usize) -> WeakFacts {
    let target = doc.next_target_level();
    let Some(level) = levels.get(target) else {
        return WeakFacts::NoFocus;
    };

    let mut focus = build_level_fact_pool(level);
    let mut seen = BTreeSet::new();
    focus.retain(|key| seen.insert(*key));
    if focus.is_empty() {
        return WeakFacts::NoFocus;
    }

    let mut attempted = Vec::new();
    let mut untried = Vec::new();
    for fact in focus {
        let stat = doc.fact_stat(fact);
        let item = WeakFact { fact, attempts: stat.attempts, correct: stat.correct, accuracy_pct: stat.accuracy_pct() };
        if stat.attempts == 0 {
            untried.push(item);
        } else if stat.correct < stat.attempts {
            attempted.push(item);
        }
    }

    if attempted.is_empty() && untried.is_empty() {
        return WeakFacts::Clean { level: target, name: level.friendly };
    }

    attempted.sort_by(|x, y| {
        x.accuracy_pct
            .cmp(&y.accuracy_pct)
            .then(y.attempts.cmp(&x.attempts))
            .then((x.fact.a as u32 + x.fact.b as u32).cmp(&(y.fact.a as u32 + y.fact.b as u32)))
    });
    attempted.truncate(limit);
    let remaining = limit.saturating_sub(attempted.len());
    attempted.extend(untried.into_iter().take(remaining));

    WeakFacts::Focus { level: target, facts: attempted }
}

// ==================== SUMMARY ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub overview: Overview,
    pub grid: MasteryGrid,
    pub levels: Vec<LevelPerformance>,
    pub weak: WeakFacts,
}

pub fn stats_summary(doc: &ProgressDocument, levels: &[Level], filter: MasteryFilter, weak_limit: usize) -> StatsSummary {
    StatsSummary {
        overview: overview(doc),
        grid: mastery_grid(doc, filter),
        levels: level_performance(doc, levels),
        weak: weak_facts(doc, levels, weak_limit),
    }
}
