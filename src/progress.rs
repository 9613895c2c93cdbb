//! Durable save document and the store that owns it.
//!
//! Raw saved JSON is never trusted: it is parsed into a `serde_json::Value`
//! and coerced field by field into a [`ProgressDocument`]. Anything that
//! cannot be read falls back to defaults. This is best-effort recovery: a
//! corrupted save is silently replaced by whatever could be salvaged, and
//! the player is never shown an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StorageKeys;
use crate::math_facts::{all_fact_keys, FactKey};
use crate::storage::Storage;

// ==================== DOCUMENT ====================

/// Lifetime record for one fact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactStat {
    pub attempts: u64,
    pub correct: u64,
}

impl FactStat {
    pub fn record(&mut self, is_correct: bool) {
        self.attempts = self.attempts.saturating_add(1);
        if is_correct {
            self.correct = self.correct.saturating_add(1);
        }
    }

    /// Rounded accuracy, 0 when never attempted
    pub fn accuracy_pct(&self) -> u32 {
        percent(self.correct, self.attempts)
    }
}

/// Lifetime record for one level, updated when a session finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelStat {
    pub attempts: u64,
    pub correct: u64,
    /// Sum of correct answer times (ms)
    #[serde(rename = "totalTime")]
    pub total_time_ms: u64,
    /// Fastest correct answer (ms); `None` until one exists
    #[serde(rename = "bestTime")]
    pub best_time_ms: Option<u64>,
    #[serde(rename = "bestAccuracy")]
    pub best_accuracy_pct: u32,
}

impl LevelStat {
    pub fn accuracy_pct(&self) -> u32 {
        percent(self.correct, self.attempts)
    }

    /// Average correct answer time (ms)
    pub fn avg_correct_ms(&self) -> Option<u64> {
        (self.correct > 0).then(|| self.total_time_ms / self.correct)
    }

    /// Fold one finished session into the record
    pub fn record_session(&mut self, attempts: u64, correct: u64, correct_times_ms: &[u64], accuracy_pct: u32) {
        self.attempts = self.attempts.saturating_add(attempts);
        self.correct = self.correct.saturating_add(correct);
        let session_time: u64 = correct_times_ms.iter().fold(0u64, |acc, t| acc.saturating_add(*t));
        self.total_time_ms = self.total_time_ms.saturating_add(session_time);
        if let Some(fastest) = correct_times_ms.iter().min().copied() {
            self.best_time_ms = Some(self.best_time_ms.map_or(fastest, |best| best.min(fastest)));
        }
        self.best_accuracy_pct = self.best_accuracy_pct.max(accuracy_pct.min(100));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDocument {
    /// Prefix-closed unlock flags, one per level
    pub unlocked: Vec<bool>,
    pub level_stats: Vec<LevelStat>,
    /// Always holds all 100 fact keys
    pub fact_stats: BTreeMap<FactKey, FactStat>,
    pub coins: u64,
}

impl ProgressDocument {
    /// Fresh document: first level open, everything else zeroed
    pub fn new(level_count: usize) -> Self {
        let mut unlocked = vec![false; level_count];
        if let Some(first) = unlocked.first_mut() {
            *first = true;
        }
        Self {
            unlocked,
            level_stats: vec![LevelStat::default(); level_count],
            fact_stats: all_fact_keys().map(|k| (k, FactStat::default())).collect(),
            coins: 0,
        }
    }

    /// Coerce arbitrary JSON into a valid document
    pub fn from_value(raw: &Value, level_count: usize) -> Self {
        let mut doc = Self::new(level_count);
        let Some(src) = raw.as_object() else {
            return doc;
        };

        doc.coins = coerce_count(src.get("coins"));

        if let Some(flags) = src.get("unlocked").and_then(Value::as_array) {
            for (slot, flag) in doc.unlocked.iter_mut().zip(flags.iter()) {
                if let Some(b) = flag.as_bool() {
                    *slot = b;
                }
            }
        }
        enforce_unlock_prefix(&mut doc.unlocked);

        if let Some(stats) = src.get("levelStats").and_then(Value::as_array) {
            for (slot, stat) in doc.level_stats.iter_mut().zip(stats.iter()) {
                *slot = coerce_level_stat(stat);
            }
        }

        if let Some(facts) = src.get("factStats").and_then(Value::as_object) {
            for (key, slot) in doc.fact_stats.iter_mut() {
                *slot = coerce_fact_stat(facts.get(&key.to_string()));
            }
        }

        doc
    }

    /// Parse saved text; unreadable input is treated as `{}`
    pub fn from_json_str(raw: Option<&str>, level_count: usize) -> Self {
        let value = match raw {
            Some(text) => serde_json::from_str(text).unwrap_or_else(|e| {
                log::warn!("[PROGRESS] saved data unreadable, starting fresh: {}", e);
                Value::Object(Default::default())
            }),
            None => Value::Object(Default::default()),
        };
        Self::from_value(&value, level_count)
    }

    /// Re-run normalization over this document
    pub fn normalized(&self) -> Self {
        match serde_json::to_value(self) {
            Ok(value) => Self::from_value(&value, self.unlocked.len()),
            Err(e) => {
                log::error!("[PROGRESS] failed to serialize document: {}", e);
                Self::new(self.unlocked.len())
            }
        }
    }

    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                log::error!("[PROGRESS] failed to serialize document: {}", e);
                None
            }
        }
    }

    pub fn level_count(&self) -> usize {
        self.unlocked.len()
    }

    pub fn is_unlocked(&self, level: usize) -> bool {
        self.unlocked.get(level).copied().unwrap_or(false)
    }

    /// Open `level`, keeping the prefix invariant. Returns true if it changed.
    pub fn unlock(&mut self, level: usize) -> bool {
        if level >= self.unlocked.len() || self.unlocked[level] {
            return false;
        }
        if level > 0 && !self.unlocked[level - 1] {
            log::warn!("[UNLOCK] refusing to open level {} before level {}", level, level - 1);
            return false;
        }
        self.unlocked[level] = true;
        true
    }

    pub fn unlocked_count(&self) -> usize {
        self.unlocked.iter().filter(|u| **u).count()
    }

    /// First locked level, or the last level when everything is open
    pub fn next_target_level(&self) -> usize {
        self.unlocked
            .iter()
            .position(|u| !u)
            .unwrap_or_else(|| self.unlocked.len().saturating_sub(1))
    }

    pub fn fact_stat(&self, key: FactKey) -> FactStat {
        self.fact_stats.get(&key).copied().unwrap_or_default()
    }

    pub fn record_fact(&mut self, key: FactKey, is_correct: bool) {
        self.fact_stats.entry(key).or_default().record(is_correct);
    }

    pub fn add_coins(&mut self, amount: u64) {
        self.coins = self.coins.saturating_add(amount);
    }
}

/// Rounded percentage (half up), 0 when `total` is 0
pub fn percent(done: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let done = done as u128;
    let total = total as u128;
    ((done * 200 + total) / (total * 2)) as u32
}

fn enforce_unlock_prefix(unlocked: &mut [bool]) {
    // Level 0 is always playable
    if let Some(first) = unlocked.first_mut() {
        *first = true;
    }
    for i in 1..unlocked.len() {
        if !unlocked[i - 1] {
            unlocked[i] = false;
        }
    }
}

/// Finite non-negative number, floored; anything else is 0
fn coerce_count(value: Option<&Value>) -> u64 {
    value.and_then(coerce_u64).unwrap_or(0)
}

/// Exact for integers, floored for fractions
fn coerce_u64(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n.floor() as u64)
    })
}

fn coerce_fact_stat(value: Option<&Value>) -> FactStat {
    let attempts = coerce_count(value.and_then(|v| v.get("attempts")));
    let correct = coerce_count(value.and_then(|v| v.get("correct")));
    FactStat { attempts, correct: correct.min(attempts) }
}

fn coerce_level_stat(value: &Value) -> LevelStat {
    if !value.is_object() {
        return LevelStat::default();
    }
    let attempts = coerce_count(value.get("attempts"));
    let correct = coerce_count(value.get("correct")).min(attempts);
    let best_time_ms = value
        .get("bestTime")
        .and_then(coerce_u64);
    LevelStat {
        attempts,
        correct,
        total_time_ms: coerce_count(value.get("totalTime")),
        best_time_ms,
        best_accuracy_pct: coerce_count(value.get("bestAccuracy")).min(100) as u32,
    }
}

// ==================== STORE ====================

/// Owns the cached document and its debounced persistence
pub struct ProgressStore {
    storage: Storage,
    keys: StorageKeys,
    level_count: usize,
    debounce_ms: u64,
    doc: Option<ProgressDocument>,
    /// Deadline of the pending debounced write
    save_due_at: Option<u64>,
    dirty: bool,
}

impl ProgressStore {
    pub fn new(storage: Storage, keys: StorageKeys, level_count: usize, debounce_ms: u64) -> Self {
        Self {
            storage,
            keys,
            level_count,
            debounce_ms,
            doc: None,
            save_due_at: None,
            dirty: false,
        }
    }

    pub fn storage_mut(&mut self) -> &mut Storage {
        &mut self.storage
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Read and normalize whatever is currently saved (bypasses the cache)
    pub fn load(&mut self) -> ProgressDocument {
        let raw = self.storage.get(&self.keys.data);
        ProgressDocument::from_json_str(raw.as_deref(), self.level_count)
    }

    /// Cached document, loaded on first access and mutated in place afterwards
    pub fn get(&mut self) -> &mut ProgressDocument {
        let doc = match self.doc.take() {
            Some(doc) => doc,
            None => {
                let doc = self.load();
                log::debug!("[PROGRESS] loaded: {} levels open, {} coins", doc.unlocked_count(), doc.coins);
                doc
            }
        };
        self.doc.insert(doc)
    }

    /// Read-only view; loads like [`ProgressStore::get`]
    pub fn document(&mut self) -> &ProgressDocument {
        self.get()
    }

    /// Schedule a write of the cached document, replacing any pending deadline
    pub fn queue_save(&mut self, now: u64) {
        self.dirty = true;
        self.save_due_at = Some(now.saturating_add(self.debounce_ms));
    }

    pub fn has_pending_save(&self) -> bool {
        self.dirty
    }

    pub fn save_due_at(&self) -> Option<u64> {
        self.save_due_at
    }

    /// Perform the debounced write if its deadline has passed
    pub fn poll(&mut self, now: u64) -> bool {
        match self.save_due_at {
            Some(due) if due <= now => {
                self.save_due_at = None;
                self.write_pending()
            }
            _ => false,
        }
    }

    /// Cancel the debounce and write immediately if anything is outstanding
    pub fn flush(&mut self) -> bool {
        self.save_due_at = None;
        self.write_pending()
    }

    fn write_pending(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.dirty = false;
        let Some(json) = self.doc.as_ref().and_then(ProgressDocument::to_json) else {
            return false;
        };
        self.storage.set(&self.keys.data, &json);
        true
    }

    /// Forget everything: delete all persisted keys and start over
    pub fn reset_all(&mut self) {
        for key in self.keys.all() {
            self.storage.remove(key);
        }
        self.save_due_at = None;
        self.dirty = false;
        self.doc = Some(ProgressDocument::new(self.level_count));
        log::info!("[PROGRESS] all progress reset");
    }
}

impl Drop for ProgressStore {
    fn drop(&mut self) {
        self.flush();
    }
}
