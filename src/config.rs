//! Tunable timings, limits and storage key names.

use serde::Deserialize;
use thiserror::Error;

/// Lives at the start of every session
pub const MAX_LIVES: u8 = 3;

/// Delay after a correct answer before the next question (ms)
pub const ADVANCE_DELAY_MS: u64 = 700;

/// Delay after the last life is lost before results (ms)
pub const FAIL_DELAY_MS: u64 = 1400;

/// Debounce window for progress writes (ms)
pub const SAVE_DEBOUNCE_MS: u64 = 600;

/// Per-question elapsed timer resolution (ms)
pub const QUESTION_TICK_MS: u64 = 250;

/// Wrong-answer overlay lifetime (ms)
pub const WRONG_OVERLAY_MS: u64 = 1300;

/// Streak milestone overlay lifetime (ms)
pub const MILESTONE_OVERLAY_MS: u64 = 1500;

/// Rows kept in the results answer log
pub const MAX_ANSWER_LOG_ROWS: usize = 30;

/// Entries shown in the weak-facts list
pub const WEAK_FACT_LIMIT: usize = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Names of the four persisted keys
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageKeys {
    pub data: String,
    pub mode: String,
    pub fast_mode: String,
    pub theme: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            data: "mm_data".to_string(),
            mode: "mm_mode".to_string(),
            fast_mode: "mm_fast_mode".to_string(),
            theme: "mm_theme".to_string(),
        }
    }
}

impl StorageKeys {
    pub fn all(&self) -> [&str; 4] {
        [&self.data, &self.mode, &self.fast_mode, &self.theme]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameConfig {
    pub max_lives: u8,
    pub advance_delay_ms: u64,
    pub fail_delay_ms: u64,
    pub save_debounce_ms: u64,
    pub question_tick_ms: u64,
    pub wrong_overlay_ms: u64,
    pub milestone_overlay_ms: u64,
    pub answer_log_rows: usize,
    pub weak_fact_limit: usize,
    pub storage_keys: StorageKeys,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_lives: MAX_LIVES,
            advance_delay_ms: ADVANCE_DELAY_MS,
            fail_delay_ms: FAIL_DELAY_MS,
            save_debounce_ms: SAVE_DEBOUNCE_MS,
            question_tick_ms: QUESTION_TICK_MS,
            wrong_overlay_ms: WRONG_OVERLAY_MS,
            milestone_overlay_ms: MILESTONE_OVERLAY_MS,
            answer_log_rows: MAX_ANSWER_LOG_ROWS,
            weak_fact_limit: WEAK_FACT_LIMIT,
            storage_keys: StorageKeys::default(),
        }
    }
}

impl GameConfig {
    /// Parse host-supplied JSON; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lives == 0 {
            return Err(ConfigError::Invalid("maxLives must be at least 1".to_string()));
        }
        if self.question_tick_ms == 0 {
            return Err(ConfigError::Invalid("questionTickMs must be positive".to_string()));
        }
        let keys = self.storage_keys.all();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(ConfigError::Invalid("storage keys must be non-empty".to_string()));
        }
        for (i, key) in keys.iter().enumerate() {
            if keys[i + 1..].contains(key) {
                return Err(ConfigError::Invalid(format!("duplicate storage key {}", key)));
            }
        }
        Ok(())
    }
}
