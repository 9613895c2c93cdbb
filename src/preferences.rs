//! Player preferences stored next to the progress document.

use serde::{Deserialize, Serialize};

use crate::config::StorageKeys;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Keyboard entry
    #[default]
    Type,
    /// Pick one of four options
    Choice,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerMode::Type => "type",
            AnswerMode::Choice => "choice",
        }
    }

    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("choice") => AnswerMode::Choice,
            _ => AnswerMode::Type,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            AnswerMode::Type => AnswerMode::Choice,
            AnswerMode::Choice => AnswerMode::Type,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("light") => Theme::Light,
            _ => Theme::Dark,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub answer_mode: AnswerMode,
    /// Auto-submit once the typed answer reaches the expected length
    pub fast_mode: bool,
    pub theme: Theme,
}

impl Preferences {
    /// Unknown or missing values fall back to defaults
    pub fn load(storage: &mut Storage, keys: &StorageKeys) -> Self {
        Self {
            answer_mode: AnswerMode::parse(storage.get(&keys.mode).as_deref()),
            fast_mode: storage.get_bool(&keys.fast_mode),
            theme: Theme::parse(storage.get(&keys.theme).as_deref()),
        }
    }

    pub fn toggle_answer_mode(&mut self, storage: &mut Storage, keys: &StorageKeys) -> AnswerMode {
        self.answer_mode = self.answer_mode.toggled();
        storage.set(&keys.mode, self.answer_mode.as_str());
        log::debug!("[PREFS] answer mode {}", self.answer_mode.as_str());
        self.answer_mode
    }

    pub fn toggle_fast_mode(&mut self, storage: &mut Storage, keys: &StorageKeys) -> bool {
        self.fast_mode = !self.fast_mode;
        storage.set(&keys.fast_mode, if self.fast_mode { "1" } else { "0" });
        log::debug!("[PREFS] fast mode {}", self.fast_mode);
        self.fast_mode
    }

    pub fn toggle_theme(&mut self, storage: &mut Storage, keys: &StorageKeys) -> Theme {
        self.theme = self.theme.toggled();
        storage.set(&keys.theme, self.theme.as_str());
        self.theme
    }
}
