//! Math Master: a times-table drill game core.
//!
//! Storage, progress tracking, question generation, the session state
//! machine and statistics. Rendering, input devices, sound and animation
//! belong to the host, which drives everything through [`Game`].

pub mod clock;
pub mod config;
pub mod events;
pub mod game;
pub mod math_facts;
pub mod preferences;
pub mod progress;
pub mod questions;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, GameConfig, StorageKeys};
pub use events::{AttemptRecord, GameEvent, GradeOutcome, Mood, Overlay, QuestionView, ResultTitle, Screen, SessionResults};
pub use game::{Game, GameUpdate, HomeSummary};
pub use math_facts::{parse_fact_key, FactKey, Level, LEVELS};
pub use preferences::{AnswerMode, Preferences, Theme};
pub use progress::{FactStat, LevelStat, ProgressDocument, ProgressStore};
pub use session::{Phase, SessionEngine, SessionSnapshot};
pub use stats::{FactStatus, MasteryFilter, StatsSummary, WeakFacts};
pub use storage::{FileStore, KeyValueStore, MemoryStore, Storage, StorageError};
