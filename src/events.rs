//! Plain data handed to the presentation layer.

use serde::Serialize;

use crate::math_facts::FactKey;

/// Screen the host should show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    #[default]
    Home,
    Game,
    Results,
    Stats,
}

/// Mascot reaction to a graded answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    /// Streak of 5 or more
    Dance,
    Sad,
}

/// Transient overlay with a scheduled dismissal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Overlay {
    /// Reveals the correct equation after a miss
    WrongAnswer { equation: String },
    /// Streak celebration
    Milestone { streak: u32, text: &'static str },
}

/// One graded submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub fact: FactKey,
    pub answer: u64,
    pub correct: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub fact: FactKey,
    pub text: String,
    /// 1-based position in the session
    pub number: usize,
    pub total: usize,
    /// Digits in the expected answer; caps typed input
    pub expected_len: usize,
    /// Present in choice mode
    pub choices: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub fact: FactKey,
    pub answer: u64,
    pub expected: u32,
    pub correct: bool,
    pub elapsed_ms: u64,
    pub lives: u8,
    pub streak: u32,
    pub coins_awarded: u64,
    /// First correct answer for this fact in the session
    pub newly_mastered: bool,
    pub mastered: usize,
    pub total: usize,
    pub mood: Mood,
    pub milestone: Option<&'static str>,
    /// Lives ran out; results follow after the fail delay
    pub out_of_lives: bool,
}

/// Headline on the results screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultTitle {
    Perfect,
    Amazing,
    Great,
    GoodTry,
    KeepPracticing,
}

impl ResultTitle {
    pub fn from_score(accuracy_pct: u32, passed: bool) -> Self {
        if accuracy_pct >= 100 {
            ResultTitle::Perfect
        } else if accuracy_pct >= 93 {
            ResultTitle::Amazing
        } else if accuracy_pct >= 80 {
            ResultTitle::Great
        } else if passed {
            ResultTitle::GoodTry
        } else {
            ResultTitle::KeepPracticing
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            ResultTitle::Perfect => "Perfect Score!",
            ResultTitle::Amazing => "Amazing!",
            ResultTitle::Great => "Great Job!",
            ResultTitle::GoodTry => "Good Try!",
            ResultTitle::KeepPracticing => "Keep Practicing!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResults {
    pub level: usize,
    pub attempts: usize,
    pub correct: usize,
    pub accuracy_pct: u32,
    pub stars: u8,
    pub avg_correct_ms: Option<u64>,
    pub max_streak: u32,
    pub mastered: usize,
    pub total: usize,
    pub passed: bool,
    /// Passed and another level exists after this one
    pub next_level_available: bool,
    /// Level opened by this session, if it was locked before
    pub newly_unlocked: Option<usize>,
    pub title: ResultTitle,
    /// Accuracy high enough for confetti
    pub celebrate: bool,
    /// Most recent attempts, oldest first
    pub answer_log: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GameEvent {
    QuestionPresented(QuestionView),
    ChoicesChanged(Option<Vec<u32>>),
    Graded(GradeOutcome),
    TimerTick { text: String },
    OverlayShown { id: u64, overlay: Overlay },
    OverlayDismissed { id: u64 },
    SessionCompleted(SessionResults),
    Navigated(Screen),
}
