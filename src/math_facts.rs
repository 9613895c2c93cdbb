//! Static level table and multiplication fact keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Smallest operand on either side of a fact
pub const FACT_MIN: u8 = 1;

/// Largest operand on either side of a fact
pub const FACT_MAX: u8 = 10;

/// Number of distinct ordered facts (10 × 10)
pub const TOTAL_FACTS: usize = ((FACT_MAX - FACT_MIN + 1) as usize) * ((FACT_MAX - FACT_MIN + 1) as usize);

// ==================== FACT KEYS ====================

/// Ordered multiplication pair. `3x7` and `7x3` are different facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactKey {
    pub a: u8,
    pub b: u8,
}

impl FactKey {
    pub const fn new(a: u8, b: u8) -> Self {
        Self { a, b }
    }

    /// Expected answer
    pub fn product(&self) -> u32 {
        self.a as u32 * self.b as u32
    }

    /// Digit count of the expected answer (1 for 6, 2 for 10, 3 for 100)
    pub fn answer_len(&self) -> usize {
        self.product().to_string().len()
    }

    /// Both operands inside [FACT_MIN, FACT_MAX]
    pub fn in_range(&self) -> bool {
        (FACT_MIN..=FACT_MAX).contains(&self.a) && (FACT_MIN..=FACT_MAX).contains(&self.b)
    }

    /// Question text shown to the player
    pub fn question_text(&self) -> String {
        format!("{} × {} = ?", self.a, self.b)
    }

    /// Full equation, used when revealing a missed answer
    pub fn equation_text(&self) -> String {
        format!("{} × {} = {}", self.a, self.b, self.product())
    }
}

impl fmt::Display for FactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.a, self.b)
    }
}

/// Parse a canonical `"{a}x{b}"` key. Out-of-range operands are rejected.
pub fn parse_fact_key(key: &str) -> Option<FactKey> {
    let (left, right) = key.split_once('x')?;
    let a: u8 = left.parse().ok()?;
    let b: u8 = right.parse().ok()?;
    let fact = FactKey::new(a, b);
    fact.in_range().then_some(fact)
}

impl FromStr for FactKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fact_key(s).ok_or_else(|| format!("Invalid fact key: {}", s))
    }
}

impl Serialize for FactKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FactKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Every fact key, `a` major then `b`
pub fn all_fact_keys() -> impl Iterator<Item = FactKey> {
    (FACT_MIN..=FACT_MAX).flat_map(|a| (FACT_MIN..=FACT_MAX).map(move |b| FactKey::new(a, b)))
}

// ==================== LEVELS ====================

/// Immutable level definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    /// Position in the level list (0-based)
    pub index: usize,
    /// Short display name, e.g. "×3"
    pub name: &'static str,
    /// Friendly name, e.g. "Threes"
    pub friendly: &'static str,
    /// Accent color as CSS hex
    pub color: &'static str,
    /// Multiplication tables practiced in this level
    pub tables: &'static [u8],
    /// Hint shown on the home screen
    pub hint: &'static str,
}

impl Level {
    /// Hint line, falling back to the first table when no hint is set
    pub fn hint_line(&self) -> String {
        if !self.hint.is_empty() {
            return self.hint.to_string();
        }
        match self.tables.first() {
            Some(t) => format!("Practice {}-{} × {}", FACT_MIN, FACT_MAX, t),
            None => String::new(),
        }
    }
}

/// One level per times table, 1 through 10
pub static LEVELS: [Level; 10] = [
    Level { index: 0, name: "×1", friendly: "Ones", color: "#f59e0b", tables: &[1], hint: "1s across the table" },
    Level { index: 1, name: "×2", friendly: "Twos", color: "#10b981", tables: &[2], hint: "2s from 1 to 10" },
    Level { index: 2, name: "×3", friendly: "Threes", color: "#3b82f6", tables: &[3], hint: "3s from 1 to 10" },
    Level { index: 3, name: "×4", friendly: "Fours", color: "#ec4899", tables: &[4], hint: "4s from 1 to 10" },
    Level { index: 4, name: "×5", friendly: "Fives", color: "#8b5cf6", tables: &[5], hint: "5s from 1 to 10" },
    Level { index: 5, name: "×6", friendly: "Sixes", color: "#f97316", tables: &[6], hint: "6s from 1 to 10" },
    Level { index: 6, name: "×7", friendly: "Sevens", color: "#06b6d4", tables: &[7], hint: "7s from 1 to 10" },
    Level { index: 7, name: "×8", friendly: "Eights", color: "#ef4444", tables: &[8], hint: "8s from 1 to 10" },
    Level { index: 8, name: "×9", friendly: "Nines", color: "#14b8a6", tables: &[9], hint: "9s from 1 to 10" },
    Level { index: 9, name: "×10", friendly: "Tens", color: "#a855f7", tables: &[10], hint: "10s from 1 to 10" },
];
