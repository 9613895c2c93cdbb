//! Question sequences and multiple-choice options.

use rand::Rng;

use crate::math_facts::{FactKey, Level, FACT_MAX, FACT_MIN};

/// Options offered in choice mode, the correct answer included
pub const CHOICE_COUNT: usize = 4;

/// Candidate distances from the correct answer for wrong options
const CHOICE_OFFSETS: [i64; 10] = [-2, -1, 1, 2, 3, -3, 4, -4, 5, -5];

/// Canonical (unshuffled) pool: each table in order, then b = 1..=10
pub fn build_level_fact_pool(level: &Level) -> Vec<FactKey> {
    level
        .tables
        .iter()
        .flat_map(|&table| (FACT_MIN..=FACT_MAX).map(move |b| FactKey::new(table, b)))
        .collect()
}

/// Fisher–Yates: for i from the last index down to 1, swap with j in [0, i]
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Every fact of the level exactly once, in random order
pub fn generate_session<R: Rng + ?Sized>(level: &Level, rng: &mut R) -> Vec<FactKey> {
    let mut pool = build_level_fact_pool(level);
    shuffle(&mut pool, rng);
    pool
}

/// Four distinct positive options including `correct`, in random order.
///
/// The offsets contain +1..=+5 and -1..=-5, so at least five in-range
/// candidates exist for any `correct >= 1` and all four slots get filled.
pub fn generate_choices<R: Rng + ?Sized>(correct: u32, rng: &mut R) -> Vec<u32> {
    let mut options = vec![correct];
    let mut offsets = CHOICE_OFFSETS;
    shuffle(&mut offsets, rng);

    for offset in offsets {
        if options.len() >= CHOICE_COUNT {
            break;
        }
        let candidate = i64::from(correct) + offset;
        if candidate <= 0 {
            continue;
        }
        let Ok(candidate) = u32::try_from(candidate) else {
            continue;
        };
        if !options.contains(&candidate) {
            options.push(candidate);
        }
    }

    shuffle(&mut options, rng);
    options
}

/// Short label for the tables a level covers, e.g. `"3×1-10"` or `"2×1-10, 4×1-10"`
pub fn level_progress_label(level: &Level) -> String {
    let mut tables: Vec<u8> = level.tables.to_vec();
    tables.sort_unstable();
    tables.dedup();
    tables
        .iter()
        .map(|t| format!("{}×{}-{}", t, FACT_MIN, FACT_MAX))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math_facts::LEVELS;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    static DOUBLE_LEVEL: Level = Level {
        index: 0,
        name: "×4/×2",
        friendly: "Mixed",
        color: "#000000",
        tables: &[4, 2, 4],
        hint: "",
    };

    #[test]
    fn test_pool_preserves_table_then_b_order() {
        let pool = build_level_fact_pool(&LEVELS[2]);
        let expected: Vec<FactKey> = (1..=10).map(|b| FactKey::new(3, b)).collect();
        assert_eq!(pool, expected);

        let pool = build_level_fact_pool(&DOUBLE_LEVEL);
        assert_eq!(pool.len(), 30);
        assert_eq!(pool[0], FactKey::new(4, 1));
        assert_eq!(pool[10], FactKey::new(2, 1));
        assert_eq!(pool[29], FactKey::new(4, 10));
    }

    #[test]
    fn test_session_is_permutation_of_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        for level in LEVELS.iter() {
            let mut session = generate_session(level, &mut rng);
            let mut pool = build_level_fact_pool(level);
            session.sort();
            pool.sort();
            assert_eq!(session, pool);
        }
    }

    #[test]
    fn test_shuffle_handles_tiny_slices() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut empty: [u8; 0] = [];
        shuffle(&mut empty, &mut rng);
        let mut one = [5];
        shuffle(&mut one, &mut rng);
        assert_eq!(one, [5]);
    }

    #[test]
    fn test_choices_always_four_distinct_positive() {
        let mut rng = StdRng::seed_from_u64(42);
        for a in FACT_MIN..=FACT_MAX {
            for b in FACT_MIN..=FACT_MAX {
                let correct = FactKey::new(a, b).product();
                for _ in 0..20 {
                    let choices = generate_choices(correct, &mut rng);
                    assert_eq!(choices.len(), CHOICE_COUNT);
                    assert!(choices.contains(&correct));
                    assert!(choices.iter().all(|c| *c > 0));
                    let mut unique = choices.clone();
                    unique.sort_unstable();
                    unique.dedup();
                    assert_eq!(unique.len(), CHOICE_COUNT, "duplicates in {:?}", choices);
                }
            }
        }
    }

    #[test]
    fn test_choices_stay_near_answer() {
        let mut rng = StdRng::seed_from_u64(3);
        let choices = generate_choices(1, &mut rng);
        assert!(choices.iter().all(|c| (1..=6).contains(c)));
        let choices = generate_choices(100, &mut rng);
        assert!(choices.iter().all(|c| (95..=105).contains(c)));
    }

    #[test]
    fn test_choices_near_u32_max_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..20 {
            let choices = generate_choices(u32::MAX - 1, &mut rng);
            assert_eq!(choices.len(), CHOICE_COUNT);
            assert!(choices.contains(&(u32::MAX - 1)));
            assert!(choices.iter().all(|c| *c >= u32::MAX - 6));
        }
    }

    #[test]
    fn test_progress_label() {
        assert_eq!(level_progress_label(&LEVELS[6]), "7×1-10");
        assert_eq!(level_progress_label(&DOUBLE_LEVEL), "2×1-10, 4×1-10");
    }
}
