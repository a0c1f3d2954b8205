//! Test composition and answer scoring.
//!
//! A generated test targets [`QUESTIONS_PER_TEST`] questions, split as evenly
//! as possible across the requested themes; each theme's share is then drawn
//! uniformly at random from its question pool. Scoring is exact-match for
//! single-answer questions and set overlap with an over-answer penalty for
//! multi-answer ones.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

/// Target number of questions in a generated test.
pub const QUESTIONS_PER_TEST: usize = 20;

/// Multi-part canonical answers and submissions are split on this.
pub const ANSWER_SEPARATOR: &str = "; ";

/// Splits `total` questions across `theme_count` themes so that the
/// allocations sum to exactly `total` and no two differ by more than one.
/// The first `total % theme_count` themes, in the order the caller supplied
/// them, receive the extra question.
pub fn question_amounts(total: usize, theme_count: usize) -> Vec<usize> {
    if theme_count == 0 {
        return Vec::new();
    }
    let base = total / theme_count;
    let overhead = total - theme_count * base;
    (0..theme_count)
        .map(|i| if i < overhead { base + 1 } else { base })
        .collect()
}

/// Draws up to `amount` question ids from `pool`, uniformly and without
/// replacement. A pool smaller than `amount` is returned whole.
pub fn sample_questions<R: Rng + ?Sized>(rng: &mut R, pool: &[i32], amount: usize) -> Vec<i32> {
    pool.choose_multiple(rng, amount).copied().collect()
}

/// Computes the mark for a submission against the canonical answer.
///
/// With `max_mark == 1` the submission must match the canonical answer
/// exactly (case-sensitive). Otherwise both strings are treated as sets of
/// `"; "`-separated parts: one point per part in common, minus the number of
/// surplus parts when the submission is larger than the canonical set. The
/// result is clamped at zero from below. There is deliberately no clamp to
/// `max_mark` from above; a canonical set larger than `max_mark` would let
/// marks exceed it, and entry-time validation is expected to keep the part
/// count within `max_mark`.
pub fn mark_answer(canonical: &str, max_mark: i32, given: &str) -> i32 {
    if max_mark == 1 {
        return if canonical == given { 1 } else { 0 };
    }
    let wanted: HashSet<&str> = canonical.split(ANSWER_SEPARATOR).collect();
    let got: HashSet<&str> = given.split(ANSWER_SEPARATOR).collect();
    let mut mark = if got.len() > wanted.len() {
        wanted.len() as i32 - got.len() as i32
    } else {
        0
    };
    mark += wanted.intersection(&got).count() as i32;
    mark.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn amounts_sum_to_total_and_stay_fair() {
        for total in 1..=40 {
            for themes in 1..=total {
                let amounts = question_amounts(total, themes);
                assert_eq!(amounts.len(), themes);
                assert_eq!(amounts.iter().sum::<usize>(), total);
                let max = *amounts.iter().max().unwrap();
                let min = *amounts.iter().min().unwrap();
                assert!(max - min <= 1, "total={} themes={}", total, themes);
            }
        }
    }

    #[test]
    fn amounts_front_load_the_remainder() {
        assert_eq!(question_amounts(20, 3), vec![7, 7, 6]);
        assert_eq!(question_amounts(20, 6), vec![4, 4, 3, 3, 3, 3]);
        assert_eq!(question_amounts(20, 1), vec![20]);
        assert_eq!(question_amounts(20, 20), vec![1; 20]);
    }

    #[test]
    fn amounts_with_no_themes_is_empty() {
        assert!(question_amounts(20, 0).is_empty());
    }

    #[test]
    fn sampling_never_repeats_and_respects_pool_size() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool: Vec<i32> = (1..=50).collect();
        for amount in &[0usize, 1, 7, 50, 80] {
            let drawn = sample_questions(&mut rng, &pool, *amount);
            assert_eq!(drawn.len(), (*amount).min(pool.len()));
            let unique: HashSet<i32> = drawn.iter().copied().collect();
            assert_eq!(unique.len(), drawn.len());
            assert!(drawn.iter().all(|id| pool.contains(id)));
        }
    }

    #[test]
    fn sampling_from_empty_pool_is_empty() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(sample_questions(&mut rng, &[], 5).is_empty());
    }

    #[test]
    fn single_answer_is_exact_and_case_sensitive() {
        assert_eq!(mark_answer("Paris", 1, "Paris"), 1);
        assert_eq!(mark_answer("Paris", 1, "paris"), 0);
        assert_eq!(mark_answer("Paris", 1, ""), 0);
    }

    #[test]
    fn multi_answer_awards_intersection() {
        assert_eq!(mark_answer("A; B; C", 3, "A; B"), 2);
        assert_eq!(mark_answer("A; B; C", 3, "A; B; C"), 3);
        assert_eq!(mark_answer("A; B; C", 3, "C; A; B"), 3);
        assert_eq!(mark_answer("A; B; C", 3, "D; E"), 0);
    }

    #[test]
    fn over_answering_is_penalized_then_clamped_at_zero() {
        // two surplus parts cancel the two correct ones
        assert_eq!(mark_answer("A; B", 3, "A; B; C; D"), 0);
        assert_eq!(mark_answer("A; B", 3, "A; B; C"), 1);
        assert_eq!(mark_answer("A; B", 3, "C; D; E; F; G"), 0);
    }

    #[test]
    fn duplicate_parts_collapse() {
        assert_eq!(mark_answer("A; B", 2, "A; A; B"), 2);
        assert_eq!(mark_answer("A; B; C", 3, "A; A; A"), 1);
    }

    #[test]
    fn no_upper_clamp_when_canonical_exceeds_max_mark() {
        // four-part canonical on a max_mark 3 question still scores 4
        assert_eq!(mark_answer("A; B; C; D", 3, "A; B; C; D"), 4);
    }
}
