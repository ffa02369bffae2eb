//! Hybrid Scoring - Forgetting Curve, Popularity, and Final Blend
//!
//! `TigerStyle`: Pure functions, every score clamped to [0, 1], no error
//! paths. Numeric edge cases are clamped rather than propagated.
//!
//! The scorer turns a raw semantic similarity into a final ranking score by
//! blending in two behavioral signals:
//!
//! - **time score**: a forgetting curve `1.84 / (ln(h)^1.25 + 1.84)` over
//!   hours since last access — fresh memories score near 1, stale ones decay
//! - **popularity score**: `1 - e^(-eps * count)` — saturating in the access
//!   count
//!
//! `final = alpha * semantic + beta * popularity + gamma * time`, with the
//! weights validated to sum to 1.0 at configuration time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::constants::{
    SCORE_POPULARITY_EPSILON_DEFAULT, SCORE_WEIGHT_POPULARITY_DEFAULT,
    SCORE_WEIGHT_SEMANTIC_DEFAULT, SCORE_WEIGHT_SUM_TOLERANCE, SCORE_WEIGHT_TIME_DEFAULT,
    TIME_SCORE_CURVE_EXPONENT, TIME_SCORE_CURVE_STRENGTH, TIME_SCORE_HOURS_MIN,
};
use crate::retrieval::ScoredFragment;
use crate::storage::AccessInfo;

// =============================================================================
// Score Weights
// =============================================================================

/// Weights for the final-score blend plus the popularity steepness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    /// Weight of the semantic similarity component (alpha)
    pub semantic: f64,
    /// Weight of the popularity component (beta)
    pub popularity: f64,
    /// Weight of the recency component (gamma)
    pub time: f64,
    /// Steepness of the popularity curve (epsilon)
    pub epsilon: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            semantic: SCORE_WEIGHT_SEMANTIC_DEFAULT,
            popularity: SCORE_WEIGHT_POPULARITY_DEFAULT,
            time: SCORE_WEIGHT_TIME_DEFAULT,
            epsilon: SCORE_POPULARITY_EPSILON_DEFAULT,
        }
    }
}

impl ScoreWeights {
    /// Whether the three blend weights sum to 1.0 within tolerance and the
    /// popularity steepness is positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let sum = self.semantic + self.popularity + self.time;
        (sum - 1.0).abs() <= SCORE_WEIGHT_SUM_TOLERANCE
            && self.semantic >= 0.0
            && self.popularity >= 0.0
            && self.time >= 0.0
            && self.epsilon > 0.0
    }
}

// =============================================================================
// Hybrid Scorer
// =============================================================================

/// Pure, stateless rescoring engine.
#[derive(Debug, Clone)]
pub struct HybridScorer {
    weights: ScoreWeights,
}

impl HybridScorer {
    /// Create a scorer from validated weights.
    ///
    /// # Panics
    /// Panics if the weights were not validated (configuration validates them
    /// before any scorer is built).
    #[must_use]
    pub fn new(weights: ScoreWeights) -> Self {
        // Precondition
        assert!(weights.is_valid(), "score weights must be validated first");
        Self { weights }
    }

    /// The configured weights.
    #[must_use]
    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    /// Forgetting-curve recency score for a fragment's last access.
    ///
    /// Never-accessed fragments score exactly 0 (they rank lowest on
    /// recency). Accesses within the last hour score 1.0; beyond that the
    /// curve `1.84 / (ln(h)^1.25 + 1.84)` decays strictly with elapsed time.
    #[must_use]
    pub fn time_score(&self, last_access: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        let Some(last_access) = last_access else {
            return 0.0;
        };

        let elapsed_ms = (now - last_access).num_milliseconds().max(0) as f64;
        let hours = (elapsed_ms / 3_600_000.0).max(TIME_SCORE_HOURS_MIN);

        // ln(h) <= 0 inside the first hour; a fractional power of a negative
        // base is NaN, so the curve starts at its cap instead.
        let ln_hours = hours.ln();
        if ln_hours <= 0.0 {
            return 1.0;
        }

        let score =
            TIME_SCORE_CURVE_STRENGTH / (ln_hours.powf(TIME_SCORE_CURVE_EXPONENT) + TIME_SCORE_CURVE_STRENGTH);
        let score = score.clamp(0.0, 1.0);

        // Postcondition
        assert!((0.0..=1.0).contains(&score), "time score must be in [0, 1]");
        score
    }

    /// Saturating popularity score: `1 - e^(-eps * count)`.
    ///
    /// Zero at count 0, monotonically increasing, asymptotic to 1.
    #[must_use]
    pub fn popularity_score(&self, access_count: u64) -> f64 {
        let score = 1.0 - (-self.weights.epsilon * access_count as f64).exp();
        let score = score.clamp(0.0, 1.0);

        // Postcondition
        assert!(
            (0.0..=1.0).contains(&score),
            "popularity score must be in [0, 1]"
        );
        score
    }

    /// Weighted blend of the three sub-scores, clamped to [0, 1].
    #[must_use]
    pub fn final_score(&self, semantic: f64, popularity: f64, time: f64) -> f64 {
        let score = self.weights.semantic * semantic
            + self.weights.popularity * popularity
            + self.weights.time * time;
        score.clamp(0.0, 1.0)
    }

    /// Rescore candidates in place using their access statistics.
    ///
    /// A candidate missing from `access_info` scores 0 on both popularity and
    /// recency. Does not sort; ordering is the caller's responsibility.
    pub fn rescore(
        &self,
        results: &mut [ScoredFragment],
        access_info: &HashMap<String, AccessInfo>,
        now: DateTime<Utc>,
    ) {
        for result in results.iter_mut() {
            let (popularity, time) = match access_info.get(&result.fragment.id) {
                Some(info) => (
                    self.popularity_score(info.access_count),
                    self.time_score(Some(info.last_accessed_at), now),
                ),
                None => (0.0, 0.0),
            };

            result.popularity_score = popularity;
            result.time_score = time;
            result.final_score = self.final_score(result.semantic_score, popularity, time);
        }
    }
}

impl Default for HybridScorer {
    fn default() -> Self {
        Self::new(ScoreWeights::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::SimClock;
    use crate::storage::{FragmentBuilder, MemoryLayer};
    use chrono::Duration;

    fn scorer() -> HybridScorer {
        HybridScorer::default()
    }

    // =========================================================================
    // Popularity Score
    // =========================================================================

    #[test]
    fn test_popularity_zero_at_zero_count() {
        assert_eq!(scorer().popularity_score(0), 0.0);
    }

    #[test]
    fn test_popularity_strictly_increasing() {
        let s = scorer();
        let mut prev = s.popularity_score(0);
        for count in 1..50 {
            let next = s.popularity_score(count);
            assert!(next > prev, "popularity must increase at count {count}");
            prev = next;
        }
    }

    #[test]
    fn test_popularity_asymptotic_to_one() {
        let s = scorer();
        let near_one = s.popularity_score(1_000);
        assert!(near_one > 0.999);
        assert!(near_one <= 1.0);
    }

    // =========================================================================
    // Time Score
    // =========================================================================

    #[test]
    fn test_time_score_unset_is_zero() {
        let clock = SimClock::at_ms(1_000_000);
        assert_eq!(scorer().time_score(None, clock.now()), 0.0);
    }

    #[test]
    fn test_time_score_recent_access_is_one() {
        let clock = SimClock::at_ms(1_000_000);
        let now = clock.now();
        assert_eq!(scorer().time_score(Some(now), now), 1.0);
        assert_eq!(
            scorer().time_score(Some(now - Duration::minutes(30)), now),
            1.0
        );
    }

    #[test]
    fn test_time_score_decreases_with_elapsed_time() {
        let s = scorer();
        let clock = SimClock::at_ms(0);
        let last = clock.now();

        let mut prev = f64::INFINITY;
        for hours in [2_i64, 5, 24, 24 * 7, 24 * 30] {
            let now = last + Duration::hours(hours);
            let score = s.time_score(Some(last), now);
            assert!(
                score < prev,
                "time score must decrease: {score} at {hours}h not below {prev}"
            );
            assert!((0.0..=1.0).contains(&score));
            prev = score;
        }
    }

    #[test]
    fn test_time_score_known_value() {
        // At e hours: ln(h) = 1, so score = 1.84 / (1 + 1.84).
        let s = scorer();
        let last = SimClock::at_ms(0).now();
        let now = last + Duration::milliseconds((std::f64::consts::E * 3_600_000.0) as i64);
        let score = s.time_score(Some(last), now);
        assert!((score - 1.84 / 2.84).abs() < 0.001);
    }

    // =========================================================================
    // Final Score
    // =========================================================================

    #[test]
    fn test_final_score_bounds() {
        let s = scorer();
        assert!((s.final_score(1.0, 1.0, 1.0) - 1.0).abs() < 1e-9);
        assert_eq!(s.final_score(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_final_score_example_blend() {
        // Weights (0.5, 0.3, 0.2): 0.5*0.8 + 0.3*0.5 + 0.2*0.3 = 0.61
        let s = scorer();
        assert!((s.final_score(0.8, 0.5, 0.3) - 0.61).abs() < 1e-9);
    }

    // =========================================================================
    // Weights
    // =========================================================================

    #[test]
    fn test_default_weights_valid() {
        assert!(ScoreWeights::default().is_valid());
    }

    #[test]
    fn test_weights_bad_sum_invalid() {
        let weights = ScoreWeights {
            semantic: 0.5,
            popularity: 0.5,
            time: 0.5,
            epsilon: 0.1,
        };
        assert!(!weights.is_valid());
    }

    #[test]
    fn test_weights_zero_epsilon_invalid() {
        let weights = ScoreWeights {
            epsilon: 0.0,
            ..ScoreWeights::default()
        };
        assert!(!weights.is_valid());
    }

    #[test]
    #[should_panic(expected = "score weights must be validated")]
    fn test_scorer_rejects_invalid_weights() {
        let _ = HybridScorer::new(ScoreWeights {
            semantic: 1.0,
            popularity: 1.0,
            time: 1.0,
            epsilon: 0.1,
        });
    }

    // =========================================================================
    // Rescore
    // =========================================================================

    fn make_scored(clock: &SimClock, id: &str, semantic: f64) -> ScoredFragment {
        let fragment = FragmentBuilder::new("char-1", "memory")
            .id(id)
            .layer(MemoryLayer::Working)
            .build_at(clock.now());
        ScoredFragment::from_candidate(fragment, semantic)
    }

    #[test]
    fn test_rescore_uses_access_info() {
        let s = scorer();
        let clock = SimClock::at_ms(1_000_000);

        let mut results = vec![make_scored(&clock, "frag-1", 0.8)];
        let mut info = AccessInfo::new("char-1", "frag-1", clock.now());
        for _ in 0..10 {
            info.record(clock.now());
        }
        let access: HashMap<String, AccessInfo> =
            HashMap::from([("frag-1".to_string(), info)]);

        s.rescore(&mut results, &access, clock.now());

        let r = &results[0];
        assert!(r.popularity_score > 0.0);
        assert_eq!(r.time_score, 1.0); // accessed just now
        let expected = s.final_score(0.8, r.popularity_score, 1.0);
        assert!((r.final_score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rescore_missing_access_info_scores_zero() {
        let s = scorer();
        let clock = SimClock::at_ms(1_000_000);

        let mut results = vec![make_scored(&clock, "frag-unknown", 0.9)];
        s.rescore(&mut results, &HashMap::new(), clock.now());

        let r = &results[0];
        assert_eq!(r.popularity_score, 0.0);
        assert_eq!(r.time_score, 0.0);
        // Only the semantic component contributes.
        assert!((r.final_score - 0.5 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_rescore_does_not_sort() {
        let s = scorer();
        let clock = SimClock::at_ms(1_000_000);

        let mut results = vec![
            make_scored(&clock, "low", 0.1),
            make_scored(&clock, "high", 0.9),
        ];
        s.rescore(&mut results, &HashMap::new(), clock.now());

        assert_eq!(results[0].fragment.id, "low");
        assert_eq!(results[1].fragment.id, "high");
    }
}
