//! Recommendation policy.
//!
//! Combines the external interview score with the severities of the emitted
//! integrity flags into a single PASS / REVIEW / FAIL outcome. The policy is
//! a pure, total function: every `(score, flags)` input maps to exactly one
//! recommendation and nothing here touches I/O.
//!
//! | Condition (checked in order) | Outcome |
//! |------------------------------|---------|
//! | `high >= high_fail_threshold` | FAIL (overrides any score) |
//! | `score >= pass_threshold && high == 0 && moderate <= moderate_pass_max` | PASS |
//! | otherwise | REVIEW |

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::flag::FlagWindow;
use crate::score::InterviewScore;
use crate::signal::Severity;

/// Final categorical outcome shown on the review dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Pass,
    Review,
    Fail,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Pass => "PASS",
            Recommendation::Review => "REVIEW",
            Recommendation::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Thresholds for the recommendation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RecommendationPolicy {
    /// Number of HIGH flags that forces FAIL
    pub high_fail_threshold: usize,
    /// Minimum score for PASS
    pub pass_threshold: InterviewScore,
    /// Maximum MODERATE flags still compatible with PASS
    pub moderate_pass_max: usize,
}

impl Default for RecommendationPolicy {
    fn default() -> Self {
        Self {
            high_fail_threshold: 2,
            pass_threshold: InterviewScore::from_hundredths_unchecked(700),
            moderate_pass_max: 2,
        }
    }
}

impl RecommendationPolicy {
    pub fn with_high_fail_threshold(mut self, threshold: usize) -> Self {
        self.high_fail_threshold = threshold;
        self
    }

    pub fn with_pass_threshold(mut self, threshold: InterviewScore) -> Self {
        self.pass_threshold = threshold;
        self
    }

    pub fn with_moderate_pass_max(mut self, max: usize) -> Self {
        self.moderate_pass_max = max;
        self
    }

    /// Decide from a score and the full set of emitted flags.
    pub fn decide(&self, score: InterviewScore, flags: &[FlagWindow]) -> Recommendation {
        self.decide_severities(score, flags.iter().map(|f| f.severity))
    }

    /// Decide from a score and a stream of flag severities.
    pub fn decide_severities<I>(&self, score: InterviewScore, severities: I) -> Recommendation
    where
        I: IntoIterator<Item = Severity>,
    {
        let (high_count, moderate_count) =
            severities
                .into_iter()
                .fold((0usize, 0usize), |(high, moderate), severity| match severity {
                    Severity::High => (high + 1, moderate),
                    Severity::Moderate => (high, moderate + 1),
                    Severity::Low => (high, moderate),
                });

        if high_count >= self.high_fail_threshold {
            return Recommendation::Fail;
        }

        if score >= self.pass_threshold
            && high_count == 0
            && moderate_count <= self.moderate_pass_max
        {
            return Recommendation::Pass;
        }

        Recommendation::Review
    }
}

/// Decide with the default policy.
pub fn decide(score: InterviewScore, flags: &[FlagWindow]) -> Recommendation {
    RecommendationPolicy::default().decide(score, flags)
}
