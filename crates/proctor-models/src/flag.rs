//! Flag windows: the persisted, reviewable integrity events.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::detection::Metadata;
use crate::error::{ModelError, ModelResult};
use crate::signal::{Severity, SignalType};

/// One emitted integrity episode.
///
/// Invariant: `0 <= t_start <= t_end`, and `t_end <= video_duration` once the
/// window has been clamped to the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlagWindow {
    pub signal_type: SignalType,
    /// Window start in seconds (includes pre-roll)
    pub t_start: f64,
    /// Window end in seconds (includes post-roll)
    pub t_end: f64,
    /// Peak confidence observed during the episode
    pub confidence: f64,
    pub severity: Severity,
    #[serde(default)]
    pub metadata: Metadata,
}

impl FlagWindow {
    /// Create a flag window, validating the time bounds.
    pub fn try_new(
        signal_type: SignalType,
        t_start: f64,
        t_end: f64,
        confidence: f64,
        severity: Severity,
    ) -> ModelResult<Self> {
        if !t_start.is_finite() || !t_end.is_finite() {
            return Err(ModelError::InvalidFlagWindow(format!(
                "non-finite bounds {}..{}",
                t_start, t_end
            )));
        }
        if t_start < 0.0 || t_start > t_end {
            return Err(ModelError::InvalidFlagWindow(format!(
                "expected 0 <= t_start <= t_end, got {}..{}",
                t_start, t_end
            )));
        }

        Ok(Self {
            signal_type,
            t_start,
            t_end,
            confidence,
            severity,
            metadata: Metadata::new(),
        })
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Window length in seconds.
    pub fn duration(&self) -> f64 {
        self.t_end - self.t_start
    }

    /// Check the window lies inside a recording of the given length.
    pub fn is_within(&self, video_duration: f64) -> bool {
        self.t_start >= 0.0 && self.t_start <= self.t_end && self.t_end <= video_duration
    }

    /// Clamp the window to a recording of the given length.
    pub fn clamp_to(mut self, video_duration: f64) -> Self {
        let limit = video_duration.max(0.0);
        self.t_end = self.t_end.min(limit);
        self.t_start = self.t_start.max(0.0).min(self.t_end);
        self
    }

    /// Ordering used for persisted flag collections.
    pub fn timeline_cmp(&self, other: &FlagWindow) -> Ordering {
        self.t_start
            .total_cmp(&other.t_start)
            .then(self.signal_type.cmp(&other.signal_type))
            .then(self.t_end.total_cmp(&other.t_end))
    }
}

/// Sort flags into timeline order.
pub fn sort_timeline(flags: &mut [FlagWindow]) {
    flags.sort_by(|a, b| a.timeline_cmp(b));
}

/// Count flags with the given severity.
pub fn count_severity(flags: &[FlagWindow], severity: Severity) -> usize {
    flags.iter().filter(|f| f.severity == severity).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(start: f64, end: f64) -> FlagWindow {
        FlagWindow::try_new(SignalType::PhoneObject, start, end, 0.7, Severity::Moderate).unwrap()
    }

    #[test]
    fn test_rejects_inverted_window() {
        assert!(FlagWindow::try_new(SignalType::HeadPose, 5.0, 4.0, 0.6, Severity::Low).is_err());
        assert!(FlagWindow::try_new(SignalType::HeadPose, -1.0, 4.0, 0.6, Severity::Low).is_err());
        assert!(FlagWindow::try_new(SignalType::HeadPose, 0.0, f64::NAN, 0.6, Severity::Low).is_err());
    }

    #[test]
    fn test_clamp_to_duration() {
        let clamped = flag(50.0, 55.0).clamp_to(53.0);
        assert_eq!(clamped.t_end, 53.0);
        assert!(clamped.is_within(53.0));

        let past_end = flag(54.0, 56.0).clamp_to(53.0);
        assert_eq!(past_end.t_start, 53.0);
        assert_eq!(past_end.t_end, 53.0);
        assert!(past_end.is_within(53.0));
    }

    #[test]
    fn test_timeline_sort() {
        let mut flags = vec![flag(10.0, 12.0), flag(2.0, 4.0), flag(2.0, 3.0)];
        sort_timeline(&mut flags);
        assert_eq!(flags[0].t_end, 3.0);
        assert_eq!(flags[1].t_end, 4.0);
        assert_eq!(flags[2].t_start, 10.0);
    }
}
