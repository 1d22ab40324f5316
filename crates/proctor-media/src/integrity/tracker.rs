//! Hysteresis tracker turning per-frame confidences into flag windows.
//!
//! One tracker exists per signal type per analysis run. It is fed strictly
//! increasing timestamps; anything else is rejected at the boundary and
//! leaves the state untouched.
//!
//! ```text
//! IDLE --(conf >= min)--> ACTIVE --(duration met, cooldown clear)--> emit --> IDLE
//!                           |
//!                           +--(below min for longer than max_gap)--> IDLE
//! ```

use metrics::counter;
use proctor_models::detection::clamp_confidence;
use proctor_models::{FlagWindow, Metadata, SignalType};
use tracing::{debug, warn};

use super::classifier::SeverityTable;
use super::config::TrackerConfig;

#[derive(Debug, Clone, Default)]
struct Episode {
    start: f64,
    max_confidence: f64,
    last_qualifying: f64,
    metadata: Metadata,
}

/// Debounce state machine for one signal type.
#[derive(Debug, Clone)]
pub struct FlagTracker {
    signal: SignalType,
    config: TrackerConfig,
    severity: SeverityTable,
    duration_limit: Option<f64>,
    episode: Option<Episode>,
    last_emit_time: Option<f64>,
    last_timestamp: Option<f64>,
    rejected_count: u64,
    emitted_count: u64,
}

impl FlagTracker {
    pub fn new(signal: SignalType, config: TrackerConfig, severity: SeverityTable) -> Self {
        Self {
            signal,
            config,
            severity,
            duration_limit: None,
            episode: None,
            last_emit_time: None,
            last_timestamp: None,
            rejected_count: 0,
            emitted_count: 0,
        }
    }

    /// Reject timestamps past `limit` and clamp emitted windows to it.
    pub fn with_duration_limit(mut self, limit: Option<f64>) -> Self {
        self.duration_limit = limit.filter(|l| l.is_finite() && *l >= 0.0);
        self
    }

    pub fn signal_type(&self) -> SignalType {
        self.signal
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.episode.is_some()
    }

    /// Observations dropped for bad or out-of-order timestamps.
    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    pub fn emitted_count(&self) -> u64 {
        self.emitted_count
    }

    /// Feed one observation. `confidence` of 0 marks a frame where the
    /// detector saw nothing.
    pub fn update(&mut self, timestamp: f64, confidence: f64, metadata: Metadata) -> Option<FlagWindow> {
        if let Some(reason) = self.rejection_reason(timestamp) {
            warn!(
                signal = %self.signal,
                timestamp,
                last_timestamp = ?self.last_timestamp,
                reason,
                "Rejected tracker observation"
            );
            self.rejected_count += 1;
            counter!("proctor_timestamps_rejected_total", "signal" => self.signal.as_str()).increment(1);
            return None;
        }
        self.last_timestamp = Some(timestamp);

        let confidence = clamp_confidence(confidence);
        if confidence < self.config.min_confidence {
            self.observe_low(timestamp);
            return None;
        }

        let episode = self.episode.get_or_insert_with(|| Episode {
            start: timestamp,
            max_confidence: confidence,
            last_qualifying: timestamp,
            metadata: metadata.clone(),
        });
        if confidence > episode.max_confidence {
            episode.max_confidence = confidence;
            episode.metadata = metadata;
        }
        episode.last_qualifying = timestamp;

        let sustained = timestamp - episode.start;
        let cooled = self
            .last_emit_time
            .map_or(true, |last| timestamp - last >= self.config.cooldown);

        if sustained >= self.config.min_duration && cooled {
            return self.emit(timestamp);
        }
        None
    }

    /// Clear all episode state, keeping configuration.
    pub fn reset(&mut self) {
        self.episode = None;
        self.last_emit_time = None;
        self.last_timestamp = None;
        self.rejected_count = 0;
        self.emitted_count = 0;
    }

    fn rejection_reason(&self, timestamp: f64) -> Option<&'static str> {
        if !timestamp.is_finite() {
            Some("non_finite")
        } else if timestamp < 0.0 {
            Some("negative")
        } else if self.duration_limit.is_some_and(|limit| timestamp > limit) {
            Some("beyond_duration")
        } else if self.last_timestamp.is_some_and(|last| timestamp <= last) {
            Some("not_increasing")
        } else {
            None
        }
    }

    fn observe_low(&mut self, timestamp: f64) {
        if let Some(episode) = &self.episode {
            if timestamp - episode.last_qualifying > self.config.max_gap {
                debug!(
                    signal = %self.signal,
                    start = episode.start,
                    last_qualifying = episode.last_qualifying,
                    "Episode abandoned after gap"
                );
                self.episode = None;
            }
        }
    }

    /// Close the open episode into a flag. State changes only once the
    /// window is valid.
    fn emit(&mut self, timestamp: f64) -> Option<FlagWindow> {
        let episode = self.episode.as_ref()?;
        let (start, max_confidence) = (episode.start, episode.max_confidence);

        let sustained = timestamp - start;
        let severity = self.severity.classify(self.signal, max_confidence, sustained);

        let t_start = (start - self.config.pre_roll).max(0.0);
        let mut t_end = timestamp + self.config.post_roll;
        if let Some(limit) = self.duration_limit {
            t_end = t_end.min(limit);
        }

        let window = match FlagWindow::try_new(self.signal, t_start, t_end, max_confidence, severity) {
            Ok(window) => window,
            Err(e) => {
                warn!(signal = %self.signal, error = %e, "Flag window not emitted");
                return None;
            }
        };

        let mut metadata = self.episode.take().map(|e| e.metadata).unwrap_or_default();
        metadata.insert("episode_start".to_string(), start.into());
        metadata.insert("episode_seconds".to_string(), sustained.into());
        let window = window.with_metadata(metadata);
        self.last_emit_time = Some(timestamp);

        self.emitted_count += 1;
        counter!(
            "proctor_flags_emitted_total",
            "signal" => self.signal.as_str(),
            "severity" => severity.as_str()
        )
        .increment(1);
        debug!(
            signal = %self.signal,
            t_start = window.t_start,
            t_end = window.t_end,
            confidence = window.confidence,
            severity = %severity,
            "Flag emitted"
        );

        Some(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::config::TrackerConfigTable;
    use proctor_models::Severity;

    fn tracker(signal: SignalType) -> FlagTracker {
        FlagTracker::new(
            signal,
            TrackerConfigTable::default().get(signal),
            SeverityTable::default(),
        )
    }

    /// Feed `(timestamp, confidence)` pairs and collect emissions.
    fn run(tracker: &mut FlagTracker, samples: &[(f64, f64)]) -> Vec<FlagWindow> {
        samples
            .iter()
            .filter_map(|&(t, c)| tracker.update(t, c, Metadata::new()))
            .collect()
    }

    fn steady(from: f64, to: f64, confidence: f64) -> Vec<(f64, f64)> {
        let steps = ((to - from) * 2.0).round() as u64;
        (0..=steps).map(|i| (from + i as f64 * 0.5, confidence)).collect()
    }

    #[test]
    fn test_below_threshold_never_emits() {
        for signal in SignalType::ALL {
            let mut t = tracker(*signal);
            let min = t.config().min_confidence;
            assert!(run(&mut t, &steady(0.0, 120.0, min - 0.01)).is_empty());
            assert!(!t.is_active());
        }
    }

    #[test]
    fn test_single_face_frame_emits_immediately() {
        let mut t = tracker(SignalType::FaceCount);
        let flag = t.update(4.0, 1.0, Metadata::new()).unwrap();
        assert_eq!(flag.t_start, 3.0);
        assert_eq!(flag.t_end, 6.0);
        assert_eq!(flag.severity, Severity::High);
        assert!(!t.is_active());
    }

    #[test]
    fn test_sustained_signal_respects_cooldown() {
        let mut t = tracker(SignalType::PhoneObject);
        let flags = run(&mut t, &steady(0.0, 60.0, 0.8));

        let emit_times: Vec<f64> = flags
            .iter()
            .map(|f| f.metadata["episode_start"].as_f64().unwrap() + f.metadata["episode_seconds"].as_f64().unwrap())
            .collect();
        assert_eq!(emit_times, vec![1.5, 16.5, 31.5, 46.5]);
        for pair in emit_times.windows(2) {
            assert!(pair[1] - pair[0] >= 15.0);
        }
        assert!(flags.iter().all(|f| f.severity == Severity::High));
    }

    #[test]
    fn test_first_phone_window_bounds() {
        let mut t = tracker(SignalType::PhoneObject);
        let flags = run(&mut t, &steady(10.0, 11.5, 0.7));
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].t_start, 8.0);
        assert_eq!(flags[0].t_end, 13.5);
        assert_eq!(flags[0].confidence, 0.7);
        assert_eq!(flags[0].severity, Severity::Moderate);
    }

    #[test]
    fn test_short_gap_keeps_episode_open() {
        let mut t = tracker(SignalType::HeadPose);
        let samples = [
            (0.0, 0.8),
            (0.5, 0.8),
            (1.0, 0.1),
            (1.5, 0.0),
            (2.0, 0.2),
            (2.5, 0.9),
            (3.0, 0.7),
        ];
        let flags = run(&mut t, &samples);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].t_start, 0.0);
        assert_eq!(flags[0].t_end, 4.0);
        assert_eq!(flags[0].confidence, 0.9);
        assert_eq!(flags[0].severity, Severity::Low);
    }

    #[test]
    fn test_long_gap_abandons_episode() {
        let mut t = tracker(SignalType::HeadPose);
        let samples = [
            (0.0, 0.8),
            (1.0, 0.8),
            (1.5, 0.0),
            (2.0, 0.0),
            (2.5, 0.0),
            (3.0, 0.0),
            (3.5, 0.8),
            (4.0, 0.8),
        ];
        assert!(run(&mut t, &samples).is_empty());
        assert!(t.is_active());
    }

    #[test]
    fn test_rejects_bad_timestamps() {
        let mut t = tracker(SignalType::HeadPose).with_duration_limit(Some(20.0));
        assert!(t.update(5.0, 0.9, Metadata::new()).is_none());
        assert!(t.update(5.0, 0.9, Metadata::new()).is_none());
        assert!(t.update(4.0, 0.9, Metadata::new()).is_none());
        assert!(t.update(f64::NAN, 0.9, Metadata::new()).is_none());
        assert!(t.update(-1.0, 0.9, Metadata::new()).is_none());
        assert!(t.update(25.0, 0.9, Metadata::new()).is_none());
        assert_eq!(t.rejected_count(), 5);

        // State untouched: the episode that started at 5.0 still completes at 8.0.
        let flag = t.update(8.0, 0.9, Metadata::new()).unwrap();
        assert_eq!(flag.t_start, 4.0);
    }

    #[test]
    fn test_window_clamped_to_duration() {
        let mut t = tracker(SignalType::FaceCount).with_duration_limit(Some(10.0));
        let flag = t.update(9.5, 1.0, Metadata::new()).unwrap();
        assert_eq!(flag.t_start, 8.5);
        assert_eq!(flag.t_end, 10.0);
        assert!(flag.is_within(10.0));
    }

    #[test]
    fn test_strongest_metadata_kept() {
        let mut t = tracker(SignalType::PhoneObject);
        let meta = |v: i64| Metadata::from([("candidates".to_string(), serde_json::json!(v))]);
        t.update(0.0, 0.65, meta(1));
        t.update(0.5, 0.8, meta(2));
        t.update(1.0, 0.7, meta(3));
        let flag = t.update(1.5, 0.7, meta(4)).unwrap();
        assert_eq!(flag.metadata["candidates"], serde_json::json!(2));
        assert_eq!(flag.confidence, 0.8);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut t = tracker(SignalType::FaceCount);
        assert!(t.update(1.0, 1.0, Metadata::new()).is_some());
        t.reset();
        assert_eq!(t.emitted_count(), 0);
        assert!(t.update(0.5, 1.0, Metadata::new()).is_some());
    }

    #[test]
    fn test_invalid_window_does_not_start_cooldown() {
        let config = TrackerConfigTable::default().face_count.with_rolls(0.0, -2.0);
        let mut t = FlagTracker::new(SignalType::FaceCount, config, SeverityTable::default());

        // Windows would end before they start until the episode is 2 s old.
        assert!(t.update(1.0, 1.0, Metadata::new()).is_none());
        assert!(t.update(2.0, 1.0, Metadata::new()).is_none());
        assert!(t.is_active());

        let flag = t.update(4.0, 1.0, Metadata::new()).unwrap();
        assert_eq!((flag.t_start, flag.t_end), (1.0, 2.0));
        assert_eq!(flag.metadata["episode_start"], serde_json::json!(1.0));
        assert_eq!(t.emitted_count(), 1);
        assert!(!t.is_active());
    }
}
