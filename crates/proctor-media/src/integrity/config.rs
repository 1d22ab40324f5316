//! Per-signal tracker settings.

use proctor_models::SignalType;
use serde::{Deserialize, Serialize};

/// Debounce settings for one signal type. All durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Observations below this confidence do not extend an episode
    pub min_confidence: f64,
    /// Sustained time before an episode may emit
    pub min_duration: f64,
    /// Minimum spacing between two emissions
    pub cooldown: f64,
    pub pre_roll: f64,
    pub post_roll: f64,
    /// Longest run of sub-threshold observations an open episode survives
    pub max_gap: f64,
}

impl TrackerConfig {
    pub fn with_min_confidence(mut self, value: f64) -> Self {
        self.min_confidence = value;
        self
    }

    pub fn with_min_duration(mut self, value: f64) -> Self {
        self.min_duration = value;
        self
    }

    pub fn with_cooldown(mut self, value: f64) -> Self {
        self.cooldown = value;
        self
    }

    pub fn with_rolls(mut self, pre_roll: f64, post_roll: f64) -> Self {
        self.pre_roll = pre_roll;
        self.post_roll = post_roll;
        self
    }

    pub fn with_max_gap(mut self, value: f64) -> Self {
        self.max_gap = value;
        self
    }
}

/// Tracker settings for every signal type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfigTable {
    pub face_count: TrackerConfig,
    pub phone_object: TrackerConfig,
    pub head_pose: TrackerConfig,
}

impl Default for TrackerConfigTable {
    fn default() -> Self {
        Self {
            face_count: TrackerConfig {
                min_confidence: 0.90,
                min_duration: 0.0,
                cooldown: 10.0,
                pre_roll: 1.0,
                post_roll: 2.0,
                max_gap: 1.0,
            },
            phone_object: TrackerConfig {
                min_confidence: 0.60,
                min_duration: 1.5,
                cooldown: 15.0,
                pre_roll: 2.0,
                post_roll: 2.0,
                max_gap: 1.0,
            },
            head_pose: TrackerConfig {
                min_confidence: 0.50,
                min_duration: 3.0,
                cooldown: 10.0,
                pre_roll: 1.0,
                post_roll: 1.0,
                max_gap: 1.5,
            },
        }
    }
}

impl TrackerConfigTable {
    pub fn get(&self, signal: SignalType) -> TrackerConfig {
        match signal {
            SignalType::FaceCount => self.face_count,
            SignalType::PhoneObject => self.phone_object,
            SignalType::HeadPose => self.head_pose,
        }
    }

    pub fn with(mut self, signal: SignalType, config: TrackerConfig) -> Self {
        *self.get_mut(signal) = config;
        self
    }

    fn get_mut(&mut self, signal: SignalType) -> &mut TrackerConfig {
        match signal {
            SignalType::FaceCount => &mut self.face_count,
            SignalType::PhoneObject => &mut self.phone_object,
            SignalType::HeadPose => &mut self.head_pose,
        }
    }
}
