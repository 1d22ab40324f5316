//! Signal types and severity tiers.
//!
//! A signal type names one kind of integrity observation produced by a
//! detector. Each signal type gets its own flag tracker and its own row in the
//! tracker and severity tables.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Kind of integrity signal observed in an interview recording.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// More than one distinct face in frame.
    FaceCount,
    /// A phone-like rectangular object in frame.
    PhoneObject,
    /// Head turned away beyond the yaw/pitch thresholds.
    HeadPose,
}

impl SignalType {
    /// All signal types, in tracker processing order.
    pub const ALL: &'static [SignalType] = &[
        SignalType::FaceCount,
        SignalType::PhoneObject,
        SignalType::HeadPose,
    ];

    /// Returns the signal name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::FaceCount => "face_count",
            SignalType::PhoneObject => "phone_object",
            SignalType::HeadPose => "head_pose",
        }
    }

    /// Returns a human-readable description for review dashboards.
    pub fn description(&self) -> &'static str {
        match self {
            SignalType::FaceCount => "Multiple faces visible",
            SignalType::PhoneObject => "Phone-like object visible",
            SignalType::HeadPose => "Sustained head turn away from screen",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "face_count" | "multi_face" | "faces" => Ok(SignalType::FaceCount),
            "phone_object" | "phone" => Ok(SignalType::PhoneObject),
            "head_pose" | "head_turn" => Ok(SignalType::HeadPose),
            _ => Err(ModelError::UnknownSignal(s.to_string())),
        }
    }
}

/// Severity tier assigned to an emitted flag.
///
/// Ordered so that `Low < Moderate < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Moderate => "MODERATE",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MODERATE" | "MEDIUM" => Ok(Severity::Moderate),
            "HIGH" => Ok(Severity::High),
            _ => Err(ModelError::UnknownSeverity(s.to_string())),
        }
    }
}
