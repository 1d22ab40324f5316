//! Interview score supplied by the external scoring process.

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// Numeric interview score in the range 0.00-10.00.
///
/// Stored as integer hundredths so threshold comparisons are exact
/// (`7.00 >= 7.00` never depends on float rounding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterviewScore(u16);

impl InterviewScore {
    pub const MIN: InterviewScore = InterviewScore(0);
    pub const MAX: InterviewScore = InterviewScore(1000);

    pub(crate) const fn from_hundredths_unchecked(hundredths: u16) -> Self {
        Self(hundredths)
    }

    /// Create from hundredths of a point (e.g. 820 for 8.20).
    pub fn from_hundredths(hundredths: u16) -> ModelResult<Self> {
        if hundredths > Self::MAX.0 {
            return Err(ModelError::ScoreOutOfRange(format!(
                "{}.{:02}",
                hundredths / 100,
                hundredths % 100
            )));
        }
        Ok(Self(hundredths))
    }

    /// Create from a float, rounding to the nearest hundredth.
    pub fn from_f64(value: f64) -> ModelResult<Self> {
        if !value.is_finite() {
            return Err(ModelError::InvalidScore(value.to_string()));
        }
        let hundredths = (value * 100.0).round();
        if !(0.0..=1000.0).contains(&hundredths) {
            return Err(ModelError::ScoreOutOfRange(value.to_string()));
        }
        Ok(Self(hundredths as u16))
    }

    pub fn hundredths(&self) -> u16 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for InterviewScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for InterviewScore {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| ModelError::InvalidScore(s.to_string()))?;
        Self::from_f64(value)
    }
}

impl JsonSchema for InterviewScore {
    fn schema_name() -> String {
        "InterviewScore".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        f64::json_schema(gen)
    }
}

impl Serialize for InterviewScore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for InterviewScore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Self::from_f64(value).map_err(serde::de::Error::custom)
    }
}
