//! Media duration with its display form

use serde::{Serialize, Serializer};
use std::time::Duration;

/// Total duration of a source. Unknown durations are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct MediaDuration(Duration);

impl MediaDuration {
    pub const ZERO: MediaDuration = MediaDuration(Duration::ZERO);

    /// Build from fractional seconds. Negative, non-finite or out of range
    /// input is zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        Duration::try_from_secs_f64(secs)
            .map(Self)
            .unwrap_or(Self::ZERO)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// `MM:SS` below one hour, `H:MM:SS` from one hour on.
    pub fn formatted(&self) -> String {
        let total = self.0.as_secs();
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }
}

impl std::fmt::Display for MediaDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl Serialize for MediaDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}
