//! Serde adapters shared by the error taxonomy.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize a [`Duration`] as integer milliseconds.
///
/// Exported error records carry durations as plain `u64` millisecond counts
/// so they stay readable in logs and ingestible by telemetry pipelines.
///
/// # Usage
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     duration: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::*;

    /// Serialize a Duration as milliseconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    /// Deserialize milliseconds (u64) into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
