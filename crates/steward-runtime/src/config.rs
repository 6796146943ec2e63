use std::time::Duration;

use serde::{Deserialize, Serialize};
use steward_dispatch::DispatchConfig;

/// Runtime tunables, all defaulted.
///
/// Durations accept `HH:MM:SS`, `MM:SS` and plain seconds, the latter
/// with an optional fraction (`"0.5"` is half a second).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StewardConfig {
    /// Quiet period before a device's change burst is dispatched.
    #[serde(with = "duration_serde")]
    pub debounce: Duration,
    /// Cadence for re-resolving an empty watch plan.
    #[serde(with = "duration_serde")]
    pub resolver_retry: Duration,
    /// Capacity of each per-device forwarding channel.
    pub channel_capacity: usize,
}

impl Default for StewardConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            resolver_retry: Duration::from_secs(30),
            channel_capacity: 64,
        }
    }
}

impl StewardConfig {
    pub(crate) fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            debounce: self.debounce,
            resolver_retry: self.resolver_retry,
            channel_capacity: self.channel_capacity,
        }
    }
}

mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.subsec_nanos() != 0 {
            return serializer.serialize_str(&format!("{}", value.as_secs_f64()));
        }
        let secs = value.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;
        serializer.serialize_str(&format!("{:02}:{:02}:{:02}", hours, mins, secs))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, String> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.len() {
            1 => {
                let secs: f64 = parts[0].parse().map_err(|_| "invalid seconds")?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err("invalid seconds".to_string());
                }
                Ok(Duration::from_secs_f64(secs))
            }
            2 => {
                let mins: u64 = parts[0].parse().map_err(|_| "invalid minutes")?;
                let secs: u64 = parts[1].parse().map_err(|_| "invalid seconds")?;
                Ok(Duration::from_secs(mins * 60 + secs))
            }
            3 => {
                let hours: u64 = parts[0].parse().map_err(|_| "invalid hours")?;
                let mins: u64 = parts[1].parse().map_err(|_| "invalid minutes")?;
                let secs: u64 = parts[2].parse().map_err(|_| "invalid seconds")?;
                Ok(Duration::from_secs(hours * 3600 + mins * 60 + secs))
            }
            _ => Err("invalid duration format".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sound() {
        let config = StewardConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.resolver_retry, Duration::from_secs(30));
        assert_eq!(config.channel_capacity, 64);
    }

    #[test]
    fn parses_colon_and_fractional_forms() {
        let config: StewardConfig = serde_json::from_str(
            r#"{"debounce": "0.25", "resolver_retry": "00:01:30", "channel_capacity": 8}"#,
        )
        .unwrap();
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.resolver_retry, Duration::from_secs(90));
        assert_eq!(config.channel_capacity, 8);

        let partial: StewardConfig = serde_json::from_str(r#"{"resolver_retry": "02:00"}"#).unwrap();
        assert_eq!(partial.resolver_retry, Duration::from_secs(120));
        assert_eq!(partial.debounce, Duration::from_millis(500));
    }

    #[test]
    fn serializes_back_to_strings() {
        let json = serde_json::to_value(StewardConfig::default()).unwrap();
        assert_eq!(json["debounce"], "0.5");
        assert_eq!(json["resolver_retry"], "00:00:30");
    }

    #[test]
    fn rejects_malformed_durations() {
        for bad in ["\"1:2:3:4\"", "\"abc\"", "\"-5\""] {
            let source = format!(r#"{{"debounce": {bad}}}"#);
            assert!(
                serde_json::from_str::<StewardConfig>(&source).is_err(),
                "{bad}"
            );
        }
    }
}
