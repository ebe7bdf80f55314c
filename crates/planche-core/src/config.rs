//! Widget configuration
//!
//! Settings come from the widget URL query (`mode=fin` switches the planning
//! widget to an explicit end column), from a TOML file, or from defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{PlancheError, Result};

/// How the end of an event is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndMode {
    /// A numeric duration column (`duree` role)
    #[default]
    Duration,
    /// An explicit end datetime column (`fin` role)
    EndDate,
}

/// Unit of the duration column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    Seconds,
    Minutes,
    #[default]
    Hours,
    Days,
}

impl DurationUnit {
    /// Length of one unit in seconds
    pub fn seconds(&self) -> f64 {
        match self {
            DurationUnit::Seconds => 1.0,
            DurationUnit::Minutes => 60.0,
            DurationUnit::Hours => 3600.0,
            DurationUnit::Days => 86400.0,
        }
    }

    pub fn from_seconds(&self, seconds: f64) -> f64 {
        seconds / self.seconds()
    }

    pub fn to_seconds(&self, value: f64) -> f64 {
        value * self.seconds()
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "s" | "seconds" => Some(DurationUnit::Seconds),
            "m" | "minutes" => Some(DurationUnit::Minutes),
            "h" | "hours" => Some(DurationUnit::Hours),
            "d" | "days" => Some(DurationUnit::Days),
            _ => None,
        }
    }
}

/// Access granted to the widget by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    None,
    ReadTable,
    #[default]
    Full,
}

impl AccessLevel {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(AccessLevel::None),
            "read table" | "read_table" => Some(AccessLevel::ReadTable),
            "full" => Some(AccessLevel::Full),
            _ => None,
        }
    }
}

/// Behavior settings shared by both widgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    pub end_mode: EndMode,
    pub duration_unit: DurationUnit,
    /// Duration assumed for rows without one, in `duration_unit`
    pub default_duration: f64,
    /// Smallest duration a move may produce, in `duration_unit`
    pub min_duration: f64,
    /// Color used when a choice has no fill color
    pub fallback_color: String,
    /// Quiet period before the export widget regenerates
    pub debounce_ms: u64,
    pub access_level: AccessLevel,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            end_mode: EndMode::Duration,
            duration_unit: DurationUnit::Hours,
            default_duration: 7.0,
            min_duration: 1.0,
            fallback_color: "grey".to_string(),
            debounce_ms: 250,
            access_level: AccessLevel::Full,
        }
    }
}

impl WidgetConfig {
    /// Read settings from a widget URL query string.
    ///
    /// Unknown keys and values are ignored.
    pub fn from_query(query: &str) -> Self {
        let mut config = Self::default();
        let query = query.trim_start_matches('?');
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "mode" => {
                    config.end_mode = if value == "fin" {
                        EndMode::EndDate
                    } else {
                        EndMode::Duration
                    }
                }
                "unit" => {
                    if let Some(unit) = DurationUnit::parse(&value) {
                        config.duration_unit = unit;
                    }
                }
                "access" => {
                    if let Some(level) = AccessLevel::parse(&value) {
                        config.access_level = level;
                    }
                }
                _ => {}
            }
        }
        config
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PlancheError::Configuration(e.to_string()))
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded widget configuration");
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn uses_end_date(&self) -> bool {
        self.end_mode == EndMode::EndDate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = WidgetConfig::default();
        assert_eq!(config.end_mode, EndMode::Duration);
        assert_eq!(config.default_duration, 7.0);
        assert_eq!(config.debounce(), Duration::from_millis(250));
    }

    #[test]
    fn test_query_end_mode() {
        assert!(WidgetConfig::from_query("?mode=fin").uses_end_date());
        assert!(!WidgetConfig::from_query("mode=duree").uses_end_date());
        let config = WidgetConfig::from_query("mode=fin&unit=minutes&access=read%20table");
        assert_eq!(config.duration_unit, DurationUnit::Minutes);
        assert_eq!(config.access_level, AccessLevel::ReadTable);
    }

    #[test]
    fn test_toml() {
        let config = WidgetConfig::from_toml_str(
            "end_mode = \"end_date\"\nduration_unit = \"days\"\nfallback_color = \"#ccc\"\n",
        )
        .unwrap();
        assert_eq!(config.end_mode, EndMode::EndDate);
        assert_eq!(config.duration_unit, DurationUnit::Days);
        assert_eq!(config.fallback_color, "#ccc");
        assert_eq!(config.min_duration, 1.0);
    }

    #[test]
    fn test_toml_rejects_bad_values() {
        let err = WidgetConfig::from_toml_str("end_mode = 3").unwrap_err();
        assert!(matches!(err, PlancheError::Configuration(_)));
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(DurationUnit::Hours.from_seconds(7200.0), 2.0);
        assert_eq!(DurationUnit::Minutes.to_seconds(2.0), 120.0);
    }
}
