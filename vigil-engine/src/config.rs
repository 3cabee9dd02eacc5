//! Monitor configuration.
//!
//! [`MonitorConfig`] carries every knob the facade wires into its
//! components. [`MonitorConfig::from_env`] reads overrides from
//! `VIGIL_*` environment variables (loading a `.env` file first when
//! one is present); anything unset or unparseable keeps its default, so
//! a bare environment always yields a working monitor.

use std::str::FromStr;

use serde::Deserialize;
use tracing::warn;

use audit_store::default_sensitive_fields;

/// Date precision kept when timestamps are anonymized for export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateGranularity {
    #[default]
    Day,
    Month,
    Year,
}

impl DateGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateGranularity::Day => "day",
            DateGranularity::Month => "month",
            DateGranularity::Year => "year",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unrecognized date granularity `{0}`")]
pub struct ParseDateGranularityError(String);

impl FromStr for DateGranularity {
    type Err = ParseDateGranularityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "day" => Ok(DateGranularity::Day),
            "month" => Ok(DateGranularity::Month),
            "year" => Ok(DateGranularity::Year),
            other => Err(ParseDateGranularityError(other.to_owned())),
        }
    }
}

/// Settings for the anonymized-export transform.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnonymizationConfig {
    /// Precision kept when event timestamps are coarsened.
    pub date_granularity: DateGranularity,
    /// Salt length, in bytes, for hashed identifier fields.
    pub hash_salt_length: usize,
}

impl Default for AnonymizationConfig {
    fn default() -> Self {
        Self {
            date_granularity: DateGranularity::Day,
            hash_salt_length: 16,
        }
    }
}

/// Top-level monitor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Audit retention window in days. Seven years by default.
    pub retention_days: i64,
    /// Minutes between scheduled rule evaluation passes.
    pub rule_interval_minutes: u64,
    /// Whether `start` also schedules the probe tickers.
    pub probe_automation_enabled: bool,
    /// Minutes between continuous probe sweeps.
    pub probe_interval_minutes: u64,
    /// Per-probe execution deadline in seconds.
    pub probe_timeout_secs: u64,
    /// Detail keys encrypted at rest.
    pub sensitive_fields: Vec<String>,
    pub anonymization: AnonymizationConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let mut sensitive_fields: Vec<String> =
            default_sensitive_fields().into_iter().collect();
        sensitive_fields.sort();
        Self {
            retention_days: 2555,
            rule_interval_minutes: 15,
            probe_automation_enabled: true,
            probe_interval_minutes: 5,
            probe_timeout_secs: 30,
            sensitive_fields,
            anonymization: AnonymizationConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Defaults overlaid with `VIGIL_*` environment variables.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        read_var("VIGIL_RETENTION_DAYS", &mut config.retention_days);
        read_var(
            "VIGIL_RULE_INTERVAL_MINUTES",
            &mut config.rule_interval_minutes,
        );
        read_var(
            "VIGIL_PROBE_AUTOMATION_ENABLED",
            &mut config.probe_automation_enabled,
        );
        read_var(
            "VIGIL_PROBE_INTERVAL_MINUTES",
            &mut config.probe_interval_minutes,
        );
        read_var("VIGIL_PROBE_TIMEOUT_SECS", &mut config.probe_timeout_secs);
        read_var(
            "VIGIL_DATE_GRANULARITY",
            &mut config.anonymization.date_granularity,
        );
        read_var(
            "VIGIL_HASH_SALT_LENGTH",
            &mut config.anonymization.hash_salt_length,
        );
        if let Ok(raw) = std::env::var("VIGIL_SENSITIVE_FIELDS") {
            let fields: Vec<String> = raw
                .split(',')
                .map(|field| field.trim().to_owned())
                .filter(|field| !field.is_empty())
                .collect();
            if fields.is_empty() {
                warn!(
                    target: "monitor",
                    "VIGIL_SENSITIVE_FIELDS is set but empty, keeping defaults"
                );
            } else {
                config.sensitive_fields = fields;
            }
        }
        config
    }
}

/// Overwrite `slot` with the parsed variable, keeping it on absence or
/// a parse failure.
fn read_var<T: FromStr>(name: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => warn!(
                target: "monitor",
                variable = name,
                value = %raw,
                "unparseable value, keeping default"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_seven_year_retention() {
        let config = MonitorConfig::default();
        assert_eq!(config.retention_days, 2555);
        assert_eq!(config.rule_interval_minutes, 15);
        assert!(config.probe_automation_enabled);
        assert_eq!(config.probe_interval_minutes, 5);
        assert_eq!(config.probe_timeout_secs, 30);
        assert!(config.sensitive_fields.contains(&"email".to_owned()));
        assert_eq!(config.anonymization.date_granularity, DateGranularity::Day);
        assert_eq!(config.anonymization.hash_salt_length, 16);
    }

    #[test]
    fn test_from_env_overrides_and_ignores_garbage() {
        std::env::set_var("VIGIL_RETENTION_DAYS", "30");
        std::env::set_var("VIGIL_PROBE_AUTOMATION_ENABLED", "false");
        std::env::set_var("VIGIL_RULE_INTERVAL_MINUTES", "not-a-number");
        std::env::set_var("VIGIL_DATE_GRANULARITY", "month");
        std::env::set_var("VIGIL_SENSITIVE_FIELDS", "email, ssn ,");

        let config = MonitorConfig::from_env();

        std::env::remove_var("VIGIL_RETENTION_DAYS");
        std::env::remove_var("VIGIL_PROBE_AUTOMATION_ENABLED");
        std::env::remove_var("VIGIL_RULE_INTERVAL_MINUTES");
        std::env::remove_var("VIGIL_DATE_GRANULARITY");
        std::env::remove_var("VIGIL_SENSITIVE_FIELDS");

        assert_eq!(config.retention_days, 30);
        assert!(!config.probe_automation_enabled);
        assert_eq!(config.rule_interval_minutes, 15);
        assert_eq!(
            config.anonymization.date_granularity,
            DateGranularity::Month
        );
        assert_eq!(config.sensitive_fields, vec!["email", "ssn"]);
    }

    #[test]
    fn test_granularity_parses_stable_strings() {
        for granularity in [
            DateGranularity::Day,
            DateGranularity::Month,
            DateGranularity::Year,
        ] {
            let parsed: DateGranularity = granularity.as_str().parse().unwrap();
            assert_eq!(parsed, granularity);
        }
        assert!("hourly".parse::<DateGranularity>().is_err());
    }
}
