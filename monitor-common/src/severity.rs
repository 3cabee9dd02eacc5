//! Severity and risk vocabulary shared across the workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Returned when a stored severity or risk string is not recognized.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unrecognized severity level: {0}")]
pub struct ParseSeverityError(pub String);

/// Severity of a finding: an audit event, a compliance violation, or a
/// security vulnerability.
///
/// Ordering is ascending, so `Severity::High > Severity::Medium` holds and
/// collections can be sorted or compared directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Stable string form, matching the serialized representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Whether a finding at this severity warrants a signal beyond the
    /// audit trail (console warning or alert channel).
    pub fn is_escalation_worthy(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(ParseSeverityError(other.to_owned())),
        }
    }
}

/// Operational risk bucket derived from observed rates, not a property of
/// an individual finding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a failure rate (percentage of total) into a risk level.
    ///
    /// Above 10% is critical, above 5% high, above 1% medium, else low.
    /// The same thresholds apply wherever a rate feeds a risk figure so
    /// report sections stay comparable.
    pub fn from_rate(rate_percent: f64) -> Self {
        if rate_percent > 10.0 {
            RiskLevel::Critical
        } else if rate_percent > 5.0 {
            RiskLevel::High
        } else if rate_percent > 1.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Stable string form, matching the serialized representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(ParseSeverityError(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);

        let mut severities = vec![Severity::Critical, Severity::Low, Severity::High];
        severities.sort();
        assert_eq!(
            severities,
            vec![Severity::Low, Severity::High, Severity::Critical]
        );
    }

    #[test]
    fn test_severity_string_roundtrip() {
        for severity in [
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ] {
            let parsed: Severity = severity.as_str().parse().unwrap();
            assert_eq!(parsed, severity);
        }
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_serde_uses_snake_case() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let back: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(back, Severity::Medium);
    }

    #[test]
    fn test_escalation_worthy_severities() {
        assert!(!Severity::Low.is_escalation_worthy());
        assert!(!Severity::Medium.is_escalation_worthy());
        assert!(Severity::High.is_escalation_worthy());
        assert!(Severity::Critical.is_escalation_worthy());
    }

    #[test]
    fn test_risk_level_rate_buckets() {
        assert_eq!(RiskLevel::from_rate(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_rate(1.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_rate(1.5), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_rate(5.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_rate(7.2), RiskLevel::High);
        assert_eq!(RiskLevel::from_rate(10.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_rate(12.0), RiskLevel::Critical);
    }
}
