//! Probe definitions and the built-in catalogue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use monitor_common::Severity;

/// Security domain a probe exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeCategory {
    Authentication,
    Authorization,
    InputValidation,
    DataProtection,
    SessionManagement,
}

impl ProbeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::InputValidation => "input_validation",
            Self::DataProtection => "data_protection",
            Self::SessionManagement => "session_management",
        }
    }
}

impl fmt::Display for ProbeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown probe category: {0}")]
pub struct ParseCategoryError(pub String);

impl FromStr for ProbeCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authentication" => Ok(Self::Authentication),
            "authorization" => Ok(Self::Authorization),
            "input_validation" => Ok(Self::InputValidation),
            "data_protection" => Ok(Self::DataProtection),
            "session_management" => Ok(Self::SessionManagement),
            other => Err(ParseCategoryError(other.to_string())),
        }
    }
}

/// How often a probe is scheduled.
///
/// Continuous and daily cadences are driven by the runner's tickers;
/// weekly and monthly probes are defined but only run on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeCadence {
    Continuous,
    Daily,
    Weekly,
    Monthly,
}

/// Test strategy a probe dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// SQL and script payloads against every input route; acceptance of
    /// a raw payload is a finding.
    InjectionPayloads,
    /// A marker payload echoed back unsanitized is a finding.
    ReflectedContent,
    /// Protected routes fetched without credentials must not succeed.
    UnauthenticatedAccess,
    /// The session identifier must change across login.
    SessionRotation,
    /// Rapid submissions beyond the expected cap must be limited.
    RateLimitBurst,
    /// Error responses scanned for stack traces, SQL fragments, paths.
    ErrorLeakage,
    /// State-changing calls without an anti-forgery token must fail.
    AntiForgery,
    /// Malformed, oversized, and null-byte payloads must be rejected.
    InputHardening,
    /// Regex scan for plaintext personal data in stored audit payloads.
    PiiAtRest,
    /// One user fetching another user's resource must be denied.
    CrossUserAccess,
}

/// A scheduled security test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityProbe {
    /// Stable slug, used in vulnerabilities and audit flags.
    pub id: String,
    pub name: String,
    pub category: ProbeCategory,
    /// Severity assigned to vulnerabilities this probe raises.
    pub severity: Severity,
    pub cadence: ProbeCadence,
    pub kind: ProbeKind,
    pub enabled: bool,
}

/// The ten built-in probes the runner ships with.
pub fn default_probes() -> Vec<SecurityProbe> {
    vec![
        SecurityProbe {
            id: "sql-injection-forms".into(),
            name: "Injection payloads via public forms".into(),
            category: ProbeCategory::InputValidation,
            severity: Severity::Critical,
            cadence: ProbeCadence::Continuous,
            kind: ProbeKind::InjectionPayloads,
            enabled: true,
        },
        SecurityProbe {
            id: "reflected-content".into(),
            name: "Reflected content sanitization".into(),
            category: ProbeCategory::InputValidation,
            severity: Severity::High,
            cadence: ProbeCadence::Continuous,
            kind: ProbeKind::ReflectedContent,
            enabled: true,
        },
        SecurityProbe {
            id: "unauthenticated-access".into(),
            name: "Unauthenticated access to protected routes".into(),
            category: ProbeCategory::Authorization,
            severity: Severity::Critical,
            cadence: ProbeCadence::Continuous,
            kind: ProbeKind::UnauthenticatedAccess,
            enabled: true,
        },
        SecurityProbe {
            id: "session-rotation".into(),
            name: "Session rotation on login".into(),
            category: ProbeCategory::SessionManagement,
            severity: Severity::High,
            cadence: ProbeCadence::Daily,
            kind: ProbeKind::SessionRotation,
            enabled: true,
        },
        SecurityProbe {
            id: "rate-limit-burst".into(),
            name: "Burst rate limiting on submissions".into(),
            category: ProbeCategory::InputValidation,
            severity: Severity::Medium,
            cadence: ProbeCadence::Daily,
            kind: ProbeKind::RateLimitBurst,
            enabled: true,
        },
        SecurityProbe {
            id: "error-leakage".into(),
            name: "Error response information leakage".into(),
            category: ProbeCategory::DataProtection,
            severity: Severity::Medium,
            cadence: ProbeCadence::Daily,
            kind: ProbeKind::ErrorLeakage,
            enabled: true,
        },
        SecurityProbe {
            id: "csrf-protection".into(),
            name: "Anti-forgery token enforcement".into(),
            category: ProbeCategory::SessionManagement,
            severity: Severity::High,
            cadence: ProbeCadence::Daily,
            kind: ProbeKind::AntiForgery,
            enabled: true,
        },
        SecurityProbe {
            id: "input-hardening".into(),
            name: "Malformed input rejection".into(),
            category: ProbeCategory::InputValidation,
            severity: Severity::Medium,
            cadence: ProbeCadence::Daily,
            kind: ProbeKind::InputHardening,
            enabled: true,
        },
        SecurityProbe {
            id: "pii-at-rest".into(),
            name: "Plaintext personal data at rest".into(),
            category: ProbeCategory::DataProtection,
            severity: Severity::Critical,
            cadence: ProbeCadence::Daily,
            kind: ProbeKind::PiiAtRest,
            enabled: true,
        },
        SecurityProbe {
            id: "cross-user-access".into(),
            name: "Cross-user resource isolation".into(),
            category: ProbeCategory::Authorization,
            severity: Severity::Critical,
            cadence: ProbeCadence::Continuous,
            kind: ProbeKind::CrossUserAccess,
            enabled: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_probes_are_complete_and_enabled() {
        let probes = default_probes();
        assert_eq!(probes.len(), 10);
        assert!(probes.iter().all(|p| p.enabled));

        let mut ids: Vec<&str> = probes.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10);

        // Both automated cadences are represented.
        assert!(probes.iter().any(|p| p.cadence == ProbeCadence::Continuous));
        assert!(probes.iter().any(|p| p.cadence == ProbeCadence::Daily));
    }

    #[test]
    fn test_category_parse_roundtrip() {
        for category in [
            ProbeCategory::Authentication,
            ProbeCategory::Authorization,
            ProbeCategory::InputValidation,
            ProbeCategory::DataProtection,
            ProbeCategory::SessionManagement,
        ] {
            assert_eq!(category.as_str().parse::<ProbeCategory>().unwrap(), category);
        }
        assert!("firewall".parse::<ProbeCategory>().is_err());
    }
}
