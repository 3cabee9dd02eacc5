//! The ten built-in check strategies probes dispatch to.
//!
//! Checks return drafts; the runner stamps probe identity, severity, and
//! timestamps. Evidence never echoes attack payloads or matched personal
//! data, only route names, payload indexes, and pattern labels.

use regex::Regex;
use serde_json::{json, Value};
use uuid::Uuid;

use audit_store::{EventFilter, EventStore};
use field_crypto::EncryptedEnvelope;

use crate::probe::ProbeKind;
use crate::surface::{TargetSurface, SUBMISSION_RATE_CAP};

/// Events sampled per PII scan, newest first.
const PII_SCAN_LIMIT: i64 = 200;
/// Cap on PII findings per run; one leak usually means many events leak.
const PII_FINDING_LIMIT: usize = 25;

const INJECTION_PAYLOADS: &[&str] = &[
    "' OR '1'='1' --",
    "'; DROP TABLE contacts; --",
    "' UNION SELECT email FROM subscribers --",
    "<script>alert(1)</script>",
    "\"><img src=x onerror=alert(1)>",
];

const LEAK_SIGNATURES: &[&str] = &[
    "SQLSTATE",
    "stack trace",
    "panicked at",
    "src/",
    "SELECT * FROM",
    "secret=",
];

const PII_PATTERNS: &[(&str, &str)] = &[
    ("email", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
    ("phone", r"\+?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}"),
    ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
    ("card", r"\b(?:\d[ -]?){13,16}\b"),
];

/// A weakness observed by a check, before the runner attaches identity.
#[derive(Debug)]
pub(crate) struct VulnerabilityDraft {
    pub description: String,
    pub evidence: Value,
}

impl VulnerabilityDraft {
    fn new(description: String, evidence: Value) -> Self {
        Self {
            description,
            evidence,
        }
    }
}

/// Run one check strategy against the surface and audit store.
pub(crate) async fn execute(
    kind: ProbeKind,
    surface: &dyn TargetSurface,
    store: &EventStore,
) -> anyhow::Result<Vec<VulnerabilityDraft>> {
    match kind {
        ProbeKind::InjectionPayloads => injection_payloads(surface).await,
        ProbeKind::ReflectedContent => reflected_content(surface).await,
        ProbeKind::UnauthenticatedAccess => unauthenticated_access(surface).await,
        ProbeKind::SessionRotation => session_rotation(surface).await,
        ProbeKind::RateLimitBurst => rate_limit_burst(surface).await,
        ProbeKind::ErrorLeakage => error_leakage(surface).await,
        ProbeKind::AntiForgery => anti_forgery(surface).await,
        ProbeKind::InputHardening => input_hardening(surface).await,
        ProbeKind::PiiAtRest => pii_at_rest(store).await,
        ProbeKind::CrossUserAccess => cross_user_access(surface).await,
    }
}

/// Injection payloads wrapped in valid JSON so only the signature check,
/// not JSON parsing, decides acceptance.
async fn injection_payloads(
    surface: &dyn TargetSurface,
) -> anyhow::Result<Vec<VulnerabilityDraft>> {
    let mut findings = Vec::new();
    for route in surface.input_routes() {
        let mut accepted = Vec::new();
        for (index, payload) in INJECTION_PAYLOADS.iter().enumerate() {
            let body = json!({ "message": payload }).to_string();
            let response = surface.submit(&route, &body).await?;
            if response.is_success() {
                accepted.push(index);
            }
        }
        if !accepted.is_empty() {
            findings.push(VulnerabilityDraft::new(
                format!(
                    "route {route} accepted {} of {} injection payloads",
                    accepted.len(),
                    INJECTION_PAYLOADS.len()
                ),
                json!({ "route": route, "accepted_payloads": accepted }),
            ));
        }
    }
    Ok(findings)
}

async fn reflected_content(surface: &dyn TargetSurface) -> anyhow::Result<Vec<VulnerabilityDraft>> {
    let mut findings = Vec::new();
    for route in surface.input_routes() {
        let marker = format!("vigil-probe-{}", Uuid::new_v4().simple());
        let body = json!({ "message": marker }).to_string();
        let response = surface.submit(&route, &body).await?;
        if response.body.contains(&marker) {
            findings.push(VulnerabilityDraft::new(
                format!("route {route} reflects submitted content unsanitized"),
                json!({ "route": route, "status": response.status }),
            ));
        }
    }
    Ok(findings)
}

async fn unauthenticated_access(
    surface: &dyn TargetSurface,
) -> anyhow::Result<Vec<VulnerabilityDraft>> {
    let mut findings = Vec::new();
    for route in surface.protected_routes() {
        let response = surface.fetch(&route, None).await?;
        if response.is_success() {
            findings.push(VulnerabilityDraft::new(
                format!("protected route {route} served an unauthenticated request"),
                json!({ "route": route, "status": response.status }),
            ));
        }
    }
    Ok(findings)
}

async fn session_rotation(surface: &dyn TargetSurface) -> anyhow::Result<Vec<VulnerabilityDraft>> {
    let anonymous = surface.begin_session().await?;
    let authenticated = surface.login(&anonymous).await?;
    if anonymous == authenticated {
        return Ok(vec![VulnerabilityDraft::new(
            "session identifier survives login, enabling session fixation".to_string(),
            json!({ "session_rotated": false }),
        )]);
    }
    Ok(Vec::new())
}

async fn rate_limit_burst(surface: &dyn TargetSurface) -> anyhow::Result<Vec<VulnerabilityDraft>> {
    let Some(route) = surface.input_routes().into_iter().next() else {
        return Ok(Vec::new());
    };
    let body = json!({ "message": "burst probe" }).to_string();
    let attempts = SUBMISSION_RATE_CAP + 5;
    let mut throttled = 0usize;
    for _ in 0..attempts {
        let response = surface.submit(&route, &body).await?;
        if response.status == 429 {
            throttled += 1;
        }
    }
    if throttled == 0 {
        return Ok(vec![VulnerabilityDraft::new(
            format!("route {route} accepted {attempts} rapid submissions without throttling"),
            json!({ "route": route, "attempts": attempts, "throttled": throttled }),
        )]);
    }
    Ok(Vec::new())
}

/// Malformed submissions must fail without exposing internals in the
/// error body.
async fn error_leakage(surface: &dyn TargetSurface) -> anyhow::Result<Vec<VulnerabilityDraft>> {
    let mut findings = Vec::new();
    for route in surface.input_routes() {
        let response = surface.submit(&route, "{\"contact\": ").await?;
        if response.is_success() {
            continue;
        }
        let matched: Vec<&str> = LEAK_SIGNATURES
            .iter()
            .copied()
            .filter(|signature| response.body.contains(signature))
            .collect();
        if !matched.is_empty() {
            findings.push(VulnerabilityDraft::new(
                format!("error response from {route} exposes internal details"),
                json!({ "route": route, "status": response.status, "matched": matched }),
            ));
        }
    }
    Ok(findings)
}

async fn anti_forgery(surface: &dyn TargetSurface) -> anyhow::Result<Vec<VulnerabilityDraft>> {
    let mut findings = Vec::new();
    let body = json!({ "message": "forgery probe" }).to_string();
    for route in surface.state_changing_routes() {
        let response = surface.submit_with_token(&route, &body, None).await?;
        if response.is_success() {
            findings.push(VulnerabilityDraft::new(
                format!("route {route} accepted a state change without an anti-forgery token"),
                json!({ "route": route, "status": response.status }),
            ));
        }
    }
    Ok(findings)
}

async fn input_hardening(surface: &dyn TargetSurface) -> anyhow::Result<Vec<VulnerabilityDraft>> {
    let Some(route) = surface.input_routes().into_iter().next() else {
        return Ok(Vec::new());
    };
    let oversized = format!("{{\"message\": \"{}\"}}", "x".repeat(12_000));
    let samples: [(&str, &str); 3] = [
        ("truncated_json", "{\"email\": \"a@b.example\""),
        ("null_bytes", "{\"name\": \"a\u{0}b\"}"),
        ("oversized", oversized.as_str()),
    ];

    let mut accepted = Vec::new();
    for (label, payload) in samples {
        let response = surface.submit(&route, payload).await?;
        if response.is_success() {
            accepted.push(label);
        }
    }
    if accepted.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![VulnerabilityDraft::new(
        format!("route {route} accepted malformed input: {}", accepted.join(", ")),
        json!({ "route": route, "accepted": accepted }),
    )])
}

/// Scan recent stored events, as persisted, for plaintext personal data.
///
/// Encrypted envelope values are skipped; they are ciphertext, which is
/// exactly the state this probe verifies. Findings name the event, field
/// path, and pattern label, never the matched text.
async fn pii_at_rest(store: &EventStore) -> anyhow::Result<Vec<VulnerabilityDraft>> {
    let mut patterns = Vec::with_capacity(PII_PATTERNS.len());
    for (label, pattern) in PII_PATTERNS {
        patterns.push((*label, Regex::new(pattern)?));
    }

    let events = store
        .query_raw(&EventFilter::new().with_limit(PII_SCAN_LIMIT))
        .await?;

    let mut findings = Vec::new();
    'events: for event in &events {
        let mut fields = Vec::new();
        collect_plaintext(&event.details, String::new(), &mut fields);
        for (path, text) in fields {
            for (label, regex) in &patterns {
                if regex.is_match(text) {
                    findings.push(VulnerabilityDraft::new(
                        format!("stored event field {path} holds a plaintext {label} value"),
                        json!({ "event_id": event.id, "field": path, "pattern": label }),
                    ));
                    if findings.len() >= PII_FINDING_LIMIT {
                        break 'events;
                    }
                    break;
                }
            }
        }
    }
    Ok(findings)
}

async fn cross_user_access(surface: &dyn TargetSurface) -> anyhow::Result<Vec<VulnerabilityDraft>> {
    let response = surface
        .fetch_user_resource("probe-user-a", "probe-user-b")
        .await?;
    if response.is_success() {
        return Ok(vec![VulnerabilityDraft::new(
            "a user can fetch another user's quiz history".to_string(),
            json!({ "status": response.status }),
        )]);
    }
    Ok(Vec::new())
}

/// Gather scannable string fields from a stored details value.
///
/// Encrypted envelopes are skipped whole, and bare UUID strings are
/// excluded so record references do not trip the digit-run patterns.
fn collect_plaintext<'a>(value: &'a Value, path: String, out: &mut Vec<(String, &'a str)>) {
    match value {
        Value::String(text) => {
            if Uuid::parse_str(text).is_err() {
                out.push((path, text));
            }
        }
        Value::Object(map) => {
            if EncryptedEnvelope::from_value(value).is_some() {
                return;
            }
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                collect_plaintext(child, child_path, out);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_plaintext(item, format!("{path}[{index}]"), out);
            }
        }
        _ => {}
    }
}
