//! The request-simulation contract and the in-crate sandbox surface.
//!
//! Probes never touch the production site or real user data; they run
//! against a [`TargetSurface`]. The [`SandboxSurface`] simulates the
//! marketing site's routes (contact form, newsletter, quiz) with hardened
//! defaults, and [`SurfaceFlaws`] toggles let tests and drills flip each
//! defense off to verify the corresponding probe detects the hole.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

/// Submissions allowed inside one rate window before throttling starts.
pub const SUBMISSION_RATE_CAP: usize = 10;

const RATE_WINDOW: Duration = Duration::from_secs(10);
const MAX_PAYLOAD_BYTES: usize = 10_000;

const INJECTION_SIGNATURES: &[&str] = &[
    "' or ",
    "drop table",
    "union select",
    "pg_sleep",
    "<script",
    "onerror=",
];

const LEAKY_ERROR_BODY: &str = "SQLSTATE 42601 syntax error in SELECT * FROM contacts \
     at /var/www/site/src/db.rs:42, secret=sk_live_redacted, stack trace follows";

/// Simulated HTTP exchange result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceResponse {
    pub status: u16,
    pub body: String,
    pub session: Option<String>,
}

impl SurfaceResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn plain(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            session: None,
        }
    }
}

/// What probes are allowed to do to a target.
///
/// Implementations must be side-effect free with respect to real user
/// data; every operation simulates a visitor or administrator request.
#[async_trait]
pub trait TargetSurface: Send + Sync {
    /// Routes that accept user input.
    fn input_routes(&self) -> Vec<String>;
    /// Routes that require authentication.
    fn protected_routes(&self) -> Vec<String>;
    /// Routes that change state and must enforce anti-forgery tokens.
    fn state_changing_routes(&self) -> Vec<String>;

    /// Submit a raw payload to an input route.
    async fn submit(&self, route: &str, payload: &str) -> anyhow::Result<SurfaceResponse>;

    /// Fetch a route, optionally presenting credentials.
    async fn fetch(&self, route: &str, credentials: Option<&str>)
        -> anyhow::Result<SurfaceResponse>;

    /// Start an anonymous session and return its identifier.
    async fn begin_session(&self) -> anyhow::Result<String>;

    /// Authenticate the given session, returning the post-login session id.
    async fn login(&self, session_id: &str) -> anyhow::Result<String>;

    /// Submit to a state-changing route with an optional anti-forgery token.
    async fn submit_with_token(
        &self,
        route: &str,
        payload: &str,
        csrf_token: Option<&str>,
    ) -> anyhow::Result<SurfaceResponse>;

    /// Fetch a per-user resource while acting as another user.
    async fn fetch_user_resource(
        &self,
        acting_user: &str,
        target_user: &str,
    ) -> anyhow::Result<SurfaceResponse>;
}

/// Protections the sandbox can selectively switch off.
///
/// Every flag defaults to off, which is the hardened configuration. Each
/// flag corresponds to one probe's detection path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurfaceFlaws {
    pub accept_injection: bool,
    pub reflect_unsanitized: bool,
    pub accept_unauthenticated: bool,
    pub reuse_session: bool,
    pub unlimited_rate: bool,
    pub verbose_errors: bool,
    pub skip_csrf_check: bool,
    pub accept_malformed: bool,
    pub expose_cross_user: bool,
}

impl SurfaceFlaws {
    /// Every defense off at once, for drills asserting full detection.
    pub fn all() -> Self {
        Self {
            accept_injection: true,
            reflect_unsanitized: true,
            accept_unauthenticated: true,
            reuse_session: true,
            unlimited_rate: true,
            verbose_errors: true,
            skip_csrf_check: true,
            accept_malformed: true,
            expose_cross_user: true,
        }
    }
}

/// In-process simulation of the website surface.
pub struct SandboxSurface {
    flaws: SurfaceFlaws,
    recent_submissions: Mutex<VecDeque<Instant>>,
    session_counter: AtomicU64,
}

impl SandboxSurface {
    /// Sandbox with every defense active.
    pub fn hardened() -> Self {
        Self::with_flaws(SurfaceFlaws::default())
    }

    pub fn with_flaws(flaws: SurfaceFlaws) -> Self {
        Self {
            flaws,
            recent_submissions: Mutex::new(VecDeque::new()),
            session_counter: AtomicU64::new(0),
        }
    }

    fn next_session(&self) -> String {
        let n = self.session_counter.fetch_add(1, Ordering::Relaxed);
        format!("session-{n}")
    }

    fn rejection(&self, status: u16) -> SurfaceResponse {
        if self.flaws.verbose_errors {
            SurfaceResponse::plain(status, LEAKY_ERROR_BODY)
        } else {
            SurfaceResponse::plain(status, "invalid input")
        }
    }

    /// Record a submission and report whether the rate window is full.
    fn over_rate_cap(&self) -> bool {
        let now = Instant::now();
        let mut window = self.recent_submissions.lock();
        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) > RATE_WINDOW)
        {
            window.pop_front();
        }
        window.push_back(now);
        window.len() > SUBMISSION_RATE_CAP
    }
}

impl Default for SandboxSurface {
    fn default() -> Self {
        Self::hardened()
    }
}

fn contains_injection_signature(payload: &str) -> bool {
    let lowered = payload.to_lowercase();
    INJECTION_SIGNATURES
        .iter()
        .any(|signature| lowered.contains(signature))
}

#[async_trait]
impl TargetSurface for SandboxSurface {
    fn input_routes(&self) -> Vec<String> {
        vec![
            "/api/contact".into(),
            "/api/newsletter".into(),
            "/api/quiz".into(),
        ]
    }

    fn protected_routes(&self) -> Vec<String> {
        vec!["/api/admin/events".into(), "/api/admin/reports".into()]
    }

    fn state_changing_routes(&self) -> Vec<String> {
        vec!["/api/contact".into(), "/api/newsletter".into()]
    }

    async fn submit(&self, route: &str, payload: &str) -> anyhow::Result<SurfaceResponse> {
        if !self.input_routes().iter().any(|r| r == route) {
            return Ok(SurfaceResponse::plain(404, "not found"));
        }

        if !self.flaws.accept_malformed {
            let malformed = payload.contains('\0')
                || payload.len() > MAX_PAYLOAD_BYTES
                || serde_json::from_str::<Value>(payload).is_err();
            if malformed {
                return Ok(self.rejection(400));
            }
        }
        if !self.flaws.accept_injection && contains_injection_signature(payload) {
            return Ok(self.rejection(400));
        }
        if self.over_rate_cap() && !self.flaws.unlimited_rate {
            return Ok(self.rejection(429));
        }

        let body = if self.flaws.reflect_unsanitized {
            format!("submission received: {payload}")
        } else {
            "submission received".to_string()
        };
        Ok(SurfaceResponse::plain(200, body))
    }

    async fn fetch(
        &self,
        route: &str,
        credentials: Option<&str>,
    ) -> anyhow::Result<SurfaceResponse> {
        let protected = self.protected_routes().iter().any(|r| r == route);
        if protected && credentials.is_none() && !self.flaws.accept_unauthenticated {
            return Ok(SurfaceResponse::plain(401, "authentication required"));
        }
        if protected {
            return Ok(SurfaceResponse::plain(200, "administrative event export"));
        }
        Ok(SurfaceResponse::plain(200, "ok"))
    }

    async fn begin_session(&self) -> anyhow::Result<String> {
        Ok(self.next_session())
    }

    async fn login(&self, session_id: &str) -> anyhow::Result<String> {
        if self.flaws.reuse_session {
            Ok(session_id.to_string())
        } else {
            Ok(self.next_session())
        }
    }

    async fn submit_with_token(
        &self,
        route: &str,
        _payload: &str,
        csrf_token: Option<&str>,
    ) -> anyhow::Result<SurfaceResponse> {
        if !self.state_changing_routes().iter().any(|r| r == route) {
            return Ok(SurfaceResponse::plain(404, "not found"));
        }
        if csrf_token.is_none() && !self.flaws.skip_csrf_check {
            return Ok(SurfaceResponse::plain(403, "missing anti-forgery token"));
        }
        Ok(SurfaceResponse::plain(200, "submission received"))
    }

    async fn fetch_user_resource(
        &self,
        acting_user: &str,
        target_user: &str,
    ) -> anyhow::Result<SurfaceResponse> {
        if acting_user == target_user || self.flaws.expose_cross_user {
            return Ok(SurfaceResponse::plain(
                200,
                format!("quiz history for {target_user}"),
            ));
        }
        Ok(SurfaceResponse::plain(403, "forbidden"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn benign_payload() -> String {
        json!({"email": "visitor@example.com", "message": "hello"}).to_string()
    }

    #[tokio::test]
    async fn test_hardened_surface_rejects_injection_and_malformed_input() {
        let surface = SandboxSurface::hardened();

        let injected = surface
            .submit("/api/contact", "{\"message\": \"' OR '1'='1' --\"}")
            .await
            .unwrap();
        assert_eq!(injected.status, 400);

        let malformed = surface.submit("/api/contact", "{not json").await.unwrap();
        assert_eq!(malformed.status, 400);
        assert_eq!(malformed.body, "invalid input");

        let ok = surface
            .submit("/api/contact", &benign_payload())
            .await
            .unwrap();
        assert_eq!(ok.status, 200);
        // No reflection of the submitted content.
        assert!(!ok.body.contains("visitor@example.com"));
    }

    #[tokio::test]
    async fn test_flawed_surface_reflects_and_leaks() {
        let surface = SandboxSurface::with_flaws(SurfaceFlaws {
            reflect_unsanitized: true,
            verbose_errors: true,
            ..SurfaceFlaws::default()
        });

        let reflected = surface
            .submit("/api/contact", &benign_payload())
            .await
            .unwrap();
        assert!(reflected.body.contains("visitor@example.com"));

        let leaky = surface.submit("/api/contact", "{not json").await.unwrap();
        assert_eq!(leaky.status, 400);
        assert!(leaky.body.contains("SQLSTATE"));
    }

    #[tokio::test]
    async fn test_rate_cap_kicks_in_within_the_window() {
        let surface = SandboxSurface::hardened();
        let payload = benign_payload();

        let mut statuses = Vec::new();
        for _ in 0..SUBMISSION_RATE_CAP + 2 {
            statuses.push(surface.submit("/api/contact", &payload).await.unwrap().status);
        }
        assert_eq!(
            statuses.iter().filter(|s| **s == 200).count(),
            SUBMISSION_RATE_CAP
        );
        assert_eq!(statuses.iter().filter(|s| **s == 429).count(), 2);
    }

    #[tokio::test]
    async fn test_session_rotation_and_protected_routes() {
        let surface = SandboxSurface::hardened();

        let anonymous = surface.begin_session().await.unwrap();
        let logged_in = surface.login(&anonymous).await.unwrap();
        assert_ne!(anonymous, logged_in);

        let denied = surface.fetch("/api/admin/events", None).await.unwrap();
        assert_eq!(denied.status, 401);
        let allowed = surface
            .fetch("/api/admin/events", Some("admin-token"))
            .await
            .unwrap();
        assert_eq!(allowed.status, 200);
    }

    #[tokio::test]
    async fn test_cross_user_isolation() {
        let hardened = SandboxSurface::hardened();
        let own = hardened
            .fetch_user_resource("user-a", "user-a")
            .await
            .unwrap();
        assert!(own.is_success());
        let other = hardened
            .fetch_user_resource("user-a", "user-b")
            .await
            .unwrap();
        assert_eq!(other.status, 403);

        let flawed = SandboxSurface::with_flaws(SurfaceFlaws {
            expose_cross_user: true,
            ..SurfaceFlaws::default()
        });
        let leaked = flawed
            .fetch_user_resource("user-a", "user-b")
            .await
            .unwrap();
        assert!(leaked.is_success());
        assert!(leaked.body.contains("user-b"));
    }
}
