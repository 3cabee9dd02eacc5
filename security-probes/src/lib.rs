//! Automated security probing of the website surface.
//!
//! A [`ProbeRunner`] executes the probe registry against a
//! [`TargetSurface`], on demand or on its continuous and daily
//! schedules. Each probe dispatches to one check strategy; what a check
//! observes becomes a [`SecurityVulnerability`] record, persisted
//! alongside the run's [`SecurityTestResult`] history and handed to the
//! escalation sink. Probes only ever touch a simulated surface, never
//! production routes or real user data.

mod checks;
pub mod error;
pub mod probe;
pub mod repository;
pub mod result;
pub mod runner;
pub mod surface;

pub use error::ProbeError;
pub use monitor_common::ResolveOutcome;
pub use probe::{
    default_probes, ParseCategoryError, ProbeCadence, ProbeCategory, ProbeKind, SecurityProbe,
};
pub use repository::postgres::{PostgresTestResultRepository, PostgresVulnerabilityRepository};
pub use repository::{
    InMemoryTestResultRepository, InMemoryVulnerabilityRepository, TestResultRepository,
    VulnerabilityRepository,
};
pub use result::{
    ParseTestStatusError, ProbeRunSummary, SecurityTestResult, SecurityVulnerability, TestStatus,
    VulnerabilityFilter,
};
pub use runner::ProbeRunner;
pub use surface::{SandboxSurface, SurfaceFlaws, SurfaceResponse, TargetSurface};
