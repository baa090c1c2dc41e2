//! Error types for the E2E harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Backing service failed to start: {0}")]
    Provisioning(String),

    #[error("Backing service not ready after {attempts} attempts ({waited_ms} ms)")]
    ServiceNotReady { attempts: usize, waited_ms: u64 },

    #[error("Database reset failed: {0}. Make sure the build includes the e2e test endpoints")]
    DatabaseReset(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Dependency cycle between fixtures: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Unknown fixture '{name}' (requested by {requested_by})")]
    UnknownFixture { name: String, requested_by: String },

    #[error("Fixture '{0}' is already registered")]
    DuplicateFixture(String),

    #[error("Worker fixture '{fixture}' cannot depend on test fixture '{dependency}'")]
    ScopeMismatch { fixture: String, dependency: String },

    #[error("Fixture '{name}' does not provide a value of type {expected}")]
    FixtureType { name: String, expected: &'static str },

    #[error("Member index {index} out of range ({len} member credential(s) configured)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Invalid run configuration: {0}")]
    Config(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether this error comes from the fixture graph configuration rather
    /// than from the system under test
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            E2eError::DependencyCycle { .. }
                | E2eError::UnknownFixture { .. }
                | E2eError::DuplicateFixture(_)
                | E2eError::ScopeMismatch { .. }
                | E2eError::FixtureType { .. }
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
