//! Conductor E2E fixture harness
//!
//! Drives end-to-end tests of the workflow editor:
//! - provisions one backing service container per worker
//! - resolves a graph of worker- and test-scoped fixtures with teardown
//! - applies tag policy (`@db:reset`, `@auth:*`) before each test
//! - drives Playwright through one long-lived Node driver per page
//! - runs YAML specs and Rust test cases in parallel and sequential projects
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  TestRunner                                                  │
//! │    projects (Full Parallel Tests -> Sequential Tests)        │
//! │    └── worker tasks ── WorkerScope                           │
//! │                          service -> worker_api -> db reset   │
//! │                          └── TestScope (per test)            │
//! │                               base_url -> context -> page    │
//! │                                            └─> api -> auth   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ApiClient          /rest/login, /rest/e2e/*                 │
//! │  BrowserContext     cookie jar shared with its ApiClient     │
//! │  AppPage            workflows, project settings              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod browser;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fixture;
pub mod fixtures;
pub mod pages;
pub mod policy;
pub mod runner;
pub mod service;
pub mod spec;

pub use api::{ApiClient, LoginResponseData, QuotaValue};
pub use browser::{BrowserContext, Page, PlaywrightConfig};
pub use config::{HarnessConfig, ProjectConfig, RunConfig};
pub use credentials::{Credential, CredentialRegistry};
pub use error::{E2eError, E2eResult};
pub use fixture::{FixtureDef, FixtureRegistry, Fixtures, Provided, Scope, TestInfo};
pub use fixtures::{standard_fixtures, Auth, BaseUrl};
pub use pages::AppPage;
pub use policy::{AuthHelpers, Role, TagSet};
pub use runner::{TestCase, TestResult, TestRunner, TestStatus, TestSuiteResult};
pub use service::{BackingService, ServiceConfig};
pub use spec::{TestSpec, TestStep};
