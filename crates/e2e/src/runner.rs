//! Test runner: projects, worker pool, retries and the result file

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::config::{ProjectConfig, RunConfig};
use crate::error::{E2eError, E2eResult};
use crate::fixture::{FixtureRegistry, Fixtures, TestInfo, TestScope, WorkerScope};
use crate::policy::TagSet;

type TestBody = Arc<dyn Fn(Fixtures) -> BoxFuture<'static, E2eResult<()>> + Send + Sync>;

/// A runnable test: title, tags, the fixtures its body asks for, and the body
#[derive(Clone)]
pub struct TestCase {
    title: String,
    tags: Vec<String>,
    fixtures: Vec<String>,
    only: bool,
    body: TestBody,
}

impl TestCase {
    pub fn new<F, Fut>(title: impl Into<String>, body: F) -> Self
    where
        F: Fn(Fixtures) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = E2eResult<()>> + Send + 'static,
    {
        Self {
            title: title.into(),
            tags: Vec::new(),
            fixtures: Vec::new(),
            only: false,
            body: Arc::new(move |fixtures| body(fixtures).boxed()),
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Fixtures resolved and handed to the body
    pub fn uses<I, S>(mut self, fixtures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fixtures.extend(fixtures.into_iter().map(Into::into));
        self
    }

    /// Focus the run on this test
    pub fn only(mut self) -> Self {
        self.only = true;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_only(&self) -> bool {
        self.only
    }

    pub fn tag_set(&self) -> TagSet {
        TagSet::new(&self.tags)
    }

    pub fn fixtures(&self) -> &[String] {
        &self.fixtures
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("title", &self.title)
            .field("tags", &self.tags)
            .field("fixtures", &self.fixtures)
            .field("only", &self.only)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    /// Passed after at least one failed attempt
    Flaky,
    Failed,
    Skipped,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub title: String,
    pub project: String,
    pub tags: Vec<String>,
    pub status: TestStatus,
    pub attempts: usize,
    pub worker_index: Option<usize>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl TestResult {
    fn skipped(case: &TestCase, project: &str, reason: &str) -> Self {
        Self {
            title: case.title.clone(),
            project: project.to_string(),
            tags: case.tags.clone(),
            status: TestStatus::Skipped,
            attempts: 0,
            worker_index: None,
            duration_ms: 0,
            error: Some(reason.to_string()),
        }
    }

    fn failed(case: &TestCase, project: &str, worker_index: usize, error: String) -> Self {
        Self {
            title: case.title.clone(),
            project: project.to_string(),
            tags: case.tags.clone(),
            status: TestStatus::Failed,
            attempts: 0,
            worker_index: Some(worker_index),
            duration_ms: 0,
            error: Some(error),
        }
    }
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub flaky: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    fn count(results: &[TestResult], status: TestStatus) -> usize {
        results.iter().filter(|r| r.status == status).count()
    }
}

/// Runs test cases against a fixture registry
pub struct TestRunner {
    registry: Arc<FixtureRegistry>,
    config: RunConfig,
    global_setup: Option<ApiClient>,
}

impl TestRunner {
    pub fn new(registry: FixtureRegistry, config: RunConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
            global_setup: None,
        }
    }

    /// Reset the database through `api` once before any project starts
    pub fn with_global_setup(mut self, api: ApiClient) -> Self {
        self.global_setup = Some(api);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every case through the configured projects
    pub async fn run(&self, cases: Vec<TestCase>) -> E2eResult<TestSuiteResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        let focused: Vec<&TestCase> = cases.iter().filter(|c| c.only).collect();
        if !focused.is_empty() && self.config.forbid_only {
            let titles: Vec<_> = focused.iter().map(|c| c.title.as_str()).collect();
            return Err(E2eError::Config(format!(
                "only is forbidden in this run, found on: {}",
                titles.join(", ")
            )));
        }
        let focus = !focused.is_empty();

        if let Some(api) = &self.global_setup {
            info!("Global setup: resetting database...");
            api.reset_database().await.map_err(|e| {
                error!("Global setup: database reset failed");
                e
            })?;
            info!("Global setup: database reset successful");
        }

        let mut results = Vec::new();
        let mut failed_projects: HashSet<String> = HashSet::new();
        let mut next_worker = 0;

        for project in self.config.ordered_projects()? {
            let selected: Vec<TestCase> = cases
                .iter()
                .filter(|c| project.matches(&c.title, &c.tag_set()))
                .cloned()
                .collect();
            if selected.is_empty() {
                continue;
            }

            let (to_run, unfocused): (Vec<_>, Vec<_>) =
                selected.into_iter().partition(|c| !focus || c.only);
            results.extend(
                unfocused
                    .iter()
                    .map(|c| TestResult::skipped(c, &project.name, "not focused")),
            );

            if let Some(dep) = project
                .dependencies
                .iter()
                .find(|d| failed_projects.contains(*d))
            {
                warn!("Skipping project '{}': dependency '{}' failed", project.name, dep);
                results.extend(
                    to_run
                        .iter()
                        .map(|c| TestResult::skipped(c, &project.name, "dependency failed")),
                );
                failed_projects.insert(project.name.clone());
                continue;
            }

            let project_results = self.run_project(project, to_run, &mut next_worker).await;
            if project_results
                .iter()
                .any(|r| r.status == TestStatus::Failed)
            {
                failed_projects.insert(project.name.clone());
            }
            results.extend(project_results);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let suite = TestSuiteResult {
            started_at,
            finished_at: Utc::now(),
            total: results.len(),
            passed: TestSuiteResult::count(&results, TestStatus::Passed),
            flaky: TestSuiteResult::count(&results, TestStatus::Flaky),
            failed: TestSuiteResult::count(&results, TestStatus::Failed),
            skipped: TestSuiteResult::count(&results, TestStatus::Skipped),
            duration_ms,
            results,
        };

        info!("");
        info!(
            "Test Results: {} passed, {} flaky, {} failed, {} skipped ({} ms)",
            suite.passed, suite.flaky, suite.failed, suite.skipped, duration_ms
        );
        Ok(suite)
    }

    async fn run_project(
        &self,
        project: &ProjectConfig,
        cases: Vec<TestCase>,
        next_worker: &mut usize,
    ) -> Vec<TestResult> {
        if cases.is_empty() {
            return Vec::new();
        }
        let workers = project
            .workers
            .unwrap_or(self.config.workers)
            .clamp(1, cases.len());
        info!(
            "Running {} test(s) in project '{}' using {} worker(s)",
            cases.len(),
            project.name,
            workers
        );

        let mut batches: Vec<Vec<TestCase>> = vec![Vec::new(); workers];
        for (i, case) in cases.into_iter().enumerate() {
            batches[i % workers].push(case);
        }

        let handles: Vec<_> = batches
            .into_iter()
            .map(|batch| {
                let worker_index = *next_worker;
                *next_worker += 1;
                let fallback = batch.clone();
                let handle = tokio::spawn(run_worker(
                    self.registry.clone(),
                    worker_index,
                    project.name.clone(),
                    batch,
                    self.config.retries,
                    self.config.test_timeout,
                ));
                (worker_index, fallback, handle)
            })
            .collect();

        let mut results = Vec::new();
        let joined = join_all(handles.into_iter().map(|(index, batch, handle)| async move {
            (index, batch, handle.await)
        }))
        .await;
        for (worker_index, batch, outcome) in joined {
            match outcome {
                Ok(worker_results) => results.extend(worker_results),
                Err(e) => {
                    error!("Worker {} aborted: {}", worker_index, e);
                    results.extend(batch.iter().map(|c| {
                        TestResult::failed(c, &project.name, worker_index, e.to_string())
                    }));
                }
            }
        }
        results
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// One worker: start its scope, run its batch in order, tear down
async fn run_worker(
    registry: Arc<FixtureRegistry>,
    worker_index: usize,
    project: String,
    cases: Vec<TestCase>,
    retries: usize,
    timeout: Duration,
) -> Vec<TestResult> {
    let mut scope = WorkerScope::new(registry, worker_index);

    if let Err(e) = scope.start().await {
        error!("Worker {} setup failed: {}", worker_index, e);
        for teardown_error in scope.finish().await {
            warn!("Worker {} teardown: {}", worker_index, teardown_error);
        }
        return cases
            .iter()
            .map(|c| TestResult::failed(c, &project, worker_index, e.to_string()))
            .collect();
    }

    let mut results = Vec::with_capacity(cases.len());
    for case in &cases {
        results.push(run_case(&mut scope, case, &project, retries, timeout).await);
    }

    for teardown_error in scope.finish().await {
        warn!("Worker {} teardown: {}", worker_index, teardown_error);
    }
    results
}

async fn run_case(
    scope: &mut WorkerScope,
    case: &TestCase,
    project: &str,
    retries: usize,
    timeout: Duration,
) -> TestResult {
    let start = Instant::now();
    let mut last_error = None;
    let mut attempts = 0;

    for retry in 0..=retries {
        attempts += 1;
        let info = TestInfo {
            title: case.title.clone(),
            tags: case.tag_set(),
            project: project.to_string(),
            worker_index: scope.worker_index(),
            retry,
        };

        match run_attempt(scope, case, info, timeout).await {
            Ok(()) => {
                last_error = None;
                break;
            }
            Err(e) => {
                if retry < retries {
                    warn!("↻ {} - {} (retry {}/{})", case.title, e, retry + 1, retries);
                }
                last_error = Some(e.to_string());
            }
        }
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = match (&last_error, attempts) {
        (Some(_), _) => TestStatus::Failed,
        (None, 1) => TestStatus::Passed,
        (None, _) => TestStatus::Flaky,
    };
    match &last_error {
        None => info!("✓ {} ({} ms)", case.title, duration_ms),
        Some(e) => error!("✗ {} - {}", case.title, e),
    }

    TestResult {
        title: case.title.clone(),
        project: project.to_string(),
        tags: case.tags.clone(),
        status,
        attempts,
        worker_index: Some(scope.worker_index()),
        duration_ms,
        error: last_error,
    }
}

/// One attempt in a fresh test scope. Teardown runs after success, failure,
/// panic and timeout alike.
async fn run_attempt(
    scope: &mut WorkerScope,
    case: &TestCase,
    info: TestInfo,
    timeout: Duration,
) -> E2eResult<()> {
    debug!("Running test: {}", case.title);
    let mut test_scope = TestScope::new(scope, info);

    let attempt = async {
        test_scope.start().await?;
        let fixtures = test_scope.request(&case.fixtures).await?;
        (case.body)(fixtures).await
    };
    let outcome = tokio::time::timeout(timeout, AssertUnwindSafe(attempt).catch_unwind()).await;

    let result = match outcome {
        Err(_) => Err(E2eError::Timeout(format!(
            "test \"{}\" exceeded {} ms",
            case.title,
            timeout.as_millis()
        ))),
        Ok(Err(panic)) => Err(E2eError::AssertionFailed(panic_message(panic.as_ref()))),
        Ok(Ok(result)) => result,
    };

    let teardown_errors = test_scope.finish().await;
    match (result, teardown_errors.into_iter().next()) {
        (Err(e), _) => Err(e),
        (Ok(()), Some(e)) => Err(e),
        (Ok(()), None) => Ok(()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test panicked".to_string()
    }
}
