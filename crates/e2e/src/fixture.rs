//! Fixture graph: named, scoped, lazily resolved setup/teardown units
//!
//! Fixtures live in a [`FixtureRegistry`] (an arena of definitions plus a
//! name index). Each one declares a [`Scope`], the names it depends on and a
//! setup routine. Resolution happens inside a scope instance:
//!
//! ```text
//! WorkerScope (one per worker)          TestScope (one per test)
//!   service ──> worker_api ──> ...        base_url ──> context ──> api ──> auth
//!       ^                                    │
//!       └────────── worker fixtures are delegated to the worker scope
//! ```
//!
//! - values are memoized per scope instance; setup runs at most once
//! - `auto` fixtures resolve when their scope starts
//! - teardowns run in reverse resolution order when the scope finishes,
//!   whatever happened in between
//! - cycles and unknown names fail at resolution time

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::policy::TagSet;

/// Type-erased fixture value
pub type FixtureValue = Arc<dyn Any + Send + Sync>;

type SetupFn = Arc<dyn Fn(Fixtures) -> BoxFuture<'static, E2eResult<Provided>> + Send + Sync>;
type Teardown = BoxFuture<'static, E2eResult<()>>;

/// Lifetime boundary of a fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Created once per worker, shared by every test the worker runs
    Worker,
    /// Created fresh for each test
    Test,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Worker => f.write_str("worker"),
            Scope::Test => f.write_str("test"),
        }
    }
}

/// Metadata of the test a test scope belongs to
#[derive(Debug, Clone)]
pub struct TestInfo {
    pub title: String,
    pub tags: TagSet,
    pub project: String,
    pub worker_index: usize,
    pub retry: usize,
}

impl TestInfo {
    pub fn new(title: impl Into<String>, tags: TagSet) -> Self {
        Self {
            title: title.into(),
            tags,
            project: String::new(),
            worker_index: 0,
            retry: 0,
        }
    }
}

/// What a setup routine hands back: the value, and optionally the teardown
/// to run when the owning scope ends
pub struct Provided {
    value: FixtureValue,
    teardown: Option<Teardown>,
}

impl Provided {
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Self::shared(Arc::new(value))
    }

    /// Provide a value the teardown also holds on to
    pub fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value: value as FixtureValue,
            teardown: None,
        }
    }

    /// Fixture that exists only for its side effects
    pub fn unit() -> Self {
        Self::value(())
    }

    pub fn with_teardown<F>(mut self, teardown: F) -> Self
    where
        F: Future<Output = E2eResult<()>> + Send + 'static,
    {
        self.teardown = Some(teardown.boxed());
        self
    }
}

/// Resolved values handed to a setup routine or a test body
#[derive(Clone)]
pub struct Fixtures {
    owner: String,
    values: HashMap<String, FixtureValue>,
    test: Option<Arc<TestInfo>>,
}

impl Fixtures {
    pub(crate) fn new(
        owner: impl Into<String>,
        values: HashMap<String, FixtureValue>,
        test: Option<Arc<TestInfo>>,
    ) -> Self {
        Self {
            owner: owner.into(),
            values,
            test,
        }
    }

    /// Typed value of a requested fixture
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> E2eResult<Arc<T>> {
        let value = self
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| E2eError::UnknownFixture {
                name: name.to_string(),
                requested_by: format!("'{}'", self.owner),
            })?;

        value.downcast::<T>().map_err(|_| E2eError::FixtureType {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// Test metadata; `None` inside worker fixtures
    pub fn test_info(&self) -> Option<&TestInfo> {
        self.test.as_deref()
    }
}

/// A registered fixture
pub struct FixtureDef {
    name: String,
    scope: Scope,
    auto: bool,
    deps: Vec<String>,
    setup: SetupFn,
}

impl FixtureDef {
    pub fn new<F, Fut>(name: impl Into<String>, scope: Scope, setup: F) -> Self
    where
        F: Fn(Fixtures) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = E2eResult<Provided>> + Send + 'static,
    {
        Self {
            name: name.into(),
            scope,
            auto: false,
            deps: Vec::new(),
            setup: Arc::new(move |fixtures| setup(fixtures).boxed()),
        }
    }

    pub fn worker<F, Fut>(name: impl Into<String>, setup: F) -> Self
    where
        F: Fn(Fixtures) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = E2eResult<Provided>> + Send + 'static,
    {
        Self::new(name, Scope::Worker, setup)
    }

    pub fn test<F, Fut>(name: impl Into<String>, setup: F) -> Self
    where
        F: Fn(Fixtures) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = E2eResult<Provided>> + Send + 'static,
    {
        Self::new(name, Scope::Test, setup)
    }

    /// Resolve at the start of the scope even if nothing requests it
    pub fn auto(mut self) -> Self {
        self.auto = true;
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }

    pub fn dependencies(&self) -> &[String] {
        &self.deps
    }
}

/// Arena of fixture definitions indexed by name
#[derive(Default)]
pub struct FixtureRegistry {
    defs: Vec<FixtureDef>,
    index: HashMap<String, usize>,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: FixtureDef) -> E2eResult<()> {
        if self.index.contains_key(&def.name) {
            return Err(E2eError::DuplicateFixture(def.name));
        }
        self.index.insert(def.name.clone(), self.defs.len());
        self.defs.push(def);
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, def: FixtureDef) -> E2eResult<Self> {
        self.register(def)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&FixtureDef> {
        self.index.get(name).map(|&i| &self.defs[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    fn lookup(&self, name: &str, stack: &[String]) -> E2eResult<&FixtureDef> {
        self.get(name).ok_or_else(|| E2eError::UnknownFixture {
            name: name.to_string(),
            requested_by: match stack.last() {
                Some(parent) => format!("'{parent}'"),
                None => "the test".to_string(),
            },
        })
    }

    fn auto_fixtures(&self, scope: Scope) -> Vec<String> {
        self.defs
            .iter()
            .filter(|d| d.scope == scope && d.auto)
            .map(|d| d.name.clone())
            .collect()
    }
}

fn cycle_error(stack: &[String], name: &str) -> E2eError {
    let start = stack.iter().position(|n| n == name).unwrap_or(0);
    let mut cycle: Vec<String> = stack[start..].to_vec();
    cycle.push(name.to_string());
    E2eError::DependencyCycle { cycle }
}

/// Memoized values and pending teardowns of one scope instance
#[derive(Default)]
struct ScopeState {
    values: HashMap<String, FixtureValue>,
    order: Vec<String>,
    teardowns: Vec<(String, Option<Teardown>)>,
}

impl ScopeState {
    fn record(&mut self, name: &str, provided: Provided) -> FixtureValue {
        self.values.insert(name.to_string(), provided.value.clone());
        self.order.push(name.to_string());
        self.teardowns.push((name.to_string(), provided.teardown));
        provided.value
    }

    async fn finish(&mut self, scope: Scope) -> Vec<E2eError> {
        let mut errors = Vec::new();
        while let Some((name, teardown)) = self.teardowns.pop() {
            debug!("Tearing down {} fixture '{}'", scope, name);
            if let Some(teardown) = teardown {
                if let Err(e) = teardown.await {
                    warn!("Teardown of fixture '{}' failed: {}", name, e);
                    errors.push(e);
                }
            }
        }
        self.values.clear();
        errors
    }
}

/// Worker scope: owns worker fixtures for the lifetime of one worker
pub struct WorkerScope {
    registry: Arc<FixtureRegistry>,
    worker_index: usize,
    state: ScopeState,
}

impl WorkerScope {
    pub fn new(registry: Arc<FixtureRegistry>, worker_index: usize) -> Self {
        Self {
            registry,
            worker_index,
            state: ScopeState::default(),
        }
    }

    pub fn worker_index(&self) -> usize {
        self.worker_index
    }

    pub fn registry(&self) -> &Arc<FixtureRegistry> {
        &self.registry
    }

    /// Resolve every auto worker fixture, in registration order
    pub async fn start(&mut self) -> E2eResult<()> {
        for name in self.registry.auto_fixtures(Scope::Worker) {
            self.resolve(&name).await?;
        }
        Ok(())
    }

    pub async fn resolve(&mut self, name: &str) -> E2eResult<FixtureValue> {
        let mut stack = Vec::new();
        self.resolve_inner(name, &mut stack).await
    }

    pub async fn get<T: Any + Send + Sync>(&mut self, name: &str) -> E2eResult<Arc<T>> {
        let value = self.resolve(name).await?;
        value.downcast::<T>().map_err(|_| E2eError::FixtureType {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// Names in the order their setups completed
    pub fn resolution_order(&self) -> &[String] {
        &self.state.order
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        self.state.values.contains_key(name)
    }

    /// Run worker teardowns, last resolved first
    pub async fn finish(mut self) -> Vec<E2eError> {
        debug!("Finishing worker scope {}", self.worker_index);
        self.state.finish(Scope::Worker).await
    }

    fn resolve_inner<'a>(
        &'a mut self,
        name: &'a str,
        stack: &'a mut Vec<String>,
    ) -> BoxFuture<'a, E2eResult<FixtureValue>> {
        async move {
            let registry = self.registry.clone();
            let def = registry.lookup(name, stack)?;

            if let Some(value) = self.state.values.get(name) {
                return Ok(value.clone());
            }
            if stack.iter().any(|n| n == name) {
                return Err(cycle_error(stack, name));
            }
            if def.scope == Scope::Test {
                let fixture = stack.last().cloned().unwrap_or_else(|| name.to_string());
                return Err(E2eError::ScopeMismatch {
                    fixture,
                    dependency: name.to_string(),
                });
            }

            stack.push(name.to_string());
            let mut values = HashMap::new();
            for dep in &def.deps {
                let value = self.resolve_inner(dep, stack).await?;
                values.insert(dep.clone(), value);
            }
            stack.pop();

            debug!("Setting up worker fixture '{}'", name);
            let provided = (def.setup)(Fixtures::new(name, values, None)).await?;
            Ok(self.state.record(name, provided))
        }
        .boxed()
    }
}

impl Drop for WorkerScope {
    fn drop(&mut self) {
        if !self.state.teardowns.is_empty() {
            warn!(
                "Worker scope {} dropped with {} fixture(s) not torn down",
                self.worker_index,
                self.state.teardowns.len()
            );
        }
    }
}

/// Test scope: fresh fixtures for one test, backed by its worker's scope
pub struct TestScope<'w> {
    worker: &'w mut WorkerScope,
    info: Arc<TestInfo>,
    state: ScopeState,
}

impl<'w> TestScope<'w> {
    pub fn new(worker: &'w mut WorkerScope, info: TestInfo) -> Self {
        Self {
            worker,
            info: Arc::new(info),
            state: ScopeState::default(),
        }
    }

    pub fn info(&self) -> &TestInfo {
        &self.info
    }

    /// Resolve every auto test fixture, in registration order
    pub async fn start(&mut self) -> E2eResult<()> {
        for name in self.worker.registry.auto_fixtures(Scope::Test) {
            self.resolve(&name).await?;
        }
        Ok(())
    }

    pub async fn resolve(&mut self, name: &str) -> E2eResult<FixtureValue> {
        let mut stack = Vec::new();
        self.resolve_inner(name, &mut stack).await
    }

    pub async fn get<T: Any + Send + Sync>(&mut self, name: &str) -> E2eResult<Arc<T>> {
        let value = self.resolve(name).await?;
        value.downcast::<T>().map_err(|_| E2eError::FixtureType {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// Resolve the fixtures a test body asks for
    pub async fn request(&mut self, names: &[String]) -> E2eResult<Fixtures> {
        let mut values = HashMap::new();
        for name in names {
            values.insert(name.clone(), self.resolve(name).await?);
        }
        Ok(Fixtures::new(
            self.info.title.clone(),
            values,
            Some(self.info.clone()),
        ))
    }

    /// Test fixtures in the order their setups completed
    pub fn resolution_order(&self) -> &[String] {
        &self.state.order
    }

    /// Run test teardowns, last resolved first. Worker fixtures stay alive.
    pub async fn finish(mut self) -> Vec<E2eError> {
        debug!("Finishing test scope for \"{}\"", self.info.title);
        self.state.finish(Scope::Test).await
    }

    fn resolve_inner<'a>(
        &'a mut self,
        name: &'a str,
        stack: &'a mut Vec<String>,
    ) -> BoxFuture<'a, E2eResult<FixtureValue>> {
        async move {
            let registry = self.worker.registry.clone();
            let def = registry.lookup(name, stack)?;

            if def.scope == Scope::Worker {
                return self.worker.resolve_inner(name, stack).await;
            }
            if let Some(value) = self.state.values.get(name) {
                return Ok(value.clone());
            }
            if stack.iter().any(|n| n == name) {
                return Err(cycle_error(stack, name));
            }

            stack.push(name.to_string());
            let mut values = HashMap::new();
            for dep in &def.deps {
                let value = self.resolve_inner(dep, stack).await?;
                values.insert(dep.clone(), value);
            }
            stack.pop();

            debug!("Setting up test fixture '{}'", name);
            let fixtures = Fixtures::new(name, values, Some(self.info.clone()));
            let provided = (def.setup)(fixtures).await?;
            Ok(self.state.record(name, provided))
        }
        .boxed()
    }
}

impl Drop for TestScope<'_> {
    fn drop(&mut self) {
        if !self.state.teardowns.is_empty() {
            warn!(
                "Test scope for \"{}\" dropped with {} fixture(s) not torn down",
                self.info.title,
                self.state.teardowns.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn logged(log: &Log, name: &'static str, deps: &[&str], scope: Scope) -> FixtureDef {
        let log = log.clone();
        FixtureDef::new(name, scope, move |_| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("setup:{name}"));
                let teardown_log = log.clone();
                Ok(Provided::value(name.to_string()).with_teardown(async move {
                    teardown_log.lock().unwrap().push(format!("teardown:{name}"));
                    Ok(())
                }))
            }
        })
        .depends_on(deps.iter().copied())
    }

    fn info(title: &str) -> TestInfo {
        TestInfo::new(title, TagSet::default())
    }

    #[tokio::test]
    async fn test_teardown_reverses_resolution() {
        let log: Log = Arc::default();
        let registry = FixtureRegistry::new()
            .with(logged(&log, "a", &[], Scope::Test))
            .unwrap()
            .with(logged(&log, "b", &["a"], Scope::Test))
            .unwrap()
            .with(logged(&log, "c", &["b"], Scope::Test))
            .unwrap();

        let mut worker = WorkerScope::new(Arc::new(registry), 0);
        let mut scope = TestScope::new(&mut worker, info("chain"));
        let c: Arc<String> = scope.get("c").await.unwrap();
        assert_eq!(c.as_str(), "c");
        assert_eq!(scope.resolution_order(), ["a", "b", "c"]);

        assert!(scope.finish().await.is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "setup:a",
                "setup:b",
                "setup:c",
                "teardown:c",
                "teardown:b",
                "teardown:a"
            ]
        );
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_memoized_within_scope() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = FixtureRegistry::new()
            .with(FixtureDef::test("counted", move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Provided::value(n)) }
            }))
            .unwrap();

        let mut worker = WorkerScope::new(Arc::new(registry), 0);
        let mut scope = TestScope::new(&mut worker, info("memo"));
        let first: Arc<usize> = scope.get("counted").await.unwrap();
        let second: Arc<usize> = scope.get("counted").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        scope.finish().await;

        // a new test scope gets a fresh value
        let mut scope = TestScope::new(&mut worker, info("memo again"));
        let third: Arc<usize> = scope.get("counted").await.unwrap();
        assert_eq!(*third, 1);
        scope.finish().await;
    }

    #[tokio::test]
    async fn test_worker_fixtures_resolve_once_across_tests() {
        let log: Log = Arc::default();
        let registry = FixtureRegistry::new()
            .with(logged(&log, "service", &[], Scope::Worker).auto())
            .unwrap()
            .with(logged(&log, "client", &["service"], Scope::Worker))
            .unwrap()
            .with(logged(&log, "seed", &["client"], Scope::Worker).auto())
            .unwrap()
            .with(logged(&log, "url", &["service", "seed"], Scope::Test))
            .unwrap();

        let mut worker = WorkerScope::new(Arc::new(registry), 3);
        worker.start().await.unwrap();
        assert_eq!(worker.resolution_order(), ["service", "client", "seed"]);

        for n in 0..4 {
            let mut scope = TestScope::new(&mut worker, info(&format!("test {n}")));
            scope.resolve("url").await.unwrap();
            assert_eq!(scope.resolution_order(), ["url"]);
            scope.finish().await;
        }

        let log_now = log.lock().unwrap().clone();
        assert_eq!(log_now.iter().filter(|l| *l == "setup:service").count(), 1);
        assert_eq!(log_now.iter().filter(|l| *l == "setup:seed").count(), 1);
        assert_eq!(log_now.iter().filter(|l| *l == "setup:url").count(), 4);
        assert!(!log_now.contains(&"teardown:service".to_string()));

        worker.finish().await;
        let log_now = log.lock().unwrap().clone();
        let tail: Vec<_> = log_now.iter().rev().take(3).cloned().collect();
        assert_eq!(tail, vec!["teardown:service", "teardown:client", "teardown:seed"]);
    }

    #[tokio::test]
    async fn test_auto_fixture_runs_once_without_being_requested() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = FixtureRegistry::new()
            .with(
                FixtureDef::test("side_effect", move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Provided::unit()) }
                })
                .auto(),
            )
            .unwrap()
            .with(FixtureDef::test("other", |_| async { Ok(Provided::unit()) }))
            .unwrap();

        let mut worker = WorkerScope::new(Arc::new(registry), 0);
        let mut scope = TestScope::new(&mut worker, info("auto"));
        scope.start().await.unwrap();
        scope.resolve("side_effect").await.unwrap();
        scope.resolve("other").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        scope.finish().await;
    }

    #[tokio::test]
    async fn test_cycle_is_detected() {
        let log: Log = Arc::default();
        let registry = FixtureRegistry::new()
            .with(logged(&log, "a", &["c"], Scope::Test))
            .unwrap()
            .with(logged(&log, "b", &["a"], Scope::Test))
            .unwrap()
            .with(logged(&log, "c", &["b"], Scope::Test))
            .unwrap();

        let mut worker = WorkerScope::new(Arc::new(registry), 0);
        let mut scope = TestScope::new(&mut worker, info("cycle"));
        let err = scope.resolve("a").await.unwrap_err();
        match err {
            E2eError::DependencyCycle { cycle } => assert_eq!(cycle, vec!["a", "c", "b", "a"]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(log.lock().unwrap().is_empty());
        scope.finish().await;
    }

    #[tokio::test]
    async fn test_unknown_dependency() {
        let log: Log = Arc::default();
        let registry = FixtureRegistry::new()
            .with(logged(&log, "page", &["browser"], Scope::Test))
            .unwrap();

        let mut worker = WorkerScope::new(Arc::new(registry), 0);
        let mut scope = TestScope::new(&mut worker, info("unknown"));
        let err = scope.resolve("page").await.unwrap_err();
        assert!(
            matches!(err, E2eError::UnknownFixture { ref name, ref requested_by } if name == "browser" && requested_by == "'page'")
        );
        let err = scope.resolve("nope").await.unwrap_err();
        assert!(err.is_configuration());
        scope.finish().await;
    }

    #[tokio::test]
    async fn test_worker_fixture_cannot_use_test_fixture() {
        let log: Log = Arc::default();
        let registry = FixtureRegistry::new()
            .with(logged(&log, "per_test", &[], Scope::Test))
            .unwrap()
            .with(logged(&log, "shared", &["per_test"], Scope::Worker))
            .unwrap();

        let mut worker = WorkerScope::new(Arc::new(registry), 0);
        let err = worker.resolve("shared").await.unwrap_err();
        assert!(matches!(err, E2eError::ScopeMismatch { .. }));
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_teardown_runs_after_dependent_setup_fails() {
        let log: Log = Arc::default();
        let registry = FixtureRegistry::new()
            .with(logged(&log, "context", &[], Scope::Test))
            .unwrap()
            .with(
                FixtureDef::test("login", |_| async {
                    Err::<Provided, _>(E2eError::Authentication("no id".into()))
                })
                .depends_on(["context"]),
            )
            .unwrap();

        let mut worker = WorkerScope::new(Arc::new(registry), 0);
        let mut scope = TestScope::new(&mut worker, info("failing setup"));
        let err = scope.resolve("login").await.unwrap_err();
        assert!(matches!(err, E2eError::Authentication(_)));
        scope.finish().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["setup:context", "teardown:context"]
        );
    }

    #[tokio::test]
    async fn test_teardown_errors_do_not_stop_other_teardowns() {
        let log: Log = Arc::default();
        let registry = FixtureRegistry::new()
            .with(logged(&log, "first", &[], Scope::Test))
            .unwrap()
            .with(
                FixtureDef::test("broken", |_| async {
                    Ok(Provided::unit().with_teardown(async {
                        Err::<(), _>(E2eError::Playwright("page already closed".into()))
                    }))
                })
                .depends_on(["first"]),
            )
            .unwrap();

        let mut worker = WorkerScope::new(Arc::new(registry), 0);
        let mut scope = TestScope::new(&mut worker, info("teardown errors"));
        scope.resolve("broken").await.unwrap();
        let errors = scope.finish().await;
        assert_eq!(errors.len(), 1);
        assert!(log.lock().unwrap().contains(&"teardown:first".to_string()));
    }

    #[tokio::test]
    async fn test_fixtures_type_checks() {
        let registry = FixtureRegistry::new()
            .with(FixtureDef::test("number", |_| async { Ok(Provided::value(7u32)) }))
            .unwrap();

        let mut worker = WorkerScope::new(Arc::new(registry), 0);
        let mut scope = TestScope::new(&mut worker, info("types"));
        let fixtures = scope.request(&["number".to_string()]).await.unwrap();
        assert_eq!(*fixtures.get::<u32>("number").unwrap(), 7);
        assert!(matches!(
            fixtures.get::<String>("number"),
            Err(E2eError::FixtureType { .. })
        ));
        assert!(matches!(
            fixtures.get::<u32>("missing"),
            Err(E2eError::UnknownFixture { .. })
        ));
        assert_eq!(fixtures.test_info().unwrap().title, "types");
        scope.finish().await;
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = FixtureRegistry::new();
        registry
            .register(FixtureDef::worker("service", |_| async { Ok(Provided::unit()) }))
            .unwrap();
        let err = registry
            .register(FixtureDef::test("service", |_| async { Ok(Provided::unit()) }))
            .unwrap_err();
        assert!(matches!(err, E2eError::DuplicateFixture(ref n) if n == "service"));
        assert_eq!(registry.len(), 1);
    }
}
