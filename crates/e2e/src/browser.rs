//! Playwright browser automation
//!
//! A [`BrowserContext`] owns the session of one test: a base URL and a cookie
//! jar. Its API client ([`BrowserContext::request`]) writes into that jar, and
//! every command a [`Page`] sends first loads the jar's cookies into the
//! Playwright context, so a login through the API is visible in the browser.
//! Cookies the browser sets flow back into the same jar.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::credentials::CredentialRegistry;
use crate::error::{E2eError, E2eResult};
use crate::spec::TestStep;

const DRIVER_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "firefox" => Browser::Firefox,
            "webkit" => Browser::Webkit,
            _ => Browser::Chromium,
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub screenshot_dir: PathBuf,
    /// Directory workflow files are imported from
    pub fixtures_dir: PathBuf,
    /// Attribute `getByTestId`-style selectors match on
    pub test_id_attribute: String,
    /// Node binary used to run generated scripts
    pub node_binary: PathBuf,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1536,
            viewport_height: 960,
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            fixtures_dir: PathBuf::from("fixtures"),
            test_id_attribute: "data-test-id".to_string(),
            node_binary: PathBuf::from("node"),
        }
    }
}

/// Cookie handed to `context.addCookies`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub url: String,
}

/// Session state of one test
pub struct BrowserContext {
    base_url: String,
    jar: Arc<Jar>,
    config: PlaywrightConfig,
    closed: AtomicBool,
}

impl BrowserContext {
    pub fn new(base_url: &str, config: PlaywrightConfig) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            jar: Arc::new(Jar::default()),
            config,
            closed: AtomicBool::new(false),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    /// API client sharing this context's cookies
    pub fn request(&self, credentials: Arc<CredentialRegistry>) -> E2eResult<ApiClient> {
        ApiClient::with_cookie_jar(&self.base_url, self.jar.clone(), credentials)
    }

    /// Cookies currently held for the base URL
    pub fn cookies(&self) -> Vec<BrowserCookie> {
        let Ok(url) = Url::parse(&self.base_url) else {
            return Vec::new();
        };
        let Some(header) = self.jar.cookies(&url) else {
            return Vec::new();
        };
        let Ok(header) = header.to_str() else {
            return Vec::new();
        };

        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .map(|(name, value)| BrowserCookie {
                name: name.to_string(),
                value: value.to_string(),
                url: self.base_url.clone(),
            })
            .collect()
    }

    pub fn new_page(self: &Arc<Self>) -> E2eResult<Page> {
        if self.is_closed() {
            return Err(E2eError::Playwright("browser context is closed".to_string()));
        }
        std::fs::create_dir_all(&self.config.screenshot_dir)?;
        Ok(Page {
            context: self.clone(),
            current_path: Mutex::new(None),
            session: AsyncMutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the context. Pages created from it stop accepting work.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closing browser context for {}", self.base_url);
        }
    }
}

/// Playwright page handle
///
/// The first call starts one Node driver holding a single browser page; every
/// later call sends its steps to that driver, so navigation and in-page state
/// carry over between calls. After each command the driver reports the page
/// URL and the browser's cookies, which are written back into the context.
pub struct Page {
    context: Arc<BrowserContext>,
    current_path: Mutex<Option<String>>,
    session: AsyncMutex<Option<DriverSession>>,
    closed: AtomicBool,
}

/// A running Node driver
struct DriverSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    _dir: TempDir,
}

impl DriverSession {
    async fn send(&mut self, command: &Value) -> E2eResult<()> {
        let mut line = serde_json::to_string(command)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Next JSON reply, skipping anything else the driver printed
    async fn reply(&mut self) -> E2eResult<Value> {
        while let Some(line) = self.stdout.next_line().await? {
            match serde_json::from_str::<Value>(&line) {
                Ok(value) if value.is_object() => return Ok(value),
                _ => debug!("[page] {}", line),
            }
        }
        let status = self.child.wait().await?;
        Err(E2eError::Playwright(format!(
            "Playwright driver exited ({status})"
        )))
    }
}

impl Page {
    pub fn context(&self) -> &Arc<BrowserContext> {
        &self.context
    }

    /// Selector matching the configured test id attribute
    pub fn test_id(&self, id: &str) -> String {
        format!("[{}=\"{}\"]", self.context.config.test_id_attribute, id)
    }

    /// Path of the page as last reported by the browser
    pub fn current_path(&self) -> Option<String> {
        self.current_path
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn goto(&self, path: &str) -> E2eResult<()> {
        self.run(&[TestStep::Navigate {
            url: path.to_string(),
            wait_for_selector: None,
        }])
        .await
    }

    pub async fn click(&self, selector: &str) -> E2eResult<()> {
        self.run(&[TestStep::Click {
            selector: selector.to_string(),
            timeout_ms: None,
        }])
        .await
    }

    pub async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.run(&[TestStep::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
        }])
        .await
    }

    /// Inner texts of every element matching `selector`
    pub async fn texts(&self, selector: &str) -> E2eResult<Vec<String>> {
        let read = format!(
            "output.texts = await page.locator({}).allInnerTexts();\n",
            js_str(selector)
        );
        let output = self.execute(&read).await?;
        Ok(output
            .get("texts")
            .and_then(Value::as_array)
            .map(|texts| {
                texts
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|t| t.trim().to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Run steps on the page
    pub async fn run(&self, steps: &[TestStep]) -> E2eResult<()> {
        self.execute(&self.build_command(steps, "")).await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.context.is_closed()
    }

    /// Close the page and stop its driver
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let Some(mut session) = self.session.lock().await.take() else {
            return;
        };
        if session.send(&json!({ "close": true })).await.is_ok() {
            let _ = tokio::time::timeout(DRIVER_CLOSE_TIMEOUT, session.child.wait()).await;
        }
        let _ = session.child.kill().await;
    }

    /// Script that launches the browser and then runs commands read from
    /// stdin, one JSON object per line
    pub fn build_driver_script(&self) -> String {
        let config = &self.context.config;
        format!(
            r#"
const {{ chromium, firefox, webkit, selectors }} = require('playwright');
const readline = require('readline');
const AsyncFunction = Object.getPrototypeOf(async function () {{}}).constructor;

const reply = (message) => process.stdout.write(JSON.stringify(message) + '\n');

(async () => {{
  selectors.setTestIdAttribute({test_id});
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    baseURL: {base_url},
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
  const state = async () => ({{ url: page.url(), cookies: await context.cookies() }});
  reply({{ ready: true }});

  for await (const line of readline.createInterface({{ input: process.stdin }})) {{
    const command = JSON.parse(line);
    if (command.close) break;
    const output = {{}};
    try {{
      await context.addCookies(command.cookies);
      await new AsyncFunction('page', 'context', 'output', command.code)(page, context, output);
      reply({{ success: true, output, state: await state() }});
    }} catch (error) {{
      reply({{ success: false, error: error.message, stack: error.stack, state: await state() }});
    }}
  }}
  await browser.close();
}})().catch((error) => {{
  console.error(error.stack);
  process.exit(1);
}});
"#,
            test_id = js_str(&config.test_id_attribute),
            browser = config.browser.as_str(),
            headless = config.headless,
            base_url = js_str(&self.context.base_url),
            width = config.viewport_width,
            height = config.viewport_height,
        )
    }

    /// Body of one driver command for a set of steps; `extra` is appended
    /// after the steps and may write into `output`
    pub fn build_command(&self, steps: &[TestStep], extra: &str) -> String {
        let mut code = String::new();
        for (i, step) in steps.iter().enumerate() {
            code.push_str(&format!("// Step {}: {}\n", i + 1, step.label()));
            code.push_str(&self.step_to_js(step));
            code.push('\n');
        }
        code.push_str(extra);
        code
    }

    /// Convert a step to JavaScript code
    fn step_to_js(&self, step: &TestStep) -> String {
        match step {
            TestStep::Navigate {
                url,
                wait_for_selector,
            } => {
                let wait = wait_for_selector
                    .as_ref()
                    .map(|s| format!("\nawait page.waitForSelector({});", js_str(s)))
                    .unwrap_or_default();
                format!("await page.goto({});{}", js_str(url), wait)
            }
            TestStep::Click {
                selector,
                timeout_ms,
            } => format!(
                "await page.click({}, {{ timeout: {} }});",
                js_str(selector),
                timeout_ms.unwrap_or(5000)
            ),
            TestStep::Fill { selector, value } => {
                format!("await page.fill({}, {});", js_str(selector), js_str(value))
            }
            TestStep::Press { selector, key } => match selector {
                Some(sel) => format!(
                    "await page.locator({}).press({});",
                    js_str(sel),
                    js_str(key)
                ),
                None => format!("await page.keyboard.press({});", js_str(key)),
            },
            TestStep::Upload { selector, path } => format!(
                "await page.setInputFiles({}, {});",
                js_str(selector),
                js_str(path)
            ),
            TestStep::Wait {
                selector,
                timeout_ms,
                state,
            } => format!(
                "await page.waitForSelector({}, {{ state: '{}', timeout: {} }});",
                js_str(selector),
                state.as_str(),
                timeout_ms
            ),
            TestStep::Sleep { ms } => format!("await page.waitForTimeout({});", ms),
            TestStep::Assert {
                selector,
                visible,
                text,
                text_contains,
                count,
            } => {
                let loc = format!("page.locator({})", js_str(selector));
                let mut checks = Vec::new();
                if let Some(visible) = visible {
                    checks.push(format!(
                        "if ((await {loc}.first().isVisible()) !== {visible}) throw new Error({});",
                        js_str(&format!("expected {selector} visible={visible}"))
                    ));
                }
                if let Some(t) = text {
                    checks.push(format!(
                        "if ((await {loc}.first().innerText()).trim() !== {}) throw new Error({});",
                        js_str(t),
                        js_str(&format!("expected {selector} to have text {t}"))
                    ));
                }
                if let Some(t) = text_contains {
                    checks.push(format!(
                        "if (!(await {loc}.first().innerText()).includes({})) throw new Error({});",
                        js_str(t),
                        js_str(&format!("expected {selector} to contain {t}"))
                    ));
                }
                if let Some(c) = count {
                    checks.push(format!(
                        "if ((await {loc}.count()) !== {c}) throw new Error({});",
                        js_str(&format!("expected {c} match(es) for {selector}"))
                    ));
                }
                checks.join("\n")
            }
            TestStep::Screenshot { name, full_page } => {
                let path = self
                    .context
                    .config
                    .screenshot_dir
                    .join(format!("{}.png", name));
                format!(
                    "await page.screenshot({{ path: {}, fullPage: {} }});",
                    js_str(&path.to_string_lossy()),
                    full_page
                )
            }
            TestStep::Log { message } => format!("console.error({});", js_str(message)),
        }
    }

    /// Send a command body to the driver and return its `output` object
    pub async fn execute(&self, code: &str) -> E2eResult<Value> {
        if self.is_closed() {
            return Err(E2eError::Playwright("page is closed".to_string()));
        }

        let mut guard = self.session.lock().await;
        let mut session = match guard.take() {
            Some(session) => session,
            None => self.start_driver().await?,
        };

        let command = json!({ "code": code, "cookies": self.context.cookies() });
        // a driver that fails here is dropped and restarted on the next call
        session.send(&command).await?;
        let reply = session.reply().await?;
        *guard = Some(session);

        if let Some(state) = reply.get("state") {
            self.record_state(state);
        }
        if reply.get("success").and_then(Value::as_bool) != Some(true) {
            let message = reply
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(E2eError::Playwright(format!("Step failed: {message}")));
        }
        Ok(reply.get("output").cloned().unwrap_or(Value::Null))
    }

    async fn start_driver(&self) -> E2eResult<DriverSession> {
        let dir = tempfile::tempdir()?;
        let script_path = dir.path().join("driver.js");
        std::fs::write(&script_path, self.build_driver_script())?;

        debug!("Starting Playwright driver: {}", script_path.display());

        let mut child = Command::new(&self.context.config.node_binary)
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => E2eError::PlaywrightNotFound,
                _ => E2eError::Io(e),
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(E2eError::Playwright("driver pipes unavailable".to_string()));
        };
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!("[page] {}", line);
            }
        });

        let mut session = DriverSession {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            _dir: dir,
        };
        let ready = session.reply().await?;
        if ready.get("ready").and_then(Value::as_bool) != Some(true) {
            return Err(E2eError::Playwright(format!(
                "unexpected driver greeting: {ready}"
            )));
        }

        // resume where a previous driver left off
        if let Some(path) = self.current_path() {
            session
                .send(&json!({
                    "code": format!("await page.goto({});", js_str(&path)),
                    "cookies": self.context.cookies(),
                }))
                .await?;
            session.reply().await?;
        }
        Ok(session)
    }

    /// Take the page URL and browser cookies reported by the driver
    fn record_state(&self, state: &Value) {
        if let Some(url) = state.get("url").and_then(Value::as_str) {
            if let Some(path) = self.relative_path(url) {
                *self.current_path.lock().unwrap_or_else(|e| e.into_inner()) = Some(path);
            }
        }

        let Ok(base) = Url::parse(&self.context.base_url) else {
            return;
        };
        let cookies = state.get("cookies").and_then(Value::as_array);
        for cookie in cookies.into_iter().flatten() {
            let (Some(name), Some(value)) = (
                cookie.get("name").and_then(Value::as_str),
                cookie.get("value").and_then(Value::as_str),
            ) else {
                continue;
            };
            let path = cookie.get("path").and_then(Value::as_str).unwrap_or("/");
            self.context
                .jar
                .add_cookie_str(&format!("{name}={value}; Path={path}"), &base);
        }
    }

    /// `url` relative to the base URL; other origins are kept whole
    fn relative_path(&self, url: &str) -> Option<String> {
        if url.is_empty() || url.starts_with("about:") {
            return None;
        }
        match url.strip_prefix(self.context.base_url.as_str()) {
            Some("") => Some("/".to_string()),
            Some(rest) if rest.starts_with(['/', '?', '#']) => Some(rest.to_string()),
            _ => Some(url.to_string()),
        }
    }
}

/// Quote a string as a JavaScript literal
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
