//! Standard fixture set of the harness
//!
//! ```text
//! worker:  service ─> worker_api ─> worker_database_setup
//! test:    base_url ─> context ─┬─> page ─> app
//!                               └─> api ─┬─> database_setup
//!                                        └─> auth
//! ```

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::api::{ApiClient, LoginResponseData};
use crate::browser::{BrowserContext, Page};
use crate::config::HarnessConfig;
use crate::error::{E2eError, E2eResult};
use crate::fixture::{FixtureDef, FixtureRegistry, Provided};
use crate::pages::AppPage;
use crate::policy::{apply_auth, apply_db_reset, AuthHelpers};
use crate::service::BackingService;

pub const SERVICE: &str = "service";
pub const WORKER_API: &str = "worker_api";
pub const WORKER_DATABASE_SETUP: &str = "worker_database_setup";
pub const BASE_URL: &str = "base_url";
pub const CONTEXT: &str = "context";
pub const PAGE: &str = "page";
pub const API: &str = "api";
pub const DATABASE_SETUP: &str = "database_setup";
pub const AUTH: &str = "auth";
pub const APP: &str = "app";

/// Value of the `base_url` fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl(pub String);

/// Value of the `auth` fixture: sign-in helpers plus the user the test's
/// tags signed in (if any)
pub struct Auth {
    pub helpers: AuthHelpers,
    pub session: Option<LoginResponseData>,
}

/// Register the standard worker and test fixtures
pub fn standard_fixtures(config: HarnessConfig) -> E2eResult<FixtureRegistry> {
    let mut registry = FixtureRegistry::new();
    register_standard_fixtures(&mut registry, config)?;
    Ok(registry)
}

/// Add the standard fixtures to an existing registry, next to custom ones
pub fn register_standard_fixtures(
    registry: &mut FixtureRegistry,
    config: HarnessConfig,
) -> E2eResult<()> {
    let config = Arc::new(config);

    let cfg = config.clone();
    registry.register(
        FixtureDef::worker(SERVICE, move |_| {
            let cfg = cfg.clone();
            async move {
                let service = Arc::new(
                    BackingService::provision(&cfg.service, cfg.base_url_override.as_deref())
                        .await?,
                );
                info!("Backing service available at {}", service.base_url());
                let teardown = service.clone();
                Ok(Provided::shared(service).with_teardown(async move { teardown.stop().await }))
            }
        })
        .auto(),
    )?;

    let cfg = config.clone();
    registry.register(
        FixtureDef::worker(WORKER_API, move |fx| {
            let cfg = cfg.clone();
            async move {
                let service = fx.get::<BackingService>(SERVICE)?;
                let api = ApiClient::new(&service.base_url(), cfg.credentials.clone())?;
                Ok(Provided::value(api))
            }
        })
        .depends_on([SERVICE]),
    )?;

    // Workers pointed at one external instance share a single reset
    let external_reset = Arc::new(OnceCell::<()>::new());
    registry.register(
        FixtureDef::worker(WORKER_DATABASE_SETUP, move |fx| {
            let external_reset = external_reset.clone();
            async move {
                let service = fx.get::<BackingService>(SERVICE)?;
                let api = fx.get::<ApiClient>(WORKER_API)?;
                if matches!(*service, BackingService::External { .. }) {
                    if external_reset.initialized() {
                        debug!("Shared instance already reset, skipping worker reset");
                        return Ok(Provided::unit());
                    }
                    external_reset
                        .get_or_try_init(|| worker_reset(&api))
                        .await?;
                } else {
                    worker_reset(&api).await?;
                }
                Ok(Provided::unit())
            }
        })
        .depends_on([SERVICE, WORKER_API])
        .auto(),
    )?;

    registry.register(
        FixtureDef::test(BASE_URL, |fx| async move {
            let service = fx.get::<BackingService>(SERVICE)?;
            Ok(Provided::value(BaseUrl(service.base_url())))
        })
        .depends_on([SERVICE, WORKER_DATABASE_SETUP]),
    )?;

    let cfg = config.clone();
    registry.register(
        FixtureDef::test(CONTEXT, move |fx| {
            let cfg = cfg.clone();
            async move {
                let base_url = fx.get::<BaseUrl>(BASE_URL)?;
                let context = Arc::new(BrowserContext::new(&base_url.0, cfg.playwright.clone()));
                let teardown = context.clone();
                Ok(Provided::shared(context).with_teardown(async move {
                    teardown.close();
                    Ok(())
                }))
            }
        })
        .depends_on([BASE_URL]),
    )?;

    registry.register(
        FixtureDef::test(PAGE, |fx| async move {
            let context = fx.get::<BrowserContext>(CONTEXT)?;
            let page = Arc::new(context.new_page()?);
            let teardown = page.clone();
            Ok(Provided::shared(page).with_teardown(async move {
                teardown.close().await;
                Ok(())
            }))
        })
        .depends_on([CONTEXT]),
    )?;

    let cfg = config.clone();
    registry.register(
        FixtureDef::test(API, move |fx| {
            let cfg = cfg.clone();
            async move {
                let context = fx.get::<BrowserContext>(CONTEXT)?;
                Ok(Provided::value(context.request(cfg.credentials.clone())?))
            }
        })
        .depends_on([CONTEXT]),
    )?;

    registry.register(
        FixtureDef::test(DATABASE_SETUP, |fx| async move {
            let api = fx.get::<ApiClient>(API)?;
            let info = fx
                .test_info()
                .ok_or_else(|| E2eError::Config("database_setup outside a test".to_string()))?;
            apply_db_reset(&api, &info.tags, &info.title).await?;
            Ok(Provided::unit())
        })
        .depends_on([API])
        .auto(),
    )?;

    let cfg = config;
    registry.register(
        FixtureDef::test(AUTH, move |fx| {
            let cfg = cfg.clone();
            async move {
                let api = fx.get::<ApiClient>(API)?;
                let info = fx
                    .test_info()
                    .ok_or_else(|| E2eError::Config("auth outside a test".to_string()))?;
                let helpers = AuthHelpers::new((*api).clone(), cfg.credentials.clone());
                let session = apply_auth(&helpers, &info.tags).await?;
                Ok(Provided::value(Auth { helpers, session }))
            }
        })
        .depends_on([API, DATABASE_SETUP])
        .auto(),
    )?;

    registry.register(
        FixtureDef::test(APP, |fx| async move {
            let page = fx.get::<Page>(PAGE)?;
            Ok(Provided::value(AppPage::new(page)))
        })
        .depends_on([PAGE]),
    )?;

    Ok(())
}

async fn worker_reset(api: &ApiClient) -> E2eResult<()> {
    info!("Setting up test database with users (worker setup)...");
    if let Err(e) = api.reset_database().await {
        error!("Failed to set up test database: {}", e);
        return Err(e);
    }
    info!("Test users created successfully");
    Ok(())
}
