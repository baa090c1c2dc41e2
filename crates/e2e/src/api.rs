//! REST helper for the e2e endpoints of the backing service

use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::credentials::CredentialRegistry;
use crate::error::{E2eError, E2eResult};

/// `data` object returned by a successful login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponseData {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Value of a quota override; the endpoint accepts numbers and strings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuotaValue {
    Number(i64),
    Text(String),
}

impl From<i64> for QuotaValue {
    fn from(value: i64) -> Self {
        QuotaValue::Number(value)
    }
}

impl From<&str> for QuotaValue {
    fn from(value: &str) -> Self {
        QuotaValue::Text(value.to_string())
    }
}

/// HTTP client for the application's REST API.
///
/// Every request goes through a cookie jar so a successful login leaves the
/// session cookie behind for subsequent calls. A client built with
/// [`ApiClient::with_cookie_jar`] shares its session with whatever else holds
/// that jar (the browser context of a test).
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    jar: Arc<Jar>,
    credentials: Arc<CredentialRegistry>,
}

impl ApiClient {
    /// Client with its own cookie jar
    pub fn new(base_url: &str, credentials: Arc<CredentialRegistry>) -> E2eResult<Self> {
        Self::with_cookie_jar(base_url, Arc::new(Jar::default()), credentials)
    }

    /// Client whose session lives in `jar`
    pub fn with_cookie_jar(
        base_url: &str,
        jar: Arc<Jar>,
        credentials: Arc<CredentialRegistry>,
    ) -> E2eResult<Self> {
        let client = Client::builder().cookie_provider(jar.clone()).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            jar,
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    pub fn credentials(&self) -> &Arc<CredentialRegistry> {
        &self.credentials
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Re-seed the database with the owner, admin and member users.
    ///
    /// Always wipes and re-creates; nothing about the previous state is
    /// checked.
    pub async fn reset_database(&self) -> E2eResult<()> {
        debug!("POST /rest/e2e/reset");
        let response = self
            .client
            .post(self.url("/rest/e2e/reset"))
            .json(self.credentials.as_ref())
            .send()
            .await
            .map_err(|e| E2eError::DatabaseReset(e.to_string()))?;

        if !response.status().is_success() {
            return Err(E2eError::DatabaseReset(format!(
                "reset endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Log in and keep the session cookie in the jar
    pub async fn login_and_set_cookies(
        &self,
        email: &str,
        password: &str,
    ) -> E2eResult<LoginResponseData> {
        debug!("POST /rest/login as {}", email);
        let response = self
            .client
            .post(self.url("/rest/login"))
            .json(&json!({
                "emailOrLdapLoginId": email,
                "password": password,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(E2eError::Authentication(format!(
                "login for {email} returned {status}"
            )));
        }

        let body: Value = response.json().await?;
        parse_login_data(body)
    }

    pub async fn set_feature_flag(&self, feature: &str, enabled: bool) -> E2eResult<()> {
        self.patch(
            "/rest/e2e/feature",
            json!({ "feature": format!("feat:{feature}"), "enabled": enabled }),
        )
        .await
    }

    pub async fn enable_feature(&self, feature: &str) -> E2eResult<()> {
        self.set_feature_flag(feature, true).await
    }

    pub async fn set_quota(&self, quota: &str, value: impl Into<QuotaValue>) -> E2eResult<()> {
        self.patch(
            "/rest/e2e/quota",
            json!({ "feature": format!("quota:{quota}"), "value": value.into() }),
        )
        .await
    }

    pub async fn set_max_team_projects_quota(&self, value: impl Into<QuotaValue>) -> E2eResult<()> {
        self.set_quota("maxTeamProjects", value).await
    }

    pub async fn set_queue_mode(&self, enabled: bool) -> E2eResult<()> {
        self.patch("/rest/e2e/queue-mode", json!({ "enabled": enabled }))
            .await
    }

    /// GET `path` and return the `data` field of the body; `Null` when the
    /// body carries none
    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> E2eResult<Value> {
        debug!("GET {}", path);
        let response = self
            .client
            .get(self.url(path))
            .query(params)
            .send()
            .await?
            .error_for_status()?;

        let mut body: Value = response.json().await?;
        Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }

    async fn patch(&self, path: &str, body: Value) -> E2eResult<()> {
        debug!("PATCH {} {}", path, body);
        let response: Response = self.client.patch(self.url(path)).json(&body).send().await?;
        response.error_for_status()?;
        Ok(())
    }
}

/// Pull the user out of a login body, rejecting payloads without an id
fn parse_login_data(mut body: Value) -> E2eResult<LoginResponseData> {
    let data = body.get_mut("data").map(Value::take).unwrap_or(Value::Null);

    let has_id = match data.get("id") {
        Some(Value::String(id)) => !id.is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    };
    if !has_id {
        return Err(E2eError::Authentication(
            "login did not return expected user data (e.g. user id)".to_string(),
        ));
    }

    let mut fields = match data {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    let id = match fields.remove("id") {
        Some(Value::String(id)) => id,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    Ok(LoginResponseData { id, extra: fields })
}
