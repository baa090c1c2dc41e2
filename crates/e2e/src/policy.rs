//! Tag-driven test setup policy
//!
//! Before a test body runs, its tags decide whether the database is reset and
//! which user (if any) the test is signed in as.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::api::{ApiClient, LoginResponseData};
use crate::credentials::CredentialRegistry;
use crate::error::E2eResult;

pub const AUTH_ADMIN_TAG: &str = "@auth:admin";
pub const AUTH_OWNER_TAG: &str = "@auth:owner";
pub const AUTH_MEMBER_TAG: &str = "@auth:member";
pub const AUTH_NONE_TAG: &str = "@auth:none";
pub const DB_RESET_TAG: &str = "@db:reset";

/// Seeded user a test can act as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Owner,
    Admin,
    Member(usize),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => f.write_str("owner"),
            Role::Admin => f.write_str("admin"),
            Role::Member(index) => write!(f, "member[{index}]"),
        }
    }
}

/// Tags of one test, lowercased once on construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(tags.into_iter().map(|t| t.as_ref().to_lowercase()).collect())
    }

    pub fn contains(&self, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        self.0.iter().any(|t| *t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the test asked for its own database reset
    pub fn needs_db_reset(&self) -> bool {
        self.contains(DB_RESET_TAG)
    }

    /// Role to sign in as before the test body.
    ///
    /// Priority: admin, owner, member (first member), none. A test with no
    /// auth tag runs as the owner, not anonymously.
    pub fn role(&self) -> Option<Role> {
        if self.contains(AUTH_ADMIN_TAG) {
            Some(Role::Admin)
        } else if self.contains(AUTH_OWNER_TAG) {
            Some(Role::Owner)
        } else if self.contains(AUTH_MEMBER_TAG) {
            Some(Role::Member(0))
        } else if self.contains(AUTH_NONE_TAG) {
            None
        } else {
            Some(Role::Owner)
        }
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Identity switching available to test bodies
#[derive(Clone)]
pub struct AuthHelpers {
    api: ApiClient,
    credentials: Arc<CredentialRegistry>,
}

impl AuthHelpers {
    pub fn new(api: ApiClient, credentials: Arc<CredentialRegistry>) -> Self {
        Self { api, credentials }
    }

    pub async fn signin_as(&self, role: Role) -> E2eResult<LoginResponseData> {
        let credential = self.credentials.for_role(role)?;
        debug!("Signing in as {} ({})", role, credential.email);
        self.api
            .login_and_set_cookies(&credential.email, &credential.password)
            .await
    }

    pub async fn signin_as_owner(&self) -> E2eResult<LoginResponseData> {
        self.signin_as(Role::Owner).await
    }

    pub async fn signin_as_admin(&self) -> E2eResult<LoginResponseData> {
        self.signin_as(Role::Admin).await
    }

    /// Fails with `IndexOutOfRange` before any request when `index` has no
    /// configured member
    pub async fn signin_as_member(&self, index: usize) -> E2eResult<LoginResponseData> {
        self.signin_as(Role::Member(index)).await
    }
}

/// Per-test database reset, run when the test carries [`DB_RESET_TAG`]
pub async fn apply_db_reset(api: &ApiClient, tags: &TagSet, title: &str) -> E2eResult<bool> {
    if !tags.needs_db_reset() {
        return Ok(false);
    }
    info!("Test \"{}\" requires DB reset. Resetting...", title);
    api.reset_database().await?;
    Ok(true)
}

/// Sign in according to the test's tags; returns the session user, or
/// `None` for `@auth:none`
pub async fn apply_auth(
    auth: &AuthHelpers,
    tags: &TagSet,
) -> E2eResult<Option<LoginResponseData>> {
    match tags.role() {
        Some(role) => auth.signin_as(role).await.map(Some),
        None => {
            debug!("Running without a session");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::E2eError;
    use test_case::test_case;

    #[test_case(&[], Some(Role::Owner); "untagged runs as owner")]
    #[test_case(&["@auth:admin"], Some(Role::Admin); "admin")]
    #[test_case(&["@auth:owner"], Some(Role::Owner); "owner")]
    #[test_case(&["@auth:member"], Some(Role::Member(0)); "member")]
    #[test_case(&["@auth:none"], None; "anonymous")]
    #[test_case(&["@auth:admin", "@auth:member"], Some(Role::Admin); "admin beats member")]
    #[test_case(&["@auth:member", "@auth:owner"], Some(Role::Owner); "owner beats member")]
    #[test_case(&["@auth:none", "@auth:member"], Some(Role::Member(0)); "member beats none")]
    #[test_case(&["@AUTH:ADMIN"], Some(Role::Admin); "case insensitive")]
    #[test_case(&["@smoke", "@db:reset"], Some(Role::Owner); "unrelated tags ignored")]
    fn test_role_priority(tags: &[&str], expected: Option<Role>) {
        assert_eq!(TagSet::new(tags.iter()).role(), expected);
    }

    #[test]
    fn test_db_reset_tag() {
        assert!(TagSet::new(["@DB:Reset"]).needs_db_reset());
        assert!(!TagSet::new(["@db"]).needs_db_reset());
        assert!(!TagSet::default().needs_db_reset());
    }

    #[test]
    fn test_tags_are_normalized() {
        let tags: TagSet = ["@Smoke", "@auth:NONE"].into_iter().collect();
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec!["@smoke", "@auth:none"]);
    }

    #[tokio::test]
    async fn test_signin_as_member_out_of_range() {
        let credentials = Arc::new(CredentialRegistry::default());
        // nothing listens here; the index check must fail before any request
        let api = ApiClient::new("http://127.0.0.1:9", credentials.clone()).unwrap();
        let auth = AuthHelpers::new(api, credentials);

        let err = auth.signin_as_member(2).await.unwrap_err();
        assert!(matches!(err, E2eError::IndexOutOfRange { index: 2, len: 1 }));
    }
}
