//! Login, session expiry and group-gated extras
//!
//! Credentials are checked by an [`AuthenticationStrategy`]. The only
//! strategy shipped is [`PassphraseSumStrategy`], which keeps the existing
//! `user_config.json` format working: the passphrase's code points are
//! summed and the sum is looked up per group. It is not a secure scheme;
//! it sits behind the trait so it can be replaced without touching the
//! session or conversation logic.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;

use crate::api::ManifestSource;
use crate::error::{DifyChatError, Result};
use crate::models::ExternalLink;
use crate::storage::{KeyValueStore, StorageKey};

const DATE_FORMAT: &str = "%Y-%m-%d";
const LOGIN_FAILED: &str = "Fail to login, please check your email and password";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// Resolves credentials to a user group
#[async_trait]
pub trait AuthenticationStrategy: Send + Sync {
    /// Group the credentials belong to, `None` when they match nothing
    async fn authenticate(&self, email: &str, passphrase: &str) -> Result<Option<String>>;
}

/// Sum of the passphrase's Unicode code points
pub fn passphrase_sum(passphrase: &str) -> i64 {
    passphrase.chars().map(|c| c as i64).sum()
}

/// Matches the passphrase sum against the passcode manifest
pub struct PassphraseSumStrategy {
    manifests: Arc<dyn ManifestSource>,
}

impl PassphraseSumStrategy {
    /// Create a strategy reading `user_config.json` from `manifests`
    pub fn new(manifests: Arc<dyn ManifestSource>) -> Self {
        Self { manifests }
    }
}

#[async_trait]
impl AuthenticationStrategy for PassphraseSumStrategy {
    async fn authenticate(&self, _email: &str, passphrase: &str) -> Result<Option<String>> {
        let codes = self.manifests.passcode_manifest().await?;
        let sum = passphrase_sum(passphrase);
        Ok(codes
            .into_iter()
            .find(|(_, code)| *code == sum)
            .map(|(group, _)| group))
    }
}

/// Result of the eager session check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nobody is logged in
    Missing,
    /// The login is too old; identity keys were cleared
    Expired,
    /// Logged in
    Valid {
        /// User id (the email used at login)
        user_id: String,
        /// Group resolved at login
        group: String,
    },
}

/// Login state kept in the local stores
pub struct AuthService {
    strategy: Arc<dyn AuthenticationStrategy>,
    manifests: Arc<dyn ManifestSource>,
    local: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    expiry_hours: i64,
    internal_groups: Vec<String>,
}

impl AuthService {
    /// Create a service
    ///
    /// # Arguments
    ///
    /// * `strategy` - credential check
    /// * `manifests` - source of the link manifest
    /// * `local` - durable store for identity keys
    /// * `session` - session-scoped store wiped on logout and expiry
    /// * `expiry_hours` - session lifetime, measured between midnights
    /// * `internal_groups` - groups allowed to see external links
    pub fn new(
        strategy: Arc<dyn AuthenticationStrategy>,
        manifests: Arc<dyn ManifestSource>,
        local: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        expiry_hours: i64,
        internal_groups: Vec<String>,
    ) -> Self {
        Self {
            strategy,
            manifests,
            local,
            session,
            expiry_hours,
            internal_groups,
        }
    }

    /// Log in and record the identity keys
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::Validation`] for a malformed email (before
    /// any request) and [`DifyChatError::Authentication`] when the
    /// passphrase matches no group. Nothing is written on failure.
    pub async fn login(&self, email: &str, passphrase: &str, today: NaiveDate) -> Result<String> {
        let email = email.trim();
        let pattern = Regex::new(EMAIL_PATTERN)
            .map_err(|e| anyhow::anyhow!("Invalid email pattern: {}", e))?;
        if !pattern.is_match(email) {
            return Err(
                DifyChatError::Validation("Please input valid email address".into()).into(),
            );
        }
        if passphrase.is_empty() {
            return Err(DifyChatError::Validation("Password is required".into()).into());
        }

        let Some(group) = self.strategy.authenticate(email, passphrase).await? else {
            tracing::warn!(email, "Login rejected");
            return Err(DifyChatError::Authentication(LOGIN_FAILED.into()).into());
        };

        self.local.set(StorageKey::UserId, email)?;
        self.local.set(StorageKey::UserGroup, &group)?;
        self.local
            .set(StorageKey::LoginDate, &today.format(DATE_FORMAT).to_string())?;
        tracing::info!(email, group = %group, "Logged in");
        Ok(group)
    }

    /// Check the stored login against `today`
    ///
    /// An expired or unreadable login date clears the user id, the login
    /// date and the session scope.
    pub fn check(&self, today: NaiveDate) -> Result<SessionStatus> {
        let user_id = self.local.get(StorageKey::UserId)?;
        let login_date = self.local.get(StorageKey::LoginDate)?;
        let (Some(user_id), Some(login_date)) = (user_id, login_date) else {
            return Ok(SessionStatus::Missing);
        };

        let expired = match NaiveDate::parse_from_str(&login_date, DATE_FORMAT) {
            Ok(date) => (today - date).num_hours() > self.expiry_hours,
            Err(e) => {
                tracing::warn!(login_date = %login_date, "Unreadable login date: {}", e);
                true
            }
        };

        if expired {
            tracing::info!(user_id = %user_id, "Login expired, please login again.");
            self.local.remove(StorageKey::UserId)?;
            self.local.remove(StorageKey::LoginDate)?;
            self.session.clear()?;
            return Ok(SessionStatus::Expired);
        }

        let group = self.local.get(StorageKey::UserGroup)?.unwrap_or_default();
        Ok(SessionStatus::Valid { user_id, group })
    }

    /// Require a valid session
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::AuthExpired`] when the login is missing or
    /// too old.
    pub fn require(&self, today: NaiveDate) -> Result<(String, String)> {
        match self.check(today)? {
            SessionStatus::Valid { user_id, group } => Ok((user_id, group)),
            SessionStatus::Missing => {
                Err(DifyChatError::AuthExpired("Not logged in, please login".into()).into())
            }
            SessionStatus::Expired => Err(DifyChatError::AuthExpired(
                "Login expired, please login again".into(),
            )
            .into()),
        }
    }

    /// Log out
    ///
    /// The user id and group are kept so the login form can be prefilled.
    pub fn logout(&self) -> Result<()> {
        self.local.remove(StorageKey::LoginDate)?;
        self.session.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// External links, offered to internal groups only
    pub async fn external_links(&self, group: &str) -> Result<Vec<ExternalLink>> {
        if !self.internal_groups.iter().any(|g| g == group) {
            return Ok(Vec::new());
        }
        self.manifests.links().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockManifestSource;
    use crate::storage::MemoryStore;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn passcodes(entries: &[(&str, i64)]) -> MockManifestSource {
        let map: Vec<(String, i64)> = entries
            .iter()
            .map(|(g, c)| (g.to_string(), *c))
            .collect();
        let mut mock = MockManifestSource::new();
        mock.expect_passcode_manifest()
            .returning(move || Ok(map.clone()));
        mock
    }

    fn service(manifests: MockManifestSource) -> (AuthService, Arc<MemoryStore>, Arc<MemoryStore>) {
        let manifests: Arc<dyn ManifestSource> = Arc::new(manifests);
        let local = Arc::new(MemoryStore::new());
        let session = Arc::new(MemoryStore::new());
        let service = AuthService::new(
            Arc::new(PassphraseSumStrategy::new(manifests.clone())),
            manifests,
            local.clone(),
            session.clone(),
            24,
            vec!["ADM".into()],
        );
        (service, local, session)
    }

    #[test]
    fn test_passphrase_sum() {
        assert_eq!(passphrase_sum("ab"), 195);
        assert_eq!(passphrase_sum(""), 0);
        assert_eq!(passphrase_sum("é"), 233);
    }

    #[tokio::test]
    async fn test_login_matches_group_and_writes_keys() {
        let (service, local, _) = service(passcodes(&[("teamX", 195), ("teamY", 500)]));

        let group = service
            .login("me@example.com", "ab", day("2024-03-01"))
            .await
            .unwrap();

        assert_eq!(group, "teamX");
        assert_eq!(local.get(StorageKey::UserId).unwrap().as_deref(), Some("me@example.com"));
        assert_eq!(local.get(StorageKey::UserGroup).unwrap().as_deref(), Some("teamX"));
        assert_eq!(local.get(StorageKey::LoginDate).unwrap().as_deref(), Some("2024-03-01"));
    }

    #[tokio::test]
    async fn test_shared_passcode_resolves_to_first_listed_group() {
        let (service, _, _) = service(passcodes(&[("zeta", 195), ("alpha", 195)]));

        let group = service
            .login("me@example.com", "ab", day("2024-03-01"))
            .await
            .unwrap();

        assert_eq!(group, "zeta");
    }

    #[tokio::test]
    async fn test_login_failure_writes_nothing() {
        let (service, local, _) = service(passcodes(&[("teamX", 195)]));

        let err = service
            .login("me@example.com", "zz", day("2024-03-01"))
            .await
            .unwrap_err();

        assert!(matches!(
            crate::error::classify(&err),
            Some(DifyChatError::Authentication(_))
        ));
        assert!(err.to_string().contains(LOGIN_FAILED));
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_email_skips_manifest() {
        let mut mock = MockManifestSource::new();
        mock.expect_passcode_manifest().times(0);
        let (service, local, _) = service(mock);

        assert!(service.login("not-an-email", "ab", day("2024-03-01")).await.is_err());
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_check_expiry_window() {
        let (service, local, session) = service(passcodes(&[("teamX", 195)]));
        service
            .login("me@example.com", "ab", day("2024-03-01"))
            .await
            .unwrap();
        session.set(StorageKey::DebugMode, "true").unwrap();

        assert_eq!(
            service.check(day("2024-03-02")).unwrap(),
            SessionStatus::Valid {
                user_id: "me@example.com".into(),
                group: "teamX".into()
            }
        );

        assert_eq!(service.check(day("2024-03-03")).unwrap(), SessionStatus::Expired);
        assert!(local.get(StorageKey::UserId).unwrap().is_none());
        assert!(local.get(StorageKey::LoginDate).unwrap().is_none());
        assert!(session.is_empty());
        assert_eq!(service.check(day("2024-03-03")).unwrap(), SessionStatus::Missing);
    }

    #[test]
    fn test_require_maps_to_auth_expired() {
        let (service, _, _) = service(MockManifestSource::new());
        let err = service.require(day("2024-03-01")).unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(DifyChatError::AuthExpired(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_removes_login_date() {
        let (service, local, session) = service(passcodes(&[("teamX", 195)]));
        service
            .login("me@example.com", "ab", day("2024-03-01"))
            .await
            .unwrap();
        session.set(StorageKey::DebugMode, "true").unwrap();

        service.logout().unwrap();

        assert!(local.get(StorageKey::LoginDate).unwrap().is_none());
        assert!(session.is_empty());
        assert_eq!(service.check(day("2024-03-01")).unwrap(), SessionStatus::Missing);
    }

    #[tokio::test]
    async fn test_links_only_for_internal_groups() {
        let mut mock = MockManifestSource::new();
        mock.expect_links().times(1).returning(|| {
            Ok(vec![ExternalLink {
                name: "Docs".into(),
                url: "https://docs.example".into(),
            }])
        });
        let (service, _, _) = service(mock);

        assert!(service.external_links("teamX").await.unwrap().is_empty());
        assert_eq!(service.external_links("ADM").await.unwrap().len(), 1);
    }
}
