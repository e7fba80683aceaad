//! Cross-account role assumption and the process-wide credential cache.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use zeroize::Zeroize;

use crate::aws::classify_sdk_error;
use crate::error::{MigrationError, MigrationResult, UpstreamFault, UpstreamService};

/// Short-lived credential obtained by assuming the legacy account's trust role.
#[derive(Clone)]
pub struct CrossAccountCredential {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: DateTime<Utc>,
}

impl CrossAccountCredential {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expiration,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    /// Lifetime left at `now`, zero once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expiration - now).to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Debug for CrossAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossAccountCredential")
            .field("access_key_id", &"[REDACTED]")
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl Drop for CrossAccountCredential {
    fn drop(&mut self) {
        self.secret_access_key.zeroize();
        self.session_token.zeroize();
    }
}

/// Something that can assume a role and hand back temporary credentials.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> MigrationResult<CrossAccountCredential>;
}

/// [`RoleAssumer`] backed by STS `AssumeRole`.
#[derive(Debug, Clone)]
pub struct StsRoleAssumer {
    client: aws_sdk_sts::Client,
    external_id: Option<String>,
    duration_secs: i32,
}

impl StsRoleAssumer {
    pub fn new(
        client: aws_sdk_sts::Client,
        external_id: Option<String>,
        duration_secs: i32,
    ) -> Self {
        Self {
            client,
            external_id,
            duration_secs,
        }
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> MigrationResult<CrossAccountCredential> {
        let mut request = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .duration_seconds(self.duration_secs);
        if let Some(external_id) = &self.external_id {
            request = request.external_id(external_id);
        }

        let output = request
            .send()
            .await
            .map_err(|e| classify_sdk_error(UpstreamService::RoleAssumption, &e))?;

        let credentials = output.credentials().ok_or_else(|| {
            MigrationError::upstream(UpstreamService::RoleAssumption, UpstreamFault::Unexpected)
        })?;

        let expires = credentials.expiration();
        let expiration = DateTime::from_timestamp(expires.secs(), expires.subsec_nanos())
            .ok_or_else(|| {
                MigrationError::upstream(UpstreamService::RoleAssumption, UpstreamFault::Unexpected)
            })?;

        tracing::debug!(
            role_arn = %role_arn,
            expiration = %expiration,
            "Assumed cross-account role"
        );

        Ok(CrossAccountCredential::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            credentials.session_token(),
            expiration,
        ))
    }
}

/// Expires cache entries `refresh_margin` before the credential itself.
struct CredentialExpiry {
    refresh_margin: Duration,
}

impl Expiry<String, Arc<CrossAccountCredential>> for CredentialExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<CrossAccountCredential>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(
            value
                .remaining_at(Utc::now())
                .saturating_sub(self.refresh_margin),
        )
    }
}

/// Process-wide credential cache keyed by role ARN.
///
/// Concurrent misses for the same key share a single assumption.
pub struct CredentialCache {
    entries: Cache<String, Arc<CrossAccountCredential>>,
}

impl CredentialCache {
    #[must_use]
    pub fn new(refresh_margin: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(64)
            .expire_after(CredentialExpiry { refresh_margin })
            .build();
        Self { entries }
    }

    /// Return the cached credential for `role_arn`, or run `assume` once.
    pub async fn get_or_assume<F>(
        &self,
        role_arn: &str,
        assume: F,
    ) -> MigrationResult<Arc<CrossAccountCredential>>
    where
        F: std::future::Future<Output = MigrationResult<CrossAccountCredential>>,
    {
        if let Some(cached) = self.entries.get(role_arn).await {
            if !cached.is_expired_at(Utc::now()) {
                tracing::debug!(role_arn = %role_arn, "Credential cache hit");
                return Ok(cached);
            }
            self.entries.invalidate(role_arn).await;
        }

        tracing::debug!(role_arn = %role_arn, "Credential cache miss, assuming role");

        self.entries
            .try_get_with(role_arn.to_string(), async move { assume.await.map(Arc::new) })
            .await
            .map_err(|e| (*e).clone())
    }

    pub async fn invalidate(&self, role_arn: &str) {
        self.entries.invalidate(role_arn).await;
    }
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("entry_count", &self.entries.entry_count())
            .finish()
    }
}

/// Hands out credentials for the configured trust role.
pub struct CredentialProvider {
    assumer: Arc<dyn RoleAssumer>,
    role_arn: String,
    session_name: String,
    cache: Option<Arc<CredentialCache>>,
    timeout: Duration,
}

impl CredentialProvider {
    pub fn new(
        assumer: Arc<dyn RoleAssumer>,
        role_arn: impl Into<String>,
        session_name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            assumer,
            role_arn: role_arn.into(),
            session_name: session_name.into(),
            cache: None,
            timeout,
        }
    }

    /// Share `cache` across providers and invocations.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CredentialCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// A credential valid right now.
    pub async fn credential(&self) -> MigrationResult<Arc<CrossAccountCredential>> {
        let assume = async {
            match tokio::time::timeout(
                self.timeout,
                self.assumer.assume_role(&self.role_arn, &self.session_name),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(MigrationError::upstream(
                    UpstreamService::RoleAssumption,
                    UpstreamFault::Timeout,
                )),
            }
        };

        match &self.cache {
            Some(cache) => cache.get_or_assume(&self.role_arn, assume).await,
            None => assume.await.map(Arc::new),
        }
    }

    /// Drop the cached credential so the next call assumes the role again.
    pub async fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            tracing::debug!(role_arn = %self.role_arn, "Invalidating cached credential");
            cache.invalidate(&self.role_arn).await;
        }
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("role_arn", &self.role_arn)
            .field("session_name", &self.session_name)
            .field("cached", &self.cache.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake assumer issuing credentials valid for `lifetime`.
    pub(crate) struct FakeAssumer {
        pub calls: AtomicUsize,
        pub lifetime: chrono::Duration,
        pub delay: Duration,
        pub fail_with: Option<MigrationError>,
    }

    pub(crate) const FAKE_SECRET_ACCESS_KEY: &str = "fakeSecretAccessKeyWJalrXUtn";
    pub(crate) const FAKE_SESSION_TOKEN: &str = "fakeSessionTokenFwoGZXIvYXdz";

    impl FakeAssumer {
        pub(crate) fn valid_for(lifetime: chrono::Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                lifetime,
                delay: Duration::ZERO,
                fail_with: None,
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RoleAssumer for FakeAssumer {
        async fn assume_role(
            &self,
            _role_arn: &str,
            _session_name: &str,
        ) -> MigrationResult<CrossAccountCredential> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok(CrossAccountCredential::new(
                format!("AKIAFAKE{n}"),
                FAKE_SECRET_ACCESS_KEY,
                FAKE_SESSION_TOKEN,
                Utc::now() + self.lifetime,
            ))
        }
    }

    const ROLE: &str = "arn:aws:iam::111111111111:role/legacy-migration";

    fn uncached(assumer: Arc<FakeAssumer>) -> CredentialProvider {
        CredentialProvider::new(assumer, ROLE, "test", Duration::from_secs(1))
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let cred =
            CrossAccountCredential::new("AKIAEXAMPLE", "wJalrXUtnFEMI", "FwoGZX", Utc::now());
        let debug = format!("{cred:?}");
        assert!(!debug.contains("AKIAEXAMPLE"));
        assert!(!debug.contains("wJalrXUtnFEMI"));
        assert!(!debug.contains("FwoGZX"));
    }

    #[test]
    fn test_credential_expiry() {
        let now = Utc::now();
        let cred = CrossAccountCredential::new("a", "b", "c", now + chrono::Duration::seconds(30));
        assert!(!cred.is_expired_at(now));
        assert!(cred.is_expired_at(now + chrono::Duration::seconds(30)));
        assert_eq!(
            cred.remaining_at(now + chrono::Duration::seconds(40)),
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn test_provider_with_cache_reuses_credential() {
        let assumer = Arc::new(FakeAssumer::valid_for(chrono::Duration::minutes(15)));
        let cache = Arc::new(CredentialCache::new(Duration::from_secs(60)));
        let provider = uncached(assumer.clone()).with_cache(cache);

        let first = provider.credential().await.unwrap();
        let second = provider.credential().await.unwrap();

        assert_eq!(assumer.calls(), 1);
        assert_eq!(first.access_key_id(), second.access_key_id());
    }

    #[tokio::test]
    async fn test_provider_without_cache_assumes_every_call() {
        let assumer = Arc::new(FakeAssumer::valid_for(chrono::Duration::minutes(15)));
        let provider = uncached(assumer.clone());

        provider.credential().await.unwrap();
        provider.credential().await.unwrap();
        assert_eq!(assumer.calls(), 2);
    }

    #[tokio::test]
    async fn test_credentials_inside_refresh_margin_are_not_reused() {
        // Lifetime shorter than the margin: the entry expires on insert.
        let assumer = Arc::new(FakeAssumer::valid_for(chrono::Duration::seconds(30)));
        let cache = Arc::new(CredentialCache::new(Duration::from_secs(60)));
        let provider = uncached(assumer.clone()).with_cache(cache);

        provider.credential().await.unwrap();
        provider.credential().await.unwrap();
        assert_eq!(assumer.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_assumption() {
        let mut assumer = FakeAssumer::valid_for(chrono::Duration::minutes(15));
        assumer.delay = Duration::from_millis(50);
        let assumer = Arc::new(assumer);
        let cache = Arc::new(CredentialCache::new(Duration::from_secs(60)));
        let provider = uncached(assumer.clone()).with_cache(cache);

        let (a, b, c) = tokio::join!(
            provider.credential(),
            provider.credential(),
            provider.credential()
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(assumer.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_assumption() {
        let assumer = Arc::new(FakeAssumer::valid_for(chrono::Duration::minutes(15)));
        let cache = Arc::new(CredentialCache::new(Duration::from_secs(60)));
        let provider = uncached(assumer.clone()).with_cache(cache);

        provider.credential().await.unwrap();
        provider.invalidate().await;
        provider.credential().await.unwrap();
        assert_eq!(assumer.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_assumption_is_not_cached() {
        let mut assumer = FakeAssumer::valid_for(chrono::Duration::minutes(15));
        assumer.fail_with = Some(MigrationError::upstream(
            UpstreamService::RoleAssumption,
            UpstreamFault::AccessDenied,
        ));
        let assumer = Arc::new(assumer);
        let cache = Arc::new(CredentialCache::new(Duration::from_secs(60)));
        let provider = uncached(assumer.clone()).with_cache(cache.clone());

        let err = provider.credential().await.unwrap_err();
        assert_eq!(err.error_code(), "upstream_unavailable");
        assert!(provider.credential().await.is_err());
        assert_eq!(assumer.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_assumption_times_out() {
        let mut assumer = FakeAssumer::valid_for(chrono::Duration::minutes(15));
        assumer.delay = Duration::from_secs(30);
        let provider =
            CredentialProvider::new(Arc::new(assumer), ROLE, "test", Duration::from_secs(2));

        let err = provider.credential().await.unwrap_err();
        assert_eq!(
            err,
            MigrationError::upstream(UpstreamService::RoleAssumption, UpstreamFault::Timeout)
        );
    }
}
