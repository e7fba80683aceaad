//! Password-less legacy user lookup for the forgot-password flow.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::credentials::CredentialProvider;
use crate::directory::{LegacyDirectory, LegacyProfile};
use crate::error::{MigrationError, MigrationResult, UpstreamService};
use crate::resilience::RetryPolicy;

/// Resolves a user's legacy profile without a password.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, user_name: &str) -> MigrationResult<LegacyProfile>;
}

/// Administrative lookup through the cross-account trust role.
///
/// A disabled legacy account is reported as `NotFound`.
pub struct CrossAccountLookup {
    credentials: Arc<CredentialProvider>,
    directory: Arc<dyn LegacyDirectory>,
    retry: RetryPolicy,
}

impl CrossAccountLookup {
    pub fn new(
        credentials: Arc<CredentialProvider>,
        directory: Arc<dyn LegacyDirectory>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            credentials,
            directory,
            retry,
        }
    }
}

#[async_trait]
impl Lookup for CrossAccountLookup {
    #[instrument(skip(self), fields(directory = self.directory.directory_type()))]
    async fn lookup(&self, user_name: &str) -> MigrationResult<LegacyProfile> {
        let credentials = &self.credentials;
        let directory = &self.directory;

        let profile = self
            .retry
            .execute(UpstreamService::Lookup, move || async move {
                let credential = credentials.credential().await?;
                let result = directory.lookup(&credential, user_name).await;
                if let Err(e) = &result {
                    if e.invalidates_credential() {
                        credentials.invalidate().await;
                    }
                }
                result
            })
            .await?;

        if !profile.enabled {
            debug!(user_status = ?profile.user_status, "Legacy account is disabled");
            return Err(MigrationError::NotFound);
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::authenticator::tests::{fast_retry, provider, ScriptedDirectory};
    use crate::credentials::tests::FakeAssumer;
    use crate::error::UpstreamFault;

    fn bob() -> LegacyProfile {
        LegacyProfile::from_attributes("bob", [("email", "bob@x.com"), ("email_verified", "true")])
    }

    #[tokio::test]
    async fn test_lookup_returns_profile() {
        let assumer = Arc::new(FakeAssumer::valid_for(chrono::Duration::minutes(15)));
        let directory = Arc::new(ScriptedDirectory::new(vec![Ok(bob())]));
        let lookup = CrossAccountLookup::new(provider(assumer), directory.clone(), fast_retry());

        let profile = lookup.lookup("bob").await.unwrap();
        assert_eq!(profile.email.as_deref(), Some("bob@x.com"));
        assert_eq!(directory.lookup_calls.load(Ordering::SeqCst), 1);
        assert_eq!(directory.auth_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_user_is_not_retried() {
        let assumer = Arc::new(FakeAssumer::valid_for(chrono::Duration::minutes(15)));
        let directory = Arc::new(ScriptedDirectory::new(vec![Err(MigrationError::NotFound)]));
        let lookup = CrossAccountLookup::new(provider(assumer), directory.clone(), fast_retry());

        assert_eq!(lookup.lookup("bob").await.unwrap_err(), MigrationError::NotFound);
        assert_eq!(directory.lookup_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_account_is_not_found() {
        let assumer = Arc::new(FakeAssumer::valid_for(chrono::Duration::minutes(15)));
        let directory = Arc::new(ScriptedDirectory::new(vec![Ok(bob().with_enabled(false))]));
        let lookup = CrossAccountLookup::new(provider(assumer), directory, fast_retry());

        assert_eq!(lookup.lookup("bob").await.unwrap_err(), MigrationError::NotFound);
    }

    #[tokio::test]
    async fn test_throttling_is_retried_once() {
        let throttled =
            MigrationError::upstream(UpstreamService::Lookup, UpstreamFault::Throttled);
        let assumer = Arc::new(FakeAssumer::valid_for(chrono::Duration::minutes(15)));
        let directory = Arc::new(ScriptedDirectory::new(vec![
            Err(throttled.clone()),
            Err(throttled.clone()),
        ]));
        let lookup =
            CrossAccountLookup::new(provider(assumer.clone()), directory.clone(), fast_retry());

        assert_eq!(lookup.lookup("bob").await.unwrap_err(), throttled);
        assert_eq!(directory.lookup_calls.load(Ordering::SeqCst), 2);
        // The credential survives throttling.
        assert_eq!(assumer.calls(), 1);
    }
}
