//! Cross-account password authentication against the legacy directory.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::credentials::CredentialProvider;
use crate::directory::{LegacyDirectory, LegacyProfile};
use crate::error::{MigrationResult, UpstreamService};
use crate::event::Password;
use crate::resilience::RetryPolicy;

/// Verifies a user's legacy password.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        user_name: &str,
        password: &Password,
    ) -> MigrationResult<LegacyProfile>;
}

/// Assumes the trust role, then authenticates against the legacy directory.
///
/// Only `UpstreamUnavailable` is retried. A rejected credential also drops
/// the cached role credential before the retry.
pub struct CrossAccountAuthenticator {
    credentials: Arc<CredentialProvider>,
    directory: Arc<dyn LegacyDirectory>,
    retry: RetryPolicy,
}

impl CrossAccountAuthenticator {
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
impl Authenticator for CrossAccountAuthenticator {
    #[instrument(skip(self, password), fields(directory = self.directory.directory_type()))]
    async fn authenticate(
        &self,
        user_name: &str,
        password: &Password,
    ) -> MigrationResult<LegacyProfile> {
        let credentials = &self.credentials;
        let directory = &self.directory;

        self.retry
            .execute(UpstreamService::Authentication, move || async move {
                let credential = credentials.credential().await?;
                let result = directory.authenticate(&credential, user_name, password).await;
                if let Err(e) = &result {
                    if e.invalidates_credential() {
                        credentials.invalidate().await;
                    }
                }
                result
            })
            .await
    }
}
