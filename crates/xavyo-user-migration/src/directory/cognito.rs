//! Legacy directory backed by a Cognito user pool in another account.
//!
//! Clients are built from the caller's assumed-role credential and kept per
//! access key, so warm invocations reuse the connection pool until the role
//! is assumed again. SDK retries are disabled because the bridge owns its
//! retry policy.

use std::fmt;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::config::retry::RetryConfig;
use aws_sdk_cognitoidentityprovider::config::timeout::TimeoutConfig;
use aws_sdk_cognitoidentityprovider::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_cognitoidentityprovider::types::AuthFlowType;
use aws_sdk_cognitoidentityprovider::{Client, Config};
use base64::Engine;
use hmac::{Hmac, Mac};
use moka::future::Cache;
use sha2::Sha256;

use crate::aws::classify_sdk_error;
use crate::credentials::CrossAccountCredential;
use crate::directory::{LegacyDirectory, LegacyProfile};
use crate::error::{MigrationError, MigrationResult, UpstreamService};
use crate::event::Password;

type HmacSha256 = Hmac<Sha256>;

/// One live credential plus the one it replaced.
const MAX_CACHED_CLIENTS: u64 = 4;

/// Compute the Cognito `SECRET_HASH` for an app client with a secret.
///
/// `base64(HMAC-SHA256(client_secret, user_name + client_id))`
pub fn secret_hash(
    client_secret: &str,
    user_name: &str,
    client_id: &str,
) -> MigrationResult<String> {
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|_| MigrationError::Internal("invalid legacy client secret"))?;
    mac.update(user_name.as_bytes());
    mac.update(client_id.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Connection settings for the legacy user pool.
#[derive(Clone)]
pub struct CognitoLegacyDirectory {
    region: String,
    user_pool_id: String,
    client_id: String,
    client_secret: Option<String>,
    call_timeout: Duration,
    /// Clients keyed by the access key id they sign with.
    clients: Cache<String, Client>,
}

impl CognitoLegacyDirectory {
    pub fn new(
        region: impl Into<String>,
        user_pool_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            region: region.into(),
            user_pool_id: user_pool_id.into(),
            client_id: client_id.into(),
            client_secret,
            call_timeout,
            clients: Cache::builder().max_capacity(MAX_CACHED_CLIENTS).build(),
        }
    }

    async fn client_for(&self, credential: &CrossAccountCredential) -> Client {
        self.clients
            .get_with(credential.access_key_id().to_string(), async {
                tracing::debug!(region = %self.region, "Building legacy directory client");
                self.build_client(credential)
            })
            .await
    }

    fn build_client(&self, credential: &CrossAccountCredential) -> Client {
        let credentials = Credentials::new(
            credential.access_key_id(),
            credential.secret_access_key(),
            Some(credential.session_token().to_string()),
            Some(SystemTime::from(credential.expiration())),
            "xavyo-user-migration",
        );

        let config = Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(self.call_timeout)
                    .operation_attempt_timeout(self.call_timeout)
                    .build(),
            )
            .build();

        Client::from_conf(config)
    }

    async fn fetch_profile(
        &self,
        client: &Client,
        user_name: &str,
        service: UpstreamService,
    ) -> MigrationResult<LegacyProfile> {
        let output = client
            .admin_get_user()
            .user_pool_id(&self.user_pool_id)
            .username(user_name)
            .send()
            .await
            .map_err(|e| classify_sdk_error(service, &e))?;

        let attributes = output
            .user_attributes()
            .iter()
            .map(|attr| (attr.name().to_string(), attr.value().unwrap_or_default().to_string()));

        Ok(LegacyProfile::from_attributes(output.username(), attributes)
            .with_enabled(output.enabled())
            .with_user_status(output.user_status().map(|s| s.as_str().to_string())))
    }
}

impl fmt::Debug for CognitoLegacyDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CognitoLegacyDirectory")
            .field("region", &self.region)
            .field("user_pool_id", &self.user_pool_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

#[async_trait]
impl LegacyDirectory for CognitoLegacyDirectory {
    async fn authenticate(
        &self,
        credential: &CrossAccountCredential,
        user_name: &str,
        password: &Password,
    ) -> MigrationResult<LegacyProfile> {
        let client = self.client_for(credential).await;

        let mut request = client
            .admin_initiate_auth()
            .user_pool_id(&self.user_pool_id)
            .client_id(&self.client_id)
            .auth_flow(AuthFlowType::AdminUserPasswordAuth)
            .auth_parameters("USERNAME", user_name)
            .auth_parameters("PASSWORD", password.expose());
        if let Some(secret) = &self.client_secret {
            request = request.auth_parameters(
                "SECRET_HASH",
                secret_hash(secret, user_name, &self.client_id)?,
            );
        }

        let output = request
            .send()
            .await
            .map_err(|e| classify_sdk_error(UpstreamService::Authentication, &e))?;

        // A challenge is only issued once the password has been accepted.
        // Issued tokens are dropped unused.
        if let Some(challenge) = output.challenge_name() {
            tracing::debug!(
                challenge = challenge.as_str(),
                "Legacy directory verified password and returned a challenge"
            );
        }
        drop(output);

        self.fetch_profile(&client, user_name, UpstreamService::Authentication)
            .await
    }

    async fn lookup(
        &self,
        credential: &CrossAccountCredential,
        user_name: &str,
    ) -> MigrationResult<LegacyProfile> {
        let client = self.client_for(credential).await;
        self.fetch_profile(&client, user_name, UpstreamService::Lookup)
            .await
    }

    fn directory_type(&self) -> &'static str {
        "cognito"
    }
}
