//! Wires configuration into a ready [`Dispatcher`].
//!
//! Everything built here lives for the whole execution environment, so the
//! credential cache is shared by every invocation the runtime serves.

use std::sync::Arc;

use aws_config::BehaviorVersion;
use tracing::{info, instrument};

use xavyo_user_migration::{
    CognitoLegacyDirectory, CredentialCache, CredentialProvider, CrossAccountAuthenticator,
    CrossAccountLookup, Dispatcher, LegacyDirectory, MigrationConfig, MigrationHandler,
    StsRoleAssumer,
};

#[instrument(skip(config), name = "migration_bootstrap")]
pub async fn build_dispatcher(config: &MigrationConfig) -> Dispatcher {
    let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let sts = aws_sdk_sts::Client::new(&sdk_config);

    let assumer = Arc::new(StsRoleAssumer::new(
        sts,
        config.legacy_external_id.clone(),
        config.role_session_duration_secs,
    ));

    let mut provider = CredentialProvider::new(
        assumer,
        config.legacy_role_arn.clone(),
        config.role_session_name.clone(),
        config.upstream_timeout,
    );
    if config.credential_cache_enabled {
        provider = provider.with_cache(Arc::new(CredentialCache::new(
            config.credential_refresh_margin,
        )));
    }
    let provider = Arc::new(provider);

    let directory: Arc<dyn LegacyDirectory> = Arc::new(CognitoLegacyDirectory::new(
        config.legacy_region.clone(),
        config.legacy_user_pool_id.clone(),
        config.legacy_client_id.clone(),
        config.legacy_client_secret.clone(),
        config.upstream_timeout,
    ));

    let retry = config.retry_policy();
    let authenticator = Arc::new(CrossAccountAuthenticator::new(
        Arc::clone(&provider),
        Arc::clone(&directory),
        retry.clone(),
    ));
    let lookup = Arc::new(CrossAccountLookup::new(provider, directory, retry));

    let handler = MigrationHandler::new(authenticator, lookup, config.attribute_mapper())
        .with_desired_delivery_mediums(config.desired_delivery_mediums.clone())
        .with_force_alias_creation(config.force_alias_creation);

    info!(
        legacy_region = %config.legacy_region,
        legacy_user_pool_id = %config.legacy_user_pool_id,
        credential_cache = config.credential_cache_enabled,
        max_retries = config.upstream_max_retries,
        "user migration bridge ready"
    );

    Dispatcher::new(handler, config.redaction_policy())
        .with_deadline_margin(config.deadline_safety_margin)
}
