use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::event::DeliveryMedium;
use crate::mapping::AttributeMapper;
use crate::redaction::RedactionPolicy;
use crate::resilience::RetryPolicy;

const MIN_SESSION_DURATION_SECS: i32 = 900;
const MAX_SESSION_DURATION_SECS: i32 = 43_200;
const MAX_UPSTREAM_RETRIES: u32 = 3;

/// Configuration for the user migration trigger.
#[derive(Clone)]
pub struct MigrationConfig {
    /// Trust role in the legacy account.
    pub legacy_role_arn: String,

    /// Legacy user pool id (`<region>_<id>`).
    pub legacy_user_pool_id: String,

    /// App client used for administrative authentication.
    pub legacy_client_id: String,

    /// App client secret. When set, every auth request carries `SECRET_HASH`.
    pub legacy_client_secret: Option<String>,

    /// Region of the legacy pool. Defaults to the pool id prefix.
    pub legacy_region: String,

    /// STS external id required by the trust policy, if any.
    pub legacy_external_id: Option<String>,

    pub role_session_name: String,

    /// STS session duration (900..=43200).
    pub role_session_duration_secs: i32,

    /// Whether assumed-role credentials are reused across invocations.
    pub credential_cache_enabled: bool,

    /// How long before expiry a cached credential is refreshed.
    pub credential_refresh_margin: Duration,

    /// Timeout for each upstream call. One attempt may make several.
    pub upstream_timeout: Duration,

    /// Retries on transient upstream failures (0..=3).
    pub upstream_max_retries: u32,

    pub upstream_retry_backoff: Duration,

    /// Attribute allow-list copied to the target pool.
    pub migrated_attributes: Option<Vec<String>>,

    /// Extra field names or dotted paths to redact from logged events.
    pub redacted_fields: Vec<String>,

    /// Time reserved before the invocation deadline.
    pub deadline_safety_margin: Duration,

    /// Value for `response.desiredDeliveryMediums`, omitted when unset.
    pub desired_delivery_mediums: Option<Vec<DeliveryMedium>>,

    /// Value for `response.forceAliasCreation`, omitted when unset.
    pub force_alias_creation: Option<bool>,
}

impl MigrationConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let required = |key: &str| {
            reader(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.into()))
        };
        let optional = |key: &str| {
            reader(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let legacy_role_arn = required("LEGACY_ROLE_ARN")?;
        if !legacy_role_arn.starts_with("arn:") {
            return Err(ConfigError::InvalidValue(
                "LEGACY_ROLE_ARN".into(),
                "expected an IAM role ARN".into(),
            ));
        }

        let legacy_user_pool_id = required("LEGACY_USER_POOL_ID")?;
        let legacy_client_id = required("LEGACY_CLIENT_ID")?;
        let legacy_client_secret = optional("LEGACY_CLIENT_SECRET");

        let legacy_region = match optional("LEGACY_REGION") {
            Some(region) => region,
            None => region_from_pool_id(&legacy_user_pool_id).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "LEGACY_USER_POOL_ID".into(),
                    "expected <region>_<id>".into(),
                )
            })?,
        };

        let legacy_external_id = optional("LEGACY_EXTERNAL_ID");

        let role_session_name =
            optional("ROLE_SESSION_NAME").unwrap_or_else(|| "xavyo-user-migration".to_string());

        let role_session_duration_secs =
            parse_var(&reader, "ROLE_SESSION_DURATION_SECS", MIN_SESSION_DURATION_SECS)?;
        if !(MIN_SESSION_DURATION_SECS..=MAX_SESSION_DURATION_SECS)
            .contains(&role_session_duration_secs)
        {
            return Err(ConfigError::InvalidValue(
                "ROLE_SESSION_DURATION_SECS".into(),
                format!(
                    "must be between {MIN_SESSION_DURATION_SECS} and {MAX_SESSION_DURATION_SECS}"
                ),
            ));
        }

        let credential_cache_enabled = parse_var(&reader, "CREDENTIAL_CACHE_ENABLED", true)?;

        let credential_refresh_margin =
            parse_var(&reader, "CREDENTIAL_REFRESH_MARGIN_SECS", 60).map(Duration::from_secs)?;

        let upstream_timeout =
            parse_var(&reader, "UPSTREAM_TIMEOUT_MS", 2000).map(Duration::from_millis)?;
        if upstream_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "UPSTREAM_TIMEOUT_MS".into(),
                "must be positive".into(),
            ));
        }

        let upstream_max_retries: u32 = parse_var(&reader, "UPSTREAM_MAX_RETRIES", 1)?;
        if upstream_max_retries > MAX_UPSTREAM_RETRIES {
            return Err(ConfigError::InvalidValue(
                "UPSTREAM_MAX_RETRIES".into(),
                format!("must be at most {MAX_UPSTREAM_RETRIES}"),
            ));
        }

        let upstream_retry_backoff =
            parse_var(&reader, "UPSTREAM_RETRY_BACKOFF_MS", 100).map(Duration::from_millis)?;

        let migrated_attributes = optional("MIGRATED_ATTRIBUTES").map(|v| split_list(&v));
        let redacted_fields = optional("REDACTED_FIELDS")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        let deadline_safety_margin =
            parse_var(&reader, "DEADLINE_SAFETY_MARGIN_MS", 250).map(Duration::from_millis)?;

        let desired_delivery_mediums = optional("DESIRED_DELIVERY_MEDIUMS")
            .map(|v| {
                split_list(&v)
                    .iter()
                    .map(|m| {
                        m.parse::<DeliveryMedium>().map_err(|()| {
                            ConfigError::InvalidValue(
                                "DESIRED_DELIVERY_MEDIUMS".into(),
                                "expected EMAIL or SMS".into(),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        let force_alias_creation = optional("FORCE_ALIAS_CREATION")
            .map(|v| {
                v.parse::<bool>().map_err(|e| {
                    ConfigError::InvalidValue("FORCE_ALIAS_CREATION".into(), e.to_string())
                })
            })
            .transpose()?;

        Ok(Self {
            legacy_role_arn,
            legacy_user_pool_id,
            legacy_client_id,
            legacy_client_secret,
            legacy_region,
            legacy_external_id,
            role_session_name,
            role_session_duration_secs,
            credential_cache_enabled,
            credential_refresh_margin,
            upstream_timeout,
            upstream_max_retries,
            upstream_retry_backoff,
            migrated_attributes,
            redacted_fields,
            deadline_safety_margin,
            desired_delivery_mediums,
            force_alias_creation,
        })
    }

    /// Retry policy whose attempt guard covers every call of one attempt.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.upstream_max_retries,
            initial_delay: self.upstream_retry_backoff,
            ..RetryPolicy::default()
        }
        .with_call_timeout(self.upstream_timeout)
    }

    pub fn attribute_mapper(&self) -> AttributeMapper {
        match &self.migrated_attributes {
            Some(allowed) => AttributeMapper::new(allowed),
            None => AttributeMapper::default(),
        }
    }

    /// Built-in secret fields plus `REDACTED_FIELDS`.
    pub fn redaction_policy(&self) -> RedactionPolicy {
        RedactionPolicy::default().with_fields(&self.redacted_fields)
    }
}

impl fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("legacy_role_arn", &self.legacy_role_arn)
            .field("legacy_user_pool_id", &self.legacy_user_pool_id)
            .field("legacy_client_id", &self.legacy_client_id)
            .field(
                "legacy_client_secret",
                &self.legacy_client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("legacy_region", &self.legacy_region)
            .field(
                "legacy_external_id",
                &self.legacy_external_id.as_ref().map(|_| "[REDACTED]"),
            )
            .field("role_session_name", &self.role_session_name)
            .field("role_session_duration_secs", &self.role_session_duration_secs)
            .field("credential_cache_enabled", &self.credential_cache_enabled)
            .field("credential_refresh_margin", &self.credential_refresh_margin)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("upstream_max_retries", &self.upstream_max_retries)
            .field("upstream_retry_backoff", &self.upstream_retry_backoff)
            .field("migrated_attributes", &self.migrated_attributes)
            .field("redacted_fields", &self.redacted_fields)
            .field("deadline_safety_margin", &self.deadline_safety_margin)
            .field("desired_delivery_mediums", &self.desired_delivery_mediums)
            .field("force_alias_creation", &self.force_alias_creation)
            .finish()
    }
}

fn parse_var<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match reader(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `eu-west-1_AbCdEf` -> `eu-west-1`
fn region_from_pool_id(pool_id: &str) -> Option<String> {
    pool_id
        .split_once('_')
        .map(|(region, _)| region)
        .filter(|region| !region.is_empty())
        .map(str::to_string)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
