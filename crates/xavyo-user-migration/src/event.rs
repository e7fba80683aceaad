//! Cognito user-migration trigger event and response types.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{MigrationError, MigrationResult};

/// Trigger source for a sign-in by a user unknown to the target pool.
pub const TRIGGER_AUTHENTICATION: &str = "UserMigration_Authentication";
/// Trigger source for a forgot-password request by an unknown user.
pub const TRIGGER_FORGOT_PASSWORD: &str = "UserMigration_ForgotPassword";

/// Longest trigger source kept for diagnostics.
const MAX_TRIGGER_SOURCE_LEN: usize = 64;

/// Closed set of trigger kinds the bridge handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Authentication,
    ForgotPassword,
}

impl TriggerKind {
    /// Parse a Cognito `triggerSource`.
    ///
    /// Anything other than the two user-migration sources is rejected with
    /// [`MigrationError::UnsupportedTrigger`].
    pub fn from_trigger_source(source: &str) -> MigrationResult<Self> {
        match source {
            TRIGGER_AUTHENTICATION => Ok(Self::Authentication),
            TRIGGER_FORGOT_PASSWORD => Ok(Self::ForgotPassword),
            other => Err(MigrationError::UnsupportedTrigger {
                trigger_source: other.chars().take(MAX_TRIGGER_SOURCE_LEN).collect(),
            }),
        }
    }

    /// The Cognito trigger source string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => TRIGGER_AUTHENTICATION,
            Self::ForgotPassword => TRIGGER_FORGOT_PASSWORD,
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_trigger_source(s)
    }
}

/// The user's plaintext password from the trigger request.
///
/// Not serializable, redacted in `Debug`, zeroized on drop.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the plaintext for the single outbound authentication call.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// `callerContext` block of a Cognito trigger event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    #[serde(default, rename = "awsSdkVersion")]
    pub aws_sdk_version: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// `request` block of a user-migration trigger event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRequest {
    /// Present on the authentication trigger only.
    #[serde(default)]
    pub password: Option<Password>,
    #[serde(default)]
    pub validation_data: Option<HashMap<String, String>>,
    #[serde(default)]
    pub client_metadata: Option<HashMap<String, String>>,
}

/// Immutable view of an inbound user-migration trigger event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationEvent {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub user_pool_id: Option<String>,
    pub trigger_source: String,
    pub user_name: String,
    #[serde(default)]
    pub caller_context: Option<CallerContext>,
    #[serde(default)]
    pub request: MigrationRequest,
}

impl MigrationEvent {
    /// Parse the raw trigger payload.
    ///
    /// Serde error text is discarded because it can quote payload content.
    pub fn from_value(value: &serde_json::Value) -> MigrationResult<Self> {
        let event = Self::deserialize(value)
            .map_err(|_| MigrationError::Internal("malformed migration event"))?;
        if event.user_name.trim().is_empty() {
            return Err(MigrationError::Internal("migration event has an empty userName"));
        }
        Ok(event)
    }

    /// The password, if the request carried a non-empty one.
    pub fn password(&self) -> Option<&Password> {
        self.request.password.as_ref().filter(|p| !p.is_empty())
    }
}

/// Status the target pool assigns to the materialized user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalUserStatus {
    Confirmed,
}

/// Whether the target pool sends its welcome message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageAction {
    /// The user already has history, so no welcome message.
    Suppress,
}

/// Channel the target pool uses for its welcome or reset message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMedium {
    Sms,
    Email,
}

impl FromStr for DeliveryMedium {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("SMS") {
            Ok(Self::Sms)
        } else if s.eq_ignore_ascii_case("EMAIL") {
            Ok(Self::Email)
        } else {
            Err(())
        }
    }
}

/// `response` block written back into the trigger event on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResponse {
    pub user_attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_user_status: Option<FinalUserStatus>,
    pub message_action: MessageAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_delivery_mediums: Option<Vec<DeliveryMedium>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_alias_creation: Option<bool>,
}
