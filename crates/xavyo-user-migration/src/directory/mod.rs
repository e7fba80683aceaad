//! Legacy identity directory abstraction.
//!
//! A [`LegacyDirectory`] is reached only through its authentication and
//! administrative lookup APIs, always with a credential for the
//! cross-account trust role supplied by the caller.

pub mod cognito;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::credentials::CrossAccountCredential;
use crate::error::MigrationResult;
use crate::event::Password;

pub use cognito::CognitoLegacyDirectory;

/// Profile of a user as stored by the legacy directory.
///
/// Produced per call and never cached across invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyProfile {
    pub username: String,
    pub email: Option<String>,
    pub email_verified: bool,
    /// Whether the legacy account is enabled.
    pub enabled: bool,
    /// Legacy account status (e.g. `CONFIRMED`), for diagnostics.
    pub user_status: Option<String>,
    pub raw_attributes: BTreeMap<String, String>,
}

impl LegacyProfile {
    /// Build a profile from raw directory attributes.
    ///
    /// `email` and `email_verified` are lifted out of the attribute set;
    /// `email_verified` only counts as verified when it reads `true`.
    pub fn from_attributes<I, K, V>(username: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let raw_attributes: BTreeMap<String, String> = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let email = raw_attributes
            .get("email")
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        let email_verified = raw_attributes
            .get("email_verified")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        Self {
            username: username.into(),
            email,
            email_verified,
            enabled: true,
            user_status: None,
            raw_attributes,
        }
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_user_status(mut self, status: Option<String>) -> Self {
        self.user_status = status;
        self
    }
}

/// The legacy directory's authentication and lookup APIs.
#[async_trait]
pub trait LegacyDirectory: Send + Sync {
    /// Verify `password` for `user_name` and return the user's profile.
    ///
    /// Errors: `InvalidCredentials`, `NotFound`, `UpstreamUnavailable`.
    async fn authenticate(
        &self,
        credential: &CrossAccountCredential,
        user_name: &str,
        password: &Password,
    ) -> MigrationResult<LegacyProfile>;

    /// Fetch the profile for `user_name` without a password.
    ///
    /// Errors: `NotFound`, `UpstreamUnavailable`.
    async fn lookup(
        &self,
        credential: &CrossAccountCredential,
        user_name: &str,
    ) -> MigrationResult<LegacyProfile>;

    /// Directory type name for logging.
    fn directory_type(&self) -> &'static str;
}
