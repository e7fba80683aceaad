//! Legacy profile → target pool attribute mapping.
//!
//! `email` and `email_verified` are always produced. Every other attribute
//! is copied unchanged only if it is on the allow-list. Attributes the
//! target pool owns (`sub`, `identities`, `cognito:*`) are never copied even
//! if configured.

use std::collections::{BTreeMap, BTreeSet};

use crate::directory::LegacyProfile;
use crate::error::{MigrationError, MigrationResult};

/// Attributes migrated when no allow-list is configured.
pub const DEFAULT_MIGRATED_ATTRIBUTES: &[&str] = &[
    "name",
    "given_name",
    "family_name",
    "middle_name",
    "nickname",
    "preferred_username",
    "phone_number",
    "phone_number_verified",
    "locale",
    "zoneinfo",
    "birthdate",
    "gender",
    "address",
    "picture",
    "profile",
    "website",
];

const RESERVED_ATTRIBUTES: &[&str] = &["sub", "email", "email_verified", "identities"];
const RESERVED_PREFIX: &str = "cognito:";

fn is_reserved(name: &str) -> bool {
    RESERVED_ATTRIBUTES.contains(&name) || name.starts_with(RESERVED_PREFIX)
}

/// Attribute set handed to the target pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAttributes {
    pub email: String,
    pub email_verified: bool,
    /// Allow-listed attributes, values unchanged.
    pub extra: BTreeMap<String, String>,
}

impl TargetAttributes {
    /// Flatten into Cognito `userAttributes`.
    pub fn into_user_attributes(self) -> BTreeMap<String, String> {
        let mut attributes = self.extra;
        attributes.insert("email".to_string(), self.email);
        attributes.insert(
            "email_verified".to_string(),
            self.email_verified.to_string(),
        );
        attributes
    }
}

/// Maps legacy profiles using an attribute allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMapper {
    allowed: BTreeSet<String>,
}

impl Default for AttributeMapper {
    fn default() -> Self {
        Self::new(DEFAULT_MIGRATED_ATTRIBUTES.iter().copied())
    }
}

impl AttributeMapper {
    /// Build a mapper from allow-listed attribute names.
    ///
    /// Blank and reserved names are dropped.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty() && !is_reserved(s))
            .collect();
        Self { allowed }
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowed.contains(name)
    }

    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    /// Map a profile, failing with `IncompleteProfile` when it has no email.
    pub fn map(&self, profile: &LegacyProfile) -> MigrationResult<TargetAttributes> {
        let email = profile
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(MigrationError::IncompleteProfile { attribute: "email" })?;

        let extra = profile
            .raw_attributes
            .iter()
            .filter(|(name, _)| self.is_allowed(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(TargetAttributes {
            email: email.to_string(),
            email_verified: profile.email_verified,
            extra,
        })
    }
}
