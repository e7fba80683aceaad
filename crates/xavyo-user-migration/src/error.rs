//! Migration error taxonomy.
//!
//! Every message is built from a fixed template. Upstream error bodies, the
//! user's password and assumed-role credentials never appear in `Display`
//! output, which is what diagnostics log. Callers of the trigger only ever
//! see [`MigrationError::client_message`].

use std::fmt;

use crate::event::TriggerKind;

/// Caller-visible message for auth-path failures.
pub const MSG_AUTHENTICATION_FAILED: &str = "Authentication failed";
/// Caller-visible message for a forgot-password lookup miss.
pub const MSG_USER_NOT_FOUND: &str = "User not found";
/// Caller-visible message for everything that is not the user's fault.
pub const MSG_MIGRATION_FAILED: &str = "Migration failed";
/// Caller-visible message for trigger sources this bridge does not handle.
pub const MSG_UNSUPPORTED_TRIGGER: &str = "Unsupported trigger source";

/// Which outbound call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamService {
    /// STS `AssumeRole` into the legacy account.
    RoleAssumption,
    /// Legacy directory password authentication.
    Authentication,
    /// Legacy directory administrative user lookup.
    Lookup,
}

impl fmt::Display for UpstreamService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoleAssumption => write!(f, "role assumption"),
            Self::Authentication => write!(f, "legacy authentication"),
            Self::Lookup => write!(f, "legacy lookup"),
        }
    }
}

/// Coarse reason an upstream call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFault {
    /// The local per-attempt timeout elapsed.
    Timeout,
    /// Connection, DNS, TLS or response read failure.
    Transport,
    /// The service asked us to slow down.
    Throttled,
    /// The service reported an internal failure.
    ServiceFault,
    /// The assumed-role credential was expired or not recognized.
    CredentialRejected,
    /// The trust role is not allowed to perform the call.
    AccessDenied,
    /// Any other failure the classifier does not recognize.
    Unexpected,
}

impl fmt::Display for UpstreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Transport => write!(f, "transport failure"),
            Self::Throttled => write!(f, "throttled"),
            Self::ServiceFault => write!(f, "service fault"),
            Self::CredentialRejected => write!(f, "credential rejected"),
            Self::AccessDenied => write!(f, "access denied"),
            Self::Unexpected => write!(f, "unexpected failure"),
        }
    }
}

/// Errors that can terminate a migration invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    #[error("unsupported trigger source '{trigger_source}'")]
    UnsupportedTrigger { trigger_source: String },

    #[error("user not found in legacy directory")]
    NotFound,

    #[error("legacy directory rejected the supplied credentials")]
    InvalidCredentials,

    #[error("legacy profile is missing required attribute '{attribute}'")]
    IncompleteProfile { attribute: &'static str },

    #[error("{service} unavailable: {fault}")]
    UpstreamUnavailable {
        service: UpstreamService,
        fault: UpstreamFault,
    },

    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl MigrationError {
    /// Shorthand for an upstream failure.
    pub fn upstream(service: UpstreamService, fault: UpstreamFault) -> Self {
        Self::UpstreamUnavailable { service, fault }
    }

    /// Whether a local retry may change the result.
    ///
    /// Only upstream unavailability qualifies. Retrying a wrong password or a
    /// missing user is never correct.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }

    /// Whether the failure means the cached role credential must be dropped.
    pub fn invalidates_credential(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable {
                fault: UpstreamFault::CredentialRejected,
                ..
            }
        )
    }

    /// Machine-readable outcome tag used in diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedTrigger { .. } => "unsupported_trigger",
            Self::NotFound => "not_found",
            Self::InvalidCredentials => "invalid_credentials",
            Self::IncompleteProfile { .. } => "incomplete_profile",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Generic message returned to the calling directory.
    ///
    /// On the authentication path a missing user and a wrong password are
    /// indistinguishable so the trigger cannot be used for account
    /// enumeration.
    pub fn client_message(&self, trigger: Option<TriggerKind>) -> &'static str {
        match self {
            Self::InvalidCredentials => MSG_AUTHENTICATION_FAILED,
            Self::NotFound => match trigger {
                Some(TriggerKind::ForgotPassword) => MSG_USER_NOT_FOUND,
                Some(TriggerKind::Authentication) | None => MSG_AUTHENTICATION_FAILED,
            },
            Self::UnsupportedTrigger { .. } => MSG_UNSUPPORTED_TRIGGER,
            Self::IncompleteProfile { .. }
            | Self::UpstreamUnavailable { .. }
            | Self::Internal(_) => MSG_MIGRATION_FAILED,
        }
    }
}

/// Result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;
