//! Cognito user-migration trigger bridging a legacy user pool in another account.
//!
//! Handles `UserMigration_Authentication` and `UserMigration_ForgotPassword`:
//! the legacy pool is reached through an assumed cross-account role and the
//! user's profile comes back as the target pool's `response` block.

pub mod authenticator;
pub mod aws;
pub mod config;
pub mod credentials;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handler;
pub mod lookup;
pub mod mapping;
pub mod redaction;
pub mod resilience;

pub use authenticator::{Authenticator, CrossAccountAuthenticator};
pub use config::{ConfigError, MigrationConfig};
pub use credentials::{
    CredentialCache, CredentialProvider, CrossAccountCredential, RoleAssumer, StsRoleAssumer,
};
pub use directory::{CognitoLegacyDirectory, LegacyDirectory, LegacyProfile};
pub use dispatcher::{CallbackError, CallbackResult, Dispatcher};
pub use error::{MigrationError, MigrationResult, UpstreamFault, UpstreamService};
pub use event::{DeliveryMedium, MigrationEvent, MigrationResponse, Password, TriggerKind};
pub use handler::MigrationHandler;
pub use lookup::{CrossAccountLookup, Lookup};
pub use mapping::{AttributeMapper, TargetAttributes};
pub use redaction::{FieldRule, RedactionPolicy};
pub use resilience::RetryPolicy;
