//! Per-trigger migration logic.
//!
//! The handler reads the inbound event and produces a [`MigrationResponse`].
//! It never mutates the event; writing the response back is the
//! dispatcher's job.

use std::sync::Arc;

use tracing::debug;

use crate::authenticator::Authenticator;
use crate::error::{MigrationError, MigrationResult};
use crate::event::{
    DeliveryMedium, FinalUserStatus, MessageAction, MigrationEvent, MigrationResponse, TriggerKind,
};
use crate::lookup::Lookup;
use crate::mapping::AttributeMapper;

/// Routes a migration event to authentication or lookup.
pub struct MigrationHandler {
    authenticator: Arc<dyn Authenticator>,
    lookup: Arc<dyn Lookup>,
    mapper: AttributeMapper,
    desired_delivery_mediums: Option<Vec<DeliveryMedium>>,
    force_alias_creation: Option<bool>,
}

impl MigrationHandler {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        lookup: Arc<dyn Lookup>,
        mapper: AttributeMapper,
    ) -> Self {
        Self {
            authenticator,
            lookup,
            mapper,
            desired_delivery_mediums: None,
            force_alias_creation: None,
        }
    }

    #[must_use]
    pub fn with_desired_delivery_mediums(mut self, mediums: Option<Vec<DeliveryMedium>>) -> Self {
        self.desired_delivery_mediums = mediums.filter(|m| !m.is_empty());
        self
    }

    /// Emit `forceAliasCreation` in every successful response.
    #[must_use]
    pub fn with_force_alias_creation(mut self, force: Option<bool>) -> Self {
        self.force_alias_creation = force;
        self
    }

    /// Handle one event.
    ///
    /// Unsupported triggers fail before any upstream call. A request
    /// without a password on the authentication path is rejected as
    /// `InvalidCredentials` without contacting the legacy directory.
    pub async fn handle(&self, event: &MigrationEvent) -> MigrationResult<MigrationResponse> {
        match TriggerKind::from_trigger_source(&event.trigger_source)? {
            TriggerKind::Authentication => self.migrate_on_sign_in(event).await,
            TriggerKind::ForgotPassword => self.migrate_on_forgot_password(event).await,
        }
    }

    async fn migrate_on_sign_in(
        &self,
        event: &MigrationEvent,
    ) -> MigrationResult<MigrationResponse> {
        let password = event.password().ok_or_else(|| {
            debug!("Authentication trigger carried no password");
            MigrationError::InvalidCredentials
        })?;

        let profile = self
            .authenticator
            .authenticate(&event.user_name, password)
            .await?;
        let attributes = self.mapper.map(&profile)?;

        Ok(MigrationResponse {
            user_attributes: attributes.into_user_attributes(),
            final_user_status: Some(FinalUserStatus::Confirmed),
            message_action: MessageAction::Suppress,
            desired_delivery_mediums: self.desired_delivery_mediums.clone(),
            force_alias_creation: self.force_alias_creation,
        })
    }

    async fn migrate_on_forgot_password(
        &self,
        event: &MigrationEvent,
    ) -> MigrationResult<MigrationResponse> {
        let profile = self.lookup.lookup(&event.user_name).await?;
        let attributes = self.mapper.map(&profile)?;

        // No final status: the user must finish the reset flow first.
        Ok(MigrationResponse {
            user_attributes: attributes.into_user_attributes(),
            final_user_status: None,
            message_action: MessageAction::Suppress,
            desired_delivery_mediums: self.desired_delivery_mediums.clone(),
            force_alias_creation: self.force_alias_creation,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::directory::LegacyProfile;
    use crate::event::Password;

    /// Authenticator accepting exactly one password per known user.
    pub(crate) struct FakeAuthenticator {
        pub calls: AtomicUsize,
        pub users: Vec<(&'static str, &'static str, LegacyProfile)>,
    }

    #[async_trait]
    impl Authenticator for FakeAuthenticator {
        async fn authenticate(
            &self,
            user_name: &str,
            password: &Password,
        ) -> MigrationResult<LegacyProfile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (_, expected, profile) = self
                .users
                .iter()
                .find(|(name, _, _)| *name == user_name)
                .ok_or(MigrationError::NotFound)?;
            if password.expose() != *expected {
                return Err(MigrationError::InvalidCredentials);
            }
            Ok(profile.clone())
        }
    }

    pub(crate) struct FakeLookup {
        pub calls: AtomicUsize,
        pub users: Vec<LegacyProfile>,
    }

    #[async_trait]
    impl Lookup for FakeLookup {
        async fn lookup(&self, user_name: &str) -> MigrationResult<LegacyProfile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.users
                .iter()
                .find(|p| p.username == user_name)
                .cloned()
                .ok_or(MigrationError::NotFound)
        }
    }

    pub(crate) fn alice() -> LegacyProfile {
        LegacyProfile::from_attributes(
            "alice",
            [
                ("email", "alice@x.com"),
                ("email_verified", "true"),
                ("given_name", "Alice"),
            ],
        )
    }

    pub(crate) fn fakes() -> (Arc<FakeAuthenticator>, Arc<FakeLookup>) {
        (
            Arc::new(FakeAuthenticator {
                calls: AtomicUsize::new(0),
                users: vec![("alice", "correct", alice())],
            }),
            Arc::new(FakeLookup {
                calls: AtomicUsize::new(0),
                users: vec![alice()],
            }),
        )
    }

    fn event(trigger: &str, user: &str, password: Option<&str>) -> MigrationEvent {
        let mut request = json!({});
        if let Some(p) = password {
            request["password"] = json!(p);
        }
        MigrationEvent::from_value(&json!({
            "version": "1",
            "triggerSource": trigger,
            "userName": user,
            "request": request,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_sign_in_confirms_and_suppresses() {
        let (auth, lookup) = fakes();
        let handler =
            MigrationHandler::new(auth.clone(), lookup.clone(), AttributeMapper::default());

        let response = handler
            .handle(&event("UserMigration_Authentication", "alice", Some("correct")))
            .await
            .unwrap();

        assert_eq!(response.user_attributes["email"], "alice@x.com");
        assert_eq!(response.user_attributes["email_verified"], "true");
        assert_eq!(response.user_attributes["given_name"], "Alice");
        assert_eq!(response.final_user_status, Some(FinalUserStatus::Confirmed));
        assert_eq!(response.message_action, MessageAction::Suppress);
        assert_eq!(response.force_alias_creation, None);
        assert_eq!(response.desired_delivery_mediums, None);
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credentials() {
        let (auth, lookup) = fakes();
        let handler = MigrationHandler::new(auth, lookup, AttributeMapper::default());

        let err = handler
            .handle(&event("UserMigration_Authentication", "alice", Some("wrong")))
            .await
            .unwrap_err();
        assert_eq!(err, MigrationError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_missing_password_never_reaches_directory() {
        let (auth, lookup) = fakes();
        let handler = MigrationHandler::new(auth.clone(), lookup, AttributeMapper::default());

        for password in [None, Some("")] {
            let err = handler
                .handle(&event("UserMigration_Authentication", "alice", password))
                .await
                .unwrap_err();
            assert_eq!(err, MigrationError::InvalidCredentials);
        }
        assert_eq!(auth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_forgot_password_leaves_status_unset() {
        let (auth, lookup) = fakes();
        let handler =
            MigrationHandler::new(auth.clone(), lookup.clone(), AttributeMapper::default())
                .with_force_alias_creation(Some(false))
                .with_desired_delivery_mediums(Some(vec![DeliveryMedium::Email]));

        let response = handler
            .handle(&event("UserMigration_ForgotPassword", "alice", None))
            .await
            .unwrap();

        assert_eq!(response.final_user_status, None);
        assert_eq!(response.message_action, MessageAction::Suppress);
        assert_eq!(response.force_alias_creation, Some(false));
        assert_eq!(
            response.desired_delivery_mediums,
            Some(vec![DeliveryMedium::Email])
        );
        assert_eq!(response.user_attributes["email"], "alice@x.com");
        assert_eq!(auth.calls.load(Ordering::SeqCst), 0);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_user() {
        let (auth, lookup) = fakes();
        let handler = MigrationHandler::new(auth, lookup, AttributeMapper::default());

        let err = handler
            .handle(&event("UserMigration_ForgotPassword", "bob", None))
            .await
            .unwrap_err();
        assert_eq!(err, MigrationError::NotFound);
    }

    #[tokio::test]
    async fn test_unsupported_trigger_makes_no_calls() {
        let (auth, lookup) = fakes();
        let handler =
            MigrationHandler::new(auth.clone(), lookup.clone(), AttributeMapper::default());

        let err = handler
            .handle(&event("PreSignUp_SignUp", "alice", Some("correct")))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::UnsupportedTrigger { .. }));
        assert_eq!(auth.calls.load(Ordering::SeqCst), 0);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_profile_without_email_fails_mapping() {
        let (_, lookup) = fakes();
        let auth = Arc::new(FakeAuthenticator {
            calls: AtomicUsize::new(0),
            users: vec![(
                "carol",
                "pw",
                LegacyProfile::from_attributes("carol", [("given_name", "Carol")]),
            )],
        });
        let handler = MigrationHandler::new(auth, lookup, AttributeMapper::default());

        let err = handler
            .handle(&event("UserMigration_Authentication", "carol", Some("pw")))
            .await
            .unwrap_err();
        assert_eq!(err, MigrationError::IncompleteProfile { attribute: "email" });
    }
}
