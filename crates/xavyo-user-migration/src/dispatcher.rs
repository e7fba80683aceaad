//! Invocation entry point: deadline, response write-back and error surface.

use std::time::{Duration, Instant, SystemTime};

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{MigrationError, MigrationResult, UpstreamFault, UpstreamService};
use crate::event::{MigrationEvent, TriggerKind};
use crate::handler::MigrationHandler;
use crate::redaction::RedactionPolicy;

/// Default time reserved before the invocation deadline.
pub const DEFAULT_DEADLINE_MARGIN: Duration = Duration::from_millis(250);

/// Error returned to the calling directory.
///
/// Carries only one of the fixed client messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CallbackError(&'static str);

impl CallbackError {
    pub fn message(&self) -> &'static str {
        self.0
    }
}

/// Result of one trigger invocation: the outbound event or a client error.
pub type CallbackResult = Result<Value, CallbackError>;

/// Runs the handler for one raw trigger payload.
pub struct Dispatcher {
    handler: MigrationHandler,
    redaction: RedactionPolicy,
    deadline_margin: Duration,
}

impl Dispatcher {
    pub fn new(handler: MigrationHandler, redaction: RedactionPolicy) -> Self {
        Self {
            handler,
            redaction,
            deadline_margin: DEFAULT_DEADLINE_MARGIN,
        }
    }

    #[must_use]
    pub fn with_deadline_margin(mut self, margin: Duration) -> Self {
        self.deadline_margin = margin;
        self
    }

    /// Process one raw event.
    ///
    /// On success the event comes back with `response` replaced and
    /// `request.password` removed. The whole invocation is bounded by
    /// `deadline` minus the configured margin.
    pub async fn dispatch(&self, raw: Value, deadline: Option<SystemTime>) -> CallbackResult {
        let started = Instant::now();
        info!(
            event = %self.redaction.redact_to_string(&raw),
            "migration event received"
        );

        let trigger = raw
            .get("triggerSource")
            .and_then(Value::as_str)
            .and_then(|source| TriggerKind::from_trigger_source(source).ok());
        let user_name = raw
            .get("userName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let result = self.run(&raw, trigger, deadline).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let trigger_name = trigger.map_or("unsupported", |t| t.as_str());

        match result {
            Ok(response) => {
                info!(
                    trigger = trigger_name,
                    user_name = %user_name,
                    outcome = "migrated",
                    elapsed_ms,
                    "migration outcome"
                );
                write_back(raw, response).map_err(|e| CallbackError(e.client_message(trigger)))
            }
            Err(e) => {
                warn!(
                    trigger = trigger_name,
                    user_name = %user_name,
                    outcome = e.error_code(),
                    error = %e,
                    elapsed_ms,
                    "migration outcome"
                );
                Err(CallbackError(e.client_message(trigger)))
            }
        }
    }

    async fn run(
        &self,
        raw: &Value,
        trigger: Option<TriggerKind>,
        deadline: Option<SystemTime>,
    ) -> MigrationResult<Value> {
        let event = MigrationEvent::from_value(raw)?;

        let handled = match self.time_budget(deadline) {
            Some(budget) => tokio::time::timeout(budget, self.handler.handle(&event))
                .await
                .map_err(|_| deadline_exceeded(trigger))?,
            None => self.handler.handle(&event).await,
        };

        let response = handled?;
        serde_json::to_value(&response)
            .map_err(|_| MigrationError::Internal("failed to encode migration response"))
    }

    fn time_budget(&self, deadline: Option<SystemTime>) -> Option<Duration> {
        let deadline = deadline?;
        let remaining = deadline
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        Some(remaining.saturating_sub(self.deadline_margin))
    }
}

fn deadline_exceeded(trigger: Option<TriggerKind>) -> MigrationError {
    match trigger {
        Some(TriggerKind::Authentication) => {
            MigrationError::upstream(UpstreamService::Authentication, UpstreamFault::Timeout)
        }
        Some(TriggerKind::ForgotPassword) => {
            MigrationError::upstream(UpstreamService::Lookup, UpstreamFault::Timeout)
        }
        None => MigrationError::Internal("invocation deadline exceeded"),
    }
}

/// Replace `response` and strip the password from `request`.
fn write_back(mut event: Value, response: Value) -> MigrationResult<Value> {
    let object = event
        .as_object_mut()
        .ok_or(MigrationError::Internal("migration event is not an object"))?;

    if let Some(request) = object.get_mut("request").and_then(Value::as_object_mut) {
        request.remove("password");
    }
    object.insert("response".to_string(), response);
    Ok(event)
}
