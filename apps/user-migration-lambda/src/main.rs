//! Lambda binary for the Cognito user migration trigger.

mod bootstrap;
mod logging;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::Instrument;

use xavyo_user_migration::{Dispatcher, MigrationConfig};

async fn function_handler(
    dispatcher: &Dispatcher,
    event: LambdaEvent<Value>,
) -> Result<Value, Error> {
    let (payload, context) = event.into_parts();
    let deadline: SystemTime = UNIX_EPOCH + Duration::from_millis(context.deadline);
    let span = tracing::info_span!("migration", request_id = %context.request_id);

    dispatcher
        .dispatch(payload, Some(deadline))
        .instrument(span)
        .await
        .map_err(Into::into)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    logging::init_logging(logging::DEFAULT_FILTER);

    let config = MigrationConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });

    let dispatcher = Arc::new(bootstrap::build_dispatcher(&config).await);

    run(service_fn(move |event: LambdaEvent<Value>| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { function_handler(&dispatcher, event).await }
    }))
    .await
}
