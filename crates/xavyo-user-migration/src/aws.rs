//! Classification of AWS SDK failures into [`MigrationError`].
//!
//! Only the service error *code* is inspected. Messages and bodies returned
//! by AWS are dropped so nothing upstream-controlled reaches a log line or
//! the caller.

use aws_sdk_sts::error::{ProvideErrorMetadata, SdkError};

use crate::error::{MigrationError, UpstreamFault, UpstreamService};

/// Map any SDK error from STS or Cognito to the migration taxonomy.
pub fn classify_sdk_error<E, R>(service: UpstreamService, err: &SdkError<E, R>) -> MigrationError
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::ServiceError(ctx) => classify_error_code(service, ctx.err().code()),
        SdkError::TimeoutError(_) => MigrationError::upstream(service, UpstreamFault::Timeout),
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            MigrationError::upstream(service, UpstreamFault::Transport)
        }
        _ => MigrationError::upstream(service, UpstreamFault::Unexpected),
    }
}

/// Map a service error code for the given call.
pub fn classify_error_code(service: UpstreamService, code: Option<&str>) -> MigrationError {
    let Some(code) = code else {
        return MigrationError::upstream(service, UpstreamFault::Unexpected);
    };

    match (service, code) {
        (UpstreamService::Authentication | UpstreamService::Lookup, "UserNotFoundException") => {
            MigrationError::NotFound
        }
        (
            UpstreamService::Authentication,
            "NotAuthorizedException"
            | "PasswordResetRequiredException"
            | "UserNotConfirmedException",
        ) => MigrationError::InvalidCredentials,
        (
            _,
            "TooManyRequestsException"
            | "LimitExceededException"
            | "Throttling"
            | "ThrottlingException"
            | "RequestLimitExceeded",
        ) => MigrationError::upstream(service, UpstreamFault::Throttled),
        (
            _,
            "InternalErrorException"
            | "InternalFailure"
            | "ServiceUnavailable"
            | "ServiceUnavailableException",
        ) => MigrationError::upstream(service, UpstreamFault::ServiceFault),
        (
            _,
            "ExpiredToken"
            | "ExpiredTokenException"
            | "UnrecognizedClientException"
            | "InvalidClientTokenId"
            | "InvalidSignatureException"
            | "IncompleteSignature",
        ) => MigrationError::upstream(service, UpstreamFault::CredentialRejected),
        (
            _,
            "AccessDenied"
            | "AccessDeniedException"
            | "NotAuthorizedException"
            | "RegionDisabledException",
        ) => MigrationError::upstream(service, UpstreamFault::AccessDenied),
        _ => MigrationError::upstream(service, UpstreamFault::Unexpected),
    }
}
