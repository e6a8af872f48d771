use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Server misconfigured: {0}")]
    ServerMisconfigured(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("Backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(e) => AppError::Unauthorized(anyhow::anyhow!(e)),
            AuthError::InvalidToken(e) => AppError::Unauthorized(anyhow::anyhow!(e)),
            AuthError::Forbidden(e) => AppError::Forbidden(anyhow::anyhow!(e)),
            AuthError::ServerMisconfigured(e) => AppError::ServerMisconfigured(e),
            AuthError::NotFound(e) => AppError::NotFound(anyhow::anyhow!(e)),
            AuthError::Conflict(e) => AppError::Conflict(anyhow::anyhow!(e)),
            AuthError::UpstreamFailure(e) => AppError::BadGateway(e),
            AuthError::Backend(e) => AppError::InternalError(e),
        }
    }
}
