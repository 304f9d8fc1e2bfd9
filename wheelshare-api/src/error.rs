use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use wheelshare_booking::{BookingError, ErrorKind};
use wheelshare_catalog::CatalogError;
use wheelshare_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("authentication failed: {0}")]
    AuthenticationError(String),
    #[error("forbidden: {0}")]
    AuthorizationError(String),
    #[error("invalid request: {0}")]
    ValidationError(String),
    #[error("not found: {0}")]
    NotFoundError(String),
    #[error("conflict: {0}")]
    ConflictError(String),
    #[error("unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    InternalServerError(String),
    #[error(transparent)]
    Booking(#[from] BookingError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            AppError::AuthorizationError(_) => StatusCode::FORBIDDEN,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFoundError(_) => StatusCode::NOT_FOUND,
            AppError::ConflictError(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Booking(err) => kind_status(err.kind()),
        }
    }
}

pub fn kind_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::Exhausted => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Invariant => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::AuthenticationError(msg)
            | AppError::AuthorizationError(msg)
            | AppError::ValidationError(msg)
            | AppError::NotFoundError(msg)
            | AppError::ConflictError(msg) => msg,
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                "Service temporarily unavailable".to_string()
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::Booking(err) => {
                tracing::debug!("Booking request failed: {}", err);
                err.kind().user_message().to_string()
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => AppError::NotFoundError(format!("Listing {} not found", id)),
            CatalogError::Duplicate(id) => AppError::ConflictError(format!("Listing {} already exists", id)),
            CatalogError::Validation(msg) => AppError::ValidationError(msg),
            CatalogError::Unauthorized(msg) => AppError::AuthorizationError(msg),
            CatalogError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::ValidationError(msg),
            CoreError::IdentityError(msg) => AppError::AuthorizationError(msg),
            CoreError::GeocodingError(msg) => AppError::ServiceUnavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_booking_kinds_map_to_statuses() {
        let cases = [
            (BookingError::ListingNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (BookingError::ListingFull(Uuid::nil()), StatusCode::CONFLICT),
            (BookingError::NotOwner(Uuid::nil()), StatusCode::FORBIDDEN),
            (BookingError::CodeGenerationExhausted(8), StatusCode::INTERNAL_SERVER_ERROR),
            (BookingError::Transient("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (BookingError::Invariant("two active".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn test_catalog_errors() {
        assert_eq!(
            AppError::from(CatalogError::Validation("price".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(CatalogError::Unauthorized("owners only".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(CatalogError::Unavailable("db".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
