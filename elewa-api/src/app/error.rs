use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use elewa_core::{AuthError, FieldError};
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    code: &'static str,
    message: String,
    status: StatusCode,
    fields: Option<Vec<FieldError>>,
}

impl ApiError {
    pub fn new(code: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status,
            message: message.into(),
            fields: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NotFound", StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let unauthorized = |code| ApiError::new(code, StatusCode::UNAUTHORIZED, err.to_string());
        match err {
            AuthError::Validation(ref fields) => ApiError {
                fields: Some(fields.clone()),
                ..ApiError::new("ValidationError", StatusCode::BAD_REQUEST, "validation failed")
            },
            AuthError::DuplicateCredential(_) => {
                ApiError::new("DuplicateCredential", StatusCode::CONFLICT, err.to_string())
            }
            AuthError::InvalidCredentials => ApiError::new(
                "InvalidCredentials",
                StatusCode::UNAUTHORIZED,
                "invalid email or password",
            ),
            AuthError::MissingToken => unauthorized("MissingToken"),
            AuthError::MalformedToken => unauthorized("MalformedToken"),
            AuthError::InvalidSignature => unauthorized("InvalidSignature"),
            AuthError::ExpiredToken => unauthorized("ExpiredToken"),
            AuthError::WrongTokenType => unauthorized("WrongTokenType"),
            AuthError::SupersededToken => unauthorized("SupersededToken"),
            AuthError::UserNotFound(_) => {
                ApiError::new("UserNotFound", StatusCode::NOT_FOUND, "user not found")
            }
            AuthError::Timeout => ApiError::new(
                "Timeout",
                StatusCode::SERVICE_UNAVAILABLE,
                "storage operation timed out, retry the request",
            ),
            AuthError::Storage(ref msg) => {
                tracing::error!(error = %msg, "storage failure");
                ApiError::new(
                    "StorageError",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage failure",
                )
            }
            AuthError::Internal(ref msg) => {
                tracing::error!(error = %msg, "internal failure");
                ApiError::new(
                    "InternalError",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error",
                )
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(
            "ValidationError",
            StatusCode::BAD_REQUEST,
            rejection.body_text(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "code": self.code,
            "message": self.message,
        });
        if let Some(fields) = self.fields {
            body["fields"] = json!(fields);
        }
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elewa_core::CredentialField;

    #[test]
    fn auth_errors_map_to_status_codes() {
        let cases = [
            (AuthError::Validation(vec![]), StatusCode::BAD_REQUEST, "ValidationError"),
            (
                AuthError::DuplicateCredential(vec![CredentialField::Email]),
                StatusCode::CONFLICT,
                "DuplicateCredential",
            ),
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED, "InvalidCredentials"),
            (AuthError::ExpiredToken, StatusCode::UNAUTHORIZED, "ExpiredToken"),
            (AuthError::SupersededToken, StatusCode::UNAUTHORIZED, "SupersededToken"),
            (AuthError::UserNotFound("u1".into()), StatusCode::NOT_FOUND, "UserNotFound"),
            (AuthError::Timeout, StatusCode::SERVICE_UNAVAILABLE, "Timeout"),
            (
                AuthError::Storage("disk full".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "StorageError",
            ),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let api = ApiError::from(AuthError::Storage("/var/data/users/x.json: EIO".into()));
        assert!(!api.message.contains("/var/data"));
    }
}
