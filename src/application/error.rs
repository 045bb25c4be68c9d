use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{
    application::{auth::AuthError, listing::ListingError, posts::PostError},
    domain::{credentials::CredentialError, error::DomainError},
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Client-facing error: a fixed public message plus an internal report
/// picked up by the response logger.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn unauthorized(source: &'static str) -> Self {
        Self::new(
            source,
            StatusCode::UNAUTHORIZED,
            "Authentication required",
            "Request carried no valid admin session",
        )
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.public_message }));
        let mut response = (self.status, body).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<AuthError> for HttpError {
    fn from(error: AuthError) -> Self {
        const SOURCE: &str = "application::error::auth_error_to_http_error";
        match &error {
            AuthError::InvalidCredentials => HttpError::from_error(
                SOURCE,
                StatusCode::UNAUTHORIZED,
                "Invalid username or password",
                &error,
            ),
            AuthError::Unauthenticated => HttpError::unauthorized(SOURCE),
            AuthError::Credential(inner) => {
                let public_message = match inner {
                    CredentialError::PasswordMismatch => "Passwords do not match",
                    CredentialError::PasswordTooShort => "Password is too short",
                    CredentialError::InvalidPassword => "Invalid password",
                    CredentialError::InvalidUsername => "Invalid username",
                    CredentialError::Kdf(_) => {
                        return HttpError::from_error(
                            SOURCE,
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Internal server error",
                            &error,
                        );
                    }
                };
                HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, public_message, &error)
            }
            AuthError::Repo(_) => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                &error,
            ),
        }
    }
}

impl From<ListingError> for HttpError {
    fn from(error: ListingError) -> Self {
        const SOURCE: &str = "application::error::listing_error_to_http_error";
        match error {
            ListingError::UnknownTag => HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Unknown tag",
                "Tag did not match any known tag",
            ),
            ListingError::UnknownYear => HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Unknown year",
                "Year did not match any archive",
            ),
            ListingError::Repo(err) => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                &err,
            ),
        }
    }
}

impl From<PostError> for HttpError {
    fn from(error: PostError) -> Self {
        const SOURCE: &str = "application::error::post_error_to_http_error";
        match &error {
            PostError::Domain(DomainError::NotFound { .. }) => HttpError::from_error(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Resource not found",
                &error,
            ),
            PostError::Domain(DomainError::Validation { .. }) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "All fields are required",
                &error,
            ),
            PostError::CacheBackendUnavailable { .. } | PostError::Cache(_) => {
                HttpError::from_error(
                    SOURCE,
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Saved, but cached listings may be stale",
                    &error,
                )
            }
            PostError::Repo(_) => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                &error,
            ),
        }
    }
}

/// Process-level failure surfaced by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collected")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn http_error_attaches_report_and_hides_detail() {
        let response = HttpError::new(
            "tests",
            StatusCode::NOT_FOUND,
            "Unknown tag",
            "tag `<script>` is not in the index",
        )
        .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .cloned()
            .expect("report attached");
        assert_eq!(report.messages, vec!["tag `<script>` is not in the index"]);

        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": "Unknown tag" }));
    }

    #[test]
    fn report_walks_the_source_chain() {
        let error = PostError::CacheBackendUnavailable {
            post_id: 3,
            source: crate::cache::CacheError::unavailable("connection reset"),
        };
        let report = ErrorReport::from_error("tests", StatusCode::SERVICE_UNAVAILABLE, &error);
        assert_eq!(report.messages.len(), 2);
        assert!(report.messages[1].contains("connection reset"));
    }

    #[test]
    fn error_statuses() {
        let cases: Vec<(HttpError, StatusCode)> = vec![
            (AuthError::InvalidCredentials.into(), StatusCode::UNAUTHORIZED),
            (AuthError::Unauthenticated.into(), StatusCode::UNAUTHORIZED),
            (
                AuthError::Credential(CredentialError::PasswordTooShort).into(),
                StatusCode::BAD_REQUEST,
            ),
            (ListingError::UnknownTag.into(), StatusCode::NOT_FOUND),
            (ListingError::UnknownYear.into(), StatusCode::NOT_FOUND),
            (
                PostError::Domain(DomainError::not_found("post")).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                PostError::Domain(DomainError::validation("missing")).into(),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected);
        }
    }
}
