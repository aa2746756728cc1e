//! HTTP error mapping
//!
//! The single place where domain errors become status codes. Handlers
//! return `ApiResult<T>` and never touch `StatusCode` directly.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use kpath_domain::Error;

/// Result alias for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// An error ready to leave the process as an HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
    /// Rate-limit budget, echoed in X-RateLimit headers on 429
    pub rate_limit: Option<u32>,
}

impl ApiError {
    pub fn unauthenticated() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody {
                error: "unauthenticated",
                message: "Could not validate credentials".to_string(),
                correlation_id: None,
            },
            rate_limit: None,
        }
    }

    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: ErrorBody {
                error: "forbidden",
                message: message.into(),
                correlation_id: None,
            },
            rate_limit: None,
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody {
                error: "not_found",
                message: message.into(),
                correlation_id: None,
            },
            rate_limit: None,
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorBody {
                error: "validation_error",
                message: message.into(),
                correlation_id: None,
            },
            rate_limit: None,
        }
    }

    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "malformed_request",
                message: message.into(),
                correlation_id: None,
            },
            rate_limit: None,
        }
    }

    pub fn rate_limited(limit: u32) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: ErrorBody {
                error: "rate_limit_exceeded",
                message: format!("Rate limit exceeded. Limit: {}/hour", limit),
                correlation_id: None,
            },
            rate_limit: Some(limit),
        }
    }

    pub fn deadline_exceeded() -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            body: ErrorBody {
                error: "deadline_exceeded",
                message: "Request deadline exceeded".to_string(),
                correlation_id: None,
            },
            rate_limit: None,
        }
    }

    fn internal(source: &dyn std::fmt::Display) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        error!(correlation_id, "Internal error: {}", source);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                error: "internal_error",
                message: "An internal error occurred".to_string(),
                correlation_id: Some(correlation_id),
            },
            rate_limit: None,
        }
    }

    fn service_unavailable<S: Into<String>>(message: S) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: ErrorBody {
                error: "index_unavailable",
                message: message.into(),
                correlation_id: None,
            },
            rate_limit: None,
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        match error {
            Error::Authentication { .. } => Self::unauthenticated(),
            Error::Authorization { message } => Self::forbidden(message),
            Error::RateLimited { limit } => Self::rate_limited(limit),
            Error::Validation { message } | Error::InvalidArgument { message } => {
                Self::validation(message)
            }
            Error::NotFound { resource } => Self::not_found(format!("{} not found", resource)),
            Error::IndexUnavailable { message } => Self::service_unavailable(message),
            Error::DeadlineExceeded => Self::deadline_exceeded(),
            other => Self::internal(&other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(&self.body)).into_response();

        if self.status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        if let Some(limit) = self.rate_limit {
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
                headers.insert("X-RateLimit-Limit", value);
            }
            headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
        }
        response
    }
}
