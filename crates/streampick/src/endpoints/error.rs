use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sentry::integrations::anyhow::capture_anyhow;
use serde::{Deserialize, Serialize};

use streampick_service::error::{ResolutionFailure, ResolveError};

#[derive(Debug)]
pub struct ResponseError {
    status: StatusCode,
    err: anyhow::Error,
}

impl ResponseError {
    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ResolutionFailure> for ResponseError {
    fn from(failure: ResolutionFailure) -> Self {
        let status = match failure.source {
            ResolveError::UnsupportedType(_) => StatusCode::BAD_REQUEST,
            ResolveError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            ResolveError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ResolveError::Upstream(_) | ResolveError::Malformed(_) => StatusCode::BAD_GATEWAY,
            ResolveError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            err: failure.into(),
        }
    }
}

impl From<anyhow::Error> for ResponseError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err,
        }
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            capture_anyhow(&self.err);
        }
        let mut response = Json(ApiErrorResponse::from(self.err)).into_response();
        *response.status_mut() = self.status;
        response
    }
}

/// An error response from an api.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct ApiErrorResponse {
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causes: Option<Vec<String>>,
}

impl From<anyhow::Error> for ApiErrorResponse {
    fn from(err: anyhow::Error) -> Self {
        let mut chain = err.chain().map(|err| err.to_string());
        let detail = chain.next();
        let causes: Vec<_> = chain.collect();
        let causes = if causes.is_empty() {
            None
        } else {
            Some(causes)
        };

        ApiErrorResponse { detail, causes }
    }
}
