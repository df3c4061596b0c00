use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::convert::ConvertError;
use crate::application::error::ErrorReport;

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const CONVERSION_FAILED: &str = "conversion_failed";
    pub const CONVERTER_UNAVAILABLE: &str = "converter_unavailable";
    pub const CONVERSION_TIMEOUT: &str = "conversion_timeout";
    pub const INTERNAL: &str = "internal_error";
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub detail: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            code,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, detail)
    }
}

impl From<ConvertError> for ApiError {
    fn from(error: ConvertError) -> Self {
        match error {
            ConvertError::Converter { stderr, .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::CONVERSION_FAILED,
                format!("PDF generation failed: {stderr}"),
            ),
            ConvertError::NotFound(err) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::CONVERTER_UNAVAILABLE,
                format!("converter binary unavailable: {err}"),
            ),
            ConvertError::Timeout { limit_secs } => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                codes::CONVERSION_TIMEOUT,
                format!("conversion exceeded the {limit_secs}s ceiling"),
            ),
            ConvertError::ScratchInit(err) | ConvertError::Io(err) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                err.to_string(),
            ),
            ConvertError::MissingOutput => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                error.to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code.to_string(),
            detail: self.detail.clone(),
        };
        let mut response = (self.status, Json(body)).into_response();
        // Attach a structured report so shared logging middleware can emit rich diagnostics.
        ErrorReport::from_message(
            "infra::http",
            self.status,
            format!("{}: {}", self.code, self.detail),
        )
        .attach(&mut response);
        response
    }
}
