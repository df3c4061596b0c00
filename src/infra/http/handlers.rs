//! Conversion and health handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::ApiState;
use super::error::{ApiError, codes};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
const PDF_CONTENT_DISPOSITION: &str = "attachment; filename=\"output.pdf\"";

#[derive(Debug, Deserialize)]
pub struct ConversionRequest {
    pub content: String,
}

pub async fn convert_pdf(
    State(state): State<ApiState>,
    payload: Result<Json<ConversionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let pdf = state.converter.render_pdf(&request.content).await?;

    let headers = [
        (header::CONTENT_TYPE, PDF_CONTENT_TYPE),
        (header::CONTENT_DISPOSITION, PDF_CONTENT_DISPOSITION),
    ];
    Ok((headers, pdf).into_response())
}

pub async fn healthz(State(state): State<ApiState>) -> Response {
    if state.converter.probe().await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::CONVERTER_UNAVAILABLE,
            "converter probe failed",
        )
        .into_response()
    }
}
