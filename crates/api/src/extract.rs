//! Extractors whose rejections use the API error body.

use axum::extract::FromRequest;

use crate::error::ApiError;

/// `axum::Json` with malformed bodies reported as `BAD_REQUEST`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
