pub mod activity;
pub mod health;
pub mod schedule;
pub mod screenshot;

use axum::{http::StatusCode, Json};

use crate::models::ErrorBody;

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn internal_error(msg: &str) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(msg)))
}

pub fn bad_request(msg: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorBody::new(msg)))
}
