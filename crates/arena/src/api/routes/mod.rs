mod contests;
mod participations;
mod payments;
mod system;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde_json::json;

use crate::domain::Error;

pub use contests::*;
pub use participations::*;
pub use payments::*;
pub use system::*;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            // Conflicts keep their own variant but clients expect a 400
            Error::Validation(msg) | Error::Conflict(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": msg }),
            ),
            Error::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                json!({ "success": false, "message": msg }),
            ),
            Error::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                json!({ "success": false, "message": msg }),
            ),
            Error::Upstream(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "success": false,
                    "message": "Payment gateway request failed",
                    "error": detail,
                }),
            ),
            _ => {
                error!("Unhandled error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "message": "internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
