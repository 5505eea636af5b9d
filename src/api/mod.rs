//! REST API module.
//!
//! Contains all API routes and handlers following the dashboard contract.

mod components;
mod health;
mod incidents;
mod services;
mod tags;

pub use components::*;
pub use health::*;
pub use incidents::*;
pub use services::*;
pub use tags::*;

use axum::{
    extract::FromRequest,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<T, AppError>;

/// JSON request body whose decoding failures are reported as `AppError::BadRequest`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// A freshly created entity, answered with 201.
pub struct Created<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self.0)).into_response()
    }
}

/// Parse a path identifier. Anything that is not a UUID cannot name an entity.
fn parse_id(raw: &str, entity: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("{} {} not found", entity, raw)))
}
