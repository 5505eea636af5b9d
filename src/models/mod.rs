//! Data models for the status page API.
//!
//! Field names match the dashboard's JSON contract (snake_case).

mod component;
mod incident;
mod service;
mod status;
mod tag;

pub use component::*;
pub use incident::*;
pub use service::*;
pub use status::*;
pub use tag::*;
