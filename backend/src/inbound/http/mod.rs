//! HTTP inbound adapter exposing REST endpoints.

pub mod admin;
pub mod auth;
pub mod availability;
pub mod error;
pub mod health;
pub mod routes;
pub mod state;
#[cfg(test)]
pub mod test_utils;

pub use error::ApiResult;
