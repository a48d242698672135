//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! This module provides concrete implementations of domain repository ports
//! backed by PostgreSQL via the Diesel ORM with async support through
//! `diesel-async` and `bb8` connection pooling.
//!
//! # Architecture
//!
//! The persistence layer follows these principles:
//!
//! - **Thin adapters**: Repository implementations only translate between
//!   Diesel models and domain types. No business logic resides here.
//! - **Internal models**: Diesel row structs (`models.rs`) and schema
//!   definitions (`schema.rs`) are internal implementation details, never
//!   exposed to the domain layer.
//! - **Async-safe pooling**: Connections are managed via `bb8` pools with
//!   proper async integration through `diesel-async`.
//! - **Strongly typed errors**: All database errors are mapped to domain
//!   port error types.
//!
//! # Example
//!
//! ```ignore
//! use gamenight_backend::outbound::persistence::{DbPool, PoolConfig, DieselTokenRepository};
//!
//! let config = PoolConfig::new("postgres://localhost/gamenight");
//! let pool = DbPool::new(config).await?;
//! let repo = DieselTokenRepository::new(pool);
//! ```

mod diesel_analytics_repository;
mod diesel_group_directory;
mod diesel_prompt_repository;
mod diesel_response_repository;
mod diesel_settings_repository;
mod diesel_suggestion_repository;
mod diesel_token_repository;
pub(crate) mod models;
mod pool;
pub(crate) mod schema;

pub use diesel_analytics_repository::DieselAnalyticsRepository;
pub use diesel_group_directory::DieselGroupDirectory;
pub use diesel_prompt_repository::DieselPromptRepository;
pub use diesel_response_repository::DieselResponseRepository;
pub use diesel_settings_repository::DieselSettingsRepository;
pub use diesel_suggestion_repository::DieselSuggestionRepository;
pub use diesel_token_repository::DieselTokenRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
