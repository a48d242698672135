//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on domain services behind trait-object repositories and remain
//! testable without I/O.

use std::sync::Arc;

use crate::domain::ports::{TokenAnalyticsRepository, TokenRepository};
use crate::domain::{AvailabilityService, SchedulingOrchestrator, TokenService};

/// Availability service wired over trait-object repositories.
pub type DynAvailabilityService =
    AvailabilityService<dyn TokenRepository, dyn TokenAnalyticsRepository>;
/// Token service wired over trait-object repositories.
pub type DynTokenService = TokenService<dyn TokenRepository, dyn TokenAnalyticsRepository>;
/// Orchestrator wired over trait-object repositories.
pub type DynOrchestrator =
    SchedulingOrchestrator<dyn TokenRepository, dyn TokenAnalyticsRepository>;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub availability: Arc<DynAvailabilityService>,
    pub tokens: Arc<DynTokenService>,
    pub orchestrator: Arc<DynOrchestrator>,
    pub analytics: Arc<dyn TokenAnalyticsRepository>,
}
