//! Port abstraction for group prompt settings.
//!
//! Settings are mutated only by group admins through the excluded CRUD layer;
//! this core reads them.

use async_trait::async_trait;

use crate::domain::ids::{GroupId, SettingsId};
use crate::domain::prompt::GroupPromptSettings;

use super::define_port_error;

define_port_error! {
    /// Errors raised by settings repository adapters.
    pub enum SettingsRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "settings repository connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } => "settings repository query failed: {message}",
    }
}

/// Read-only port for per-group orchestration settings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Look up a settings row by id.
    async fn find_by_id(
        &self,
        id: &SettingsId,
    ) -> Result<Option<GroupPromptSettings>, SettingsRepositoryError>;

    /// Look up the settings row for a group (unique per group).
    async fn find_for_group(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<GroupPromptSettings>, SettingsRepositoryError>;

    /// All active settings rows, for cadence planning.
    async fn list_active(&self) -> Result<Vec<GroupPromptSettings>, SettingsRepositoryError>;
}

/// Fixture that reports no configured groups.
#[derive(Debug, Default)]
pub struct FixtureSettingsRepository;

#[async_trait]
impl SettingsRepository for FixtureSettingsRepository {
    async fn find_by_id(
        &self,
        _id: &SettingsId,
    ) -> Result<Option<GroupPromptSettings>, SettingsRepositoryError> {
        Ok(None)
    }

    async fn find_for_group(
        &self,
        _group_id: &GroupId,
    ) -> Result<Option<GroupPromptSettings>, SettingsRepositoryError> {
        Ok(None)
    }

    async fn list_active(&self) -> Result<Vec<GroupPromptSettings>, SettingsRepositoryError> {
        Ok(Vec::new())
    }
}
