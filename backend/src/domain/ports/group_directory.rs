//! Port abstraction over the excluded relational store's group membership.
//!
//! The scheduling core never owns users or groups; it asks this port who the
//! active members of a group are and how to address them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ids::{GroupId, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by group directory adapters.
    pub enum GroupDirectoryError {
        /// Directory connection could not be established.
        Connection { message: String } => "group directory connection failed: {message}",
        /// Lookup failed during execution.
        Query { message: String } => "group directory query failed: {message}",
        /// The referenced group does not exist (permanent; jobs skip, not retry).
        GroupMissing { message: String } => "group not found: {message}",
    }
}

/// One addressable member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: UserId,
    pub display_name: String,
    pub email: String,
    pub is_admin: bool,
}

/// Read-only port into group membership.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// The group's display name, for email subjects.
    async fn group_name(&self, group_id: &GroupId) -> Result<String, GroupDirectoryError>;

    /// Active members of the group.
    async fn active_members(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<GroupMember>, GroupDirectoryError>;
}

/// Fixture directory with no groups.
#[derive(Debug, Default)]
pub struct FixtureGroupDirectory;

#[async_trait]
impl GroupDirectory for FixtureGroupDirectory {
    async fn group_name(&self, group_id: &GroupId) -> Result<String, GroupDirectoryError> {
        Err(GroupDirectoryError::group_missing(group_id.to_string()))
    }

    async fn active_members(
        &self,
        _group_id: &GroupId,
    ) -> Result<Vec<GroupMember>, GroupDirectoryError> {
        Ok(Vec::new())
    }
}
