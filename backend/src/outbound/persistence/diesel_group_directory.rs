//! PostgreSQL-backed `GroupDirectory` implementation using Diesel.
//!
//! Groups and their membership live in the wider relational store; this
//! adapter exposes the read-only slice the scheduling core needs.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ids::{GroupId, UserId};
use crate::domain::ports::{GroupDirectory, GroupDirectoryError, GroupMember};

use super::models::GroupMemberRow;
use super::pool::{DbPool, PoolError};
use super::schema::{group_members, groups};

/// Diesel-backed implementation of the `GroupDirectory` port.
#[derive(Clone)]
pub struct DieselGroupDirectory {
    pool: DbPool,
}

impl DieselGroupDirectory {
    /// Create a directory over the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> GroupDirectoryError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            GroupDirectoryError::connection(message)
        }
    }
}

fn map_diesel_error(error: diesel::result::Error) -> GroupDirectoryError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        other => debug!(
            error_type = %std::any::type_name_of_val(other),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            GroupDirectoryError::connection("database connection error")
        }
        _ => GroupDirectoryError::query("database error"),
    }
}

fn row_to_member(row: GroupMemberRow) -> GroupMember {
    GroupMember {
        user_id: UserId::from_uuid(row.user_id),
        display_name: row.display_name,
        email: row.email,
        is_admin: row.is_admin,
    }
}

#[async_trait]
impl GroupDirectory for DieselGroupDirectory {
    async fn group_name(&self, group_id: &GroupId) -> Result<String, GroupDirectoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let name: Option<String> = groups::table
            .filter(groups::id.eq(group_id.as_uuid()))
            .select(groups::name)
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        name.ok_or_else(|| GroupDirectoryError::group_missing(group_id.to_string()))
    }

    async fn active_members(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<GroupMember>, GroupDirectoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<GroupMemberRow> = group_members::table
            .filter(group_members::group_id.eq(group_id.as_uuid()))
            .filter(group_members::active.eq(true))
            .order(group_members::display_name.asc())
            .select(GroupMemberRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(rows.into_iter().map(row_to_member).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let err = map_pool_error(PoolError::checkout("timed out"));
        assert!(matches!(err, GroupDirectoryError::Connection { .. }));
    }

    #[rstest]
    fn member_rows_map_onto_the_port_shape() {
        let row = GroupMemberRow {
            group_id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::new_v4(),
            display_name: "Ada".to_owned(),
            email: "ada@example.com".to_owned(),
            is_admin: true,
            active: true,
        };
        let member = row_to_member(row);
        assert_eq!(member.display_name, "Ada");
        assert!(member.is_admin);
    }
}
