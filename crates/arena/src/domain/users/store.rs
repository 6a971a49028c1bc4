use arena_core::Role;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::OffsetDateTime;

use super::Identity;
use crate::infra::db::{
    format_timestamp, parse_enum, parse_required_datetime, DBConnection, DatabaseWriteError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub wins_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for User {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            role: parse_enum(row, "role")?,
            wins_count: row.try_get("wins_count")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UserStore {
    db_connection: DBConnection,
}

impl UserStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    /// Mirrors the caller's identity into the users table. Rows are only rewritten
    /// when email, name or role changed, so repeated calls leave `updated_at` alone.
    pub async fn sync_identity(&self, identity: &Identity) -> Result<(), DatabaseWriteError> {
        let now = format_timestamp(OffsetDateTime::now_utc())?;
        let id = identity.user_id.clone();
        let name = identity.display_name();
        let email = identity.email.clone();
        let role = identity.role.as_str();

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query(
                    "INSERT INTO users (id, name, email, role, wins_count, created_at, updated_at)
                     VALUES (?, ?, ?, ?, 0, ?, ?)
                     ON CONFLICT (id) DO UPDATE SET
                        name = excluded.name,
                        email = excluded.email,
                        role = excluded.role,
                        updated_at = excluded.updated_at
                     WHERE users.name != excluded.name
                        OR users.email != excluded.email
                        OR users.role != excluded.role",
                )
                .bind(id)
                .bind(name)
                .bind(email)
                .bind(role)
                .bind(&now)
                .bind(&now)
                .execute(&pool)
                .await
            })
            .await?;

        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, email, role, wins_count, created_at, updated_at
             FROM users
             WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.db_connection.read())
        .await
    }
}
