use arena_core::ContestStatus;
use time::OffsetDateTime;
use uuid::Uuid;

use super::Contest;
use crate::infra::db::{format_timestamp, DBConnection, DatabaseWriteError};

const CONTEST_COLUMNS: &str = "id, name, description, task_instructions, contest_type, price,
    prize_money, deadline, status, participation_limit, participants_count, creator_id,
    winner_user_id, created_at, updated_at";

/// Result of the guarded winner write
#[derive(Debug, Clone, PartialEq)]
pub enum WinnerOutcome {
    Declared(Contest),
    AlreadyDeclared,
    WinnerMissing,
    ContestMissing,
}

#[derive(Debug, Clone)]
pub struct ContestStore {
    db_connection: DBConnection,
}

impl ContestStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn add_contest(&self, contest: Contest) -> Result<Contest, DatabaseWriteError> {
        let deadline = format_timestamp(contest.deadline)?;
        let created_at = format_timestamp(contest.created_at)?;
        let updated_at = format_timestamp(contest.updated_at)?;

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query_as::<_, Contest>(&format!(
                    "INSERT INTO contests (
                        id, name, description, task_instructions, contest_type, price,
                        prize_money, deadline, status, participation_limit, participants_count,
                        creator_id, winner_user_id, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, NULL, ?, ?)
                    RETURNING {}",
                    CONTEST_COLUMNS
                ))
                .bind(contest.id.to_string())
                .bind(contest.name)
                .bind(contest.description)
                .bind(contest.task_instructions)
                .bind(contest.contest_type)
                .bind(contest.price)
                .bind(contest.prize_money)
                .bind(deadline)
                .bind(contest.status.as_str())
                .bind(contest.participation_limit)
                .bind(contest.creator_id)
                .bind(created_at)
                .bind(updated_at)
                .fetch_one(&pool)
                .await
            })
            .await
    }

    pub async fn get_contest(&self, contest_id: Uuid) -> Result<Option<Contest>, sqlx::Error> {
        sqlx::query_as::<_, Contest>(&format!(
            "SELECT {} FROM contests WHERE id = ?",
            CONTEST_COLUMNS
        ))
        .bind(contest_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await
    }

    /// Writes new details and drops the contest back to `pending`. Returns `None` when the
    /// contest meanwhile gained more participants than the new limit allows.
    pub async fn update_details(
        &self,
        updated: Contest,
        now: OffsetDateTime,
    ) -> Result<Option<Contest>, DatabaseWriteError> {
        let deadline = format_timestamp(updated.deadline)?;
        let now = format_timestamp(now)?;

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query_as::<_, Contest>(&format!(
                    "UPDATE contests
                     SET name = ?,
                         description = ?,
                         task_instructions = ?,
                         contest_type = ?,
                         price = ?,
                         prize_money = ?,
                         deadline = ?,
                         participation_limit = ?,
                         status = 'pending',
                         updated_at = ?
                     WHERE id = ?
                       AND (? = 0 OR participants_count <= ?)
                     RETURNING {}",
                    CONTEST_COLUMNS
                ))
                .bind(updated.name)
                .bind(updated.description)
                .bind(updated.task_instructions)
                .bind(updated.contest_type)
                .bind(updated.price)
                .bind(updated.prize_money)
                .bind(deadline)
                .bind(updated.participation_limit)
                .bind(now)
                .bind(updated.id.to_string())
                .bind(updated.participation_limit)
                .bind(updated.participation_limit)
                .fetch_optional(&pool)
                .await
            })
            .await
    }

    pub async fn set_status(
        &self,
        contest_id: Uuid,
        status: ContestStatus,
        now: OffsetDateTime,
    ) -> Result<Option<Contest>, DatabaseWriteError> {
        let now = format_timestamp(now)?;

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query_as::<_, Contest>(&format!(
                    "UPDATE contests SET status = ?, updated_at = ? WHERE id = ? RETURNING {}",
                    CONTEST_COLUMNS
                ))
                .bind(status.as_str())
                .bind(now)
                .bind(contest_id.to_string())
                .fetch_optional(&pool)
                .await
            })
            .await
    }

    /// Sets the winner once and bumps the winner's counter in the same transaction.
    /// The `winner_user_id IS NULL` guard makes a second declaration a no-op.
    /// The counter is bumped first so an unknown winner never reaches the foreign key.
    pub async fn declare_winner(
        &self,
        contest_id: Uuid,
        winner_user_id: String,
        now: OffsetDateTime,
    ) -> Result<WinnerOutcome, DatabaseWriteError> {
        let now = format_timestamp(now)?;

        self.db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;

                let current: Option<Option<String>> =
                    sqlx::query_scalar("SELECT winner_user_id FROM contests WHERE id = ?")
                        .bind(contest_id.to_string())
                        .fetch_optional(&mut *tx)
                        .await?;
                match current {
                    None => {
                        tx.rollback().await?;
                        return Ok(WinnerOutcome::ContestMissing);
                    }
                    Some(Some(_)) => {
                        tx.rollback().await?;
                        return Ok(WinnerOutcome::AlreadyDeclared);
                    }
                    Some(None) => {}
                }

                let bumped = sqlx::query(
                    "UPDATE users SET wins_count = wins_count + 1, updated_at = ? WHERE id = ?",
                )
                .bind(&now)
                .bind(&winner_user_id)
                .execute(&mut *tx)
                .await?;
                if bumped.rows_affected() != 1 {
                    tx.rollback().await?;
                    return Ok(WinnerOutcome::WinnerMissing);
                }

                let declared = sqlx::query_as::<_, Contest>(&format!(
                    "UPDATE contests
                     SET winner_user_id = ?, updated_at = ?
                     WHERE id = ? AND winner_user_id IS NULL
                     RETURNING {}",
                    CONTEST_COLUMNS
                ))
                .bind(&winner_user_id)
                .bind(&now)
                .bind(contest_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
                let Some(contest) = declared else {
                    tx.rollback().await?;
                    return Ok(WinnerOutcome::AlreadyDeclared);
                };

                tx.commit().await?;
                Ok(WinnerOutcome::Declared(contest))
            })
            .await
    }
}
