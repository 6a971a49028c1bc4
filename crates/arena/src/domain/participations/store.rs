use time::OffsetDateTime;
use uuid::Uuid;

use super::Participation;
use crate::infra::db::{format_timestamp, is_unique_violation, DBConnection, DatabaseWriteError};

const PARTICIPATION_COLUMNS: &str = "id, contest_id, user_id, user_name, user_email, payment_id,
    transaction_id, payment_status, submission_link, submission_text, created_at, updated_at";

#[derive(Debug, Clone, PartialEq)]
pub struct NewParticipation {
    pub contest_id: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub payment_id: Uuid,
    pub transaction_id: Option<String>,
    pub submission_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdmitOutcome {
    Admitted(Participation),
    /// The (contest, user) pair already has a row
    AlreadyJoined,
    /// The conditional counter increment found no free slot
    LimitReached,
}

#[derive(Debug, Clone)]
pub struct ParticipationStore {
    db_connection: DBConnection,
}

impl ParticipationStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn get_participation(
        &self,
        participation_id: Uuid,
    ) -> Result<Option<Participation>, sqlx::Error> {
        sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM participations WHERE id = ?",
            PARTICIPATION_COLUMNS
        ))
        .bind(participation_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await
    }

    pub async fn find_participation(
        &self,
        contest_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Participation>, sqlx::Error> {
        sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM participations WHERE contest_id = ? AND user_id = ?",
            PARTICIPATION_COLUMNS
        ))
        .bind(contest_id.to_string())
        .bind(user_id)
        .fetch_optional(self.db_connection.read())
        .await
    }

    /// Every submission sent to a contest, newest first
    pub async fn list_for_contest(
        &self,
        contest_id: Uuid,
    ) -> Result<Vec<Participation>, sqlx::Error> {
        sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM participations WHERE contest_id = ? ORDER BY created_at DESC, id DESC",
            PARTICIPATION_COLUMNS
        ))
        .bind(contest_id.to_string())
        .fetch_all(self.db_connection.read())
        .await
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Participation>, sqlx::Error> {
        sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM participations WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            PARTICIPATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.db_connection.read())
        .await
    }

    /// Inserts the participation and claims a slot in one transaction. The unique
    /// (contest_id, user_id) constraint decides races between duplicate joins, and the
    /// guarded increment decides races for the last slot; either loser rolls back.
    pub async fn admit(
        &self,
        entry: NewParticipation,
        now: OffsetDateTime,
    ) -> Result<AdmitOutcome, DatabaseWriteError> {
        let now = format_timestamp(now)?;

        self.db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;

                let inserted = sqlx::query_as::<_, Participation>(&format!(
                    "INSERT INTO participations (
                        id, contest_id, user_id, user_name, user_email, payment_id,
                        transaction_id, payment_status, submission_link, submission_text,
                        created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, 'paid', ?, NULL, ?, ?)
                    RETURNING {}",
                    PARTICIPATION_COLUMNS
                ))
                .bind(Uuid::now_v7().to_string())
                .bind(entry.contest_id.to_string())
                .bind(&entry.user_id)
                .bind(&entry.user_name)
                .bind(&entry.user_email)
                .bind(entry.payment_id.to_string())
                .bind(&entry.transaction_id)
                .bind(&entry.submission_link)
                .bind(&now)
                .bind(&now)
                .fetch_one(&mut *tx)
                .await;

                let participation = match inserted {
                    Ok(participation) => participation,
                    Err(e) if is_unique_violation(&e) => {
                        tx.rollback().await?;
                        return Ok(AdmitOutcome::AlreadyJoined);
                    }
                    Err(e) => return Err(e),
                };

                let claimed = sqlx::query(
                    "UPDATE contests
                     SET participants_count = participants_count + 1, updated_at = ?
                     WHERE id = ?
                       AND (participation_limit = 0 OR participants_count < participation_limit)",
                )
                .bind(&now)
                .bind(entry.contest_id.to_string())
                .execute(&mut *tx)
                .await?;
                if claimed.rows_affected() != 1 {
                    tx.rollback().await?;
                    return Ok(AdmitOutcome::LimitReached);
                }

                tx.commit().await?;
                Ok(AdmitOutcome::Admitted(participation))
            })
            .await
    }

    pub async fn update_submission(
        &self,
        participation_id: Uuid,
        submission_link: Option<String>,
        submission_text: Option<String>,
        now: OffsetDateTime,
    ) -> Result<Option<Participation>, DatabaseWriteError> {
        let now = format_timestamp(now)?;

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query_as::<_, Participation>(&format!(
                    "UPDATE participations
                     SET submission_link = ?, submission_text = ?, updated_at = ?
                     WHERE id = ?
                     RETURNING {}",
                    PARTICIPATION_COLUMNS
                ))
                .bind(submission_link)
                .bind(submission_text)
                .bind(now)
                .bind(participation_id.to_string())
                .fetch_optional(&pool)
                .await
            })
            .await
    }
}
