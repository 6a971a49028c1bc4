use arena_core::{PaymentStatus, PaymentType};
use sqlx::{Executor, Sqlite};
use time::OffsetDateTime;
use uuid::Uuid;

use super::Payment;
use crate::infra::db::{format_timestamp, DBConnection, DatabaseWriteError};

const PAYMENT_COLUMNS: &str = "id, user_id, contest_id, amount, payment_type, payment_status,
    gateway_intent_id, transaction_id, paid_at, created_at, updated_at";

/// How a pending transition finds its row
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentKey {
    Id(Uuid),
    Intent(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewIntent {
    pub user_id: String,
    pub contest_id: Uuid,
    pub amount: i64,
    pub payment_type: PaymentType,
    pub gateway_intent_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// A fresh pending row was inserted
    Created(Payment),
    /// An existing pending entry payment now points at the new intent
    Reattached(Payment),
    /// A completed entry payment already exists for the pair
    AlreadyPaid,
}

#[derive(Debug, Clone)]
pub struct PaymentStore {
    db_connection: DBConnection,
}

impl PaymentStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await
    }

    #[cfg(test)]
    pub async fn get_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE gateway_intent_id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(intent_id)
        .fetch_optional(self.db_connection.read())
        .await
    }

    /// The user's payments, newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            PAYMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.db_connection.read())
        .await
    }

    /// Most recent entry payment for the pair in the given state
    pub async fn find_entry_payment(
        &self,
        user_id: &str,
        contest_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Payment>, sqlx::Error> {
        find_entry(self.db_connection.read(), user_id, contest_id, status).await
    }

    /// Persists a freshly created gateway intent. Entry payments reuse the caller's pending
    /// row when one exists; update fees always get a new row. The completed-entry check
    /// runs inside the same write so two racing requests cannot both record an entry.
    pub async fn record_intent(
        &self,
        intent: NewIntent,
        now: OffsetDateTime,
    ) -> Result<RecordOutcome, DatabaseWriteError> {
        let now = format_timestamp(now)?;

        self.db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;

                if intent.payment_type == PaymentType::Entry {
                    let completed = find_entry(
                        &mut *tx,
                        &intent.user_id,
                        intent.contest_id,
                        PaymentStatus::Completed,
                    )
                    .await?;
                    if completed.is_some() {
                        tx.rollback().await?;
                        return Ok(RecordOutcome::AlreadyPaid);
                    }

                    let pending = find_entry(
                        &mut *tx,
                        &intent.user_id,
                        intent.contest_id,
                        PaymentStatus::Pending,
                    )
                    .await?;
                    if let Some(pending) = pending {
                        let payment = sqlx::query_as::<_, Payment>(&format!(
                            "UPDATE payments
                             SET gateway_intent_id = ?, amount = ?, updated_at = ?
                             WHERE id = ? AND payment_status = 'pending'
                             RETURNING {}",
                            PAYMENT_COLUMNS
                        ))
                        .bind(&intent.gateway_intent_id)
                        .bind(intent.amount)
                        .bind(&now)
                        .bind(pending.id.to_string())
                        .fetch_one(&mut *tx)
                        .await?;
                        tx.commit().await?;
                        return Ok(RecordOutcome::Reattached(payment));
                    }
                }

                let payment = sqlx::query_as::<_, Payment>(&format!(
                    "INSERT INTO payments (
                        id, user_id, contest_id, amount, payment_type, payment_status,
                        gateway_intent_id, transaction_id, paid_at, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, 'pending', ?, NULL, NULL, ?, ?)
                    RETURNING {}",
                    PAYMENT_COLUMNS
                ))
                .bind(Uuid::now_v7().to_string())
                .bind(&intent.user_id)
                .bind(intent.contest_id.to_string())
                .bind(intent.amount)
                .bind(intent.payment_type.as_str())
                .bind(&intent.gateway_intent_id)
                .bind(&now)
                .bind(&now)
                .fetch_one(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(RecordOutcome::Created(payment))
            })
            .await
    }

    /// pending -> completed. Returns `None` when the row is missing or no longer pending,
    /// which makes duplicate confirmations and webhook replays no-ops.
    pub async fn complete_pending(
        &self,
        key: PaymentKey,
        transaction_id: String,
        paid_at: OffsetDateTime,
    ) -> Result<Option<Payment>, DatabaseWriteError> {
        let paid_at = format_timestamp(paid_at)?;
        let (column, value) = key.column_and_value();

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query_as::<_, Payment>(&format!(
                    "UPDATE payments
                     SET payment_status = 'completed',
                         transaction_id = COALESCE(transaction_id, ?),
                         paid_at = ?,
                         updated_at = ?
                     WHERE {} = ? AND payment_status = 'pending'
                     RETURNING {}",
                    column, PAYMENT_COLUMNS
                ))
                .bind(transaction_id)
                .bind(&paid_at)
                .bind(&paid_at)
                .bind(value)
                .fetch_optional(&pool)
                .await
            })
            .await
    }

    /// pending -> failed, with the same no-op semantics as `complete_pending`
    pub async fn fail_pending(
        &self,
        key: PaymentKey,
        now: OffsetDateTime,
    ) -> Result<Option<Payment>, DatabaseWriteError> {
        let now = format_timestamp(now)?;
        let (column, value) = key.column_and_value();

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query_as::<_, Payment>(&format!(
                    "UPDATE payments
                     SET payment_status = 'failed', updated_at = ?
                     WHERE {} = ? AND payment_status = 'pending'
                     RETURNING {}",
                    column, PAYMENT_COLUMNS
                ))
                .bind(now)
                .bind(value)
                .fetch_optional(&pool)
                .await
            })
            .await
    }

    /// Pending payments created before `created_before`, oldest first
    pub async fn list_stale_pending(
        &self,
        created_before: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments
             WHERE payment_status = 'pending' AND created_at < ?
             ORDER BY created_at ASC
             LIMIT ?",
            PAYMENT_COLUMNS
        ))
        .bind(format_timestamp(created_before)?)
        .bind(limit)
        .fetch_all(self.db_connection.read())
        .await
    }
}

impl PaymentKey {
    fn column_and_value(self) -> (&'static str, String) {
        match self {
            PaymentKey::Id(id) => ("id", id.to_string()),
            PaymentKey::Intent(intent_id) => ("gateway_intent_id", intent_id),
        }
    }
}

async fn find_entry<'e, E>(
    executor: E,
    user_id: &str,
    contest_id: Uuid,
    status: PaymentStatus,
) -> Result<Option<Payment>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {} FROM payments
         WHERE user_id = ? AND contest_id = ? AND payment_type = 'entry' AND payment_status = ?
         ORDER BY created_at DESC
         LIMIT 1",
        PAYMENT_COLUMNS
    ))
    .bind(user_id)
    .bind(contest_id.to_string())
    .bind(status.as_str())
    .fetch_optional(executor)
    .await
}
