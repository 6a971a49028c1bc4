mod admission;
mod store;

pub use admission::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::infra::db::{parse_required_datetime, parse_uuid};

/// A user's admitted entry into a contest, together with their submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participation {
    pub id: Uuid,
    pub contest_id: Uuid,
    pub user_id: String,
    /// Name and email as they were when the user joined
    pub user_name: String,
    pub user_email: String,
    pub payment_id: Uuid,
    pub transaction_id: Option<String>,
    /// Always "paid": rows only exist for completed entry payments
    pub payment_status: String,
    pub submission_link: Option<String>,
    pub submission_text: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Participation {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Participation {
            id: parse_uuid(row, "id")?,
            contest_id: parse_uuid(row, "contest_id")?,
            user_id: row.try_get("user_id")?,
            user_name: row.try_get("user_name")?,
            user_email: row.try_get("user_email")?,
            payment_id: parse_uuid(row, "payment_id")?,
            transaction_id: row.try_get("transaction_id")?,
            payment_status: row.try_get("payment_status")?,
            submission_link: row.try_get("submission_link")?,
            submission_text: row.try_get("submission_text")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmitRequest {
    pub contest_id: Uuid,
    pub payment_id: Uuid,
    pub submission_link: Option<String>,
}

/// Fields left out keep their stored value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubmission {
    pub submission_link: Option<String>,
    pub submission_text: Option<String>,
}
