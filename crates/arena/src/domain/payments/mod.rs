mod coordinator;
mod store;
mod watcher;

pub use coordinator::*;
pub use store::*;
pub use watcher::*;

use arena_core::{money, PaymentStatus, PaymentType};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::infra::db::{parse_enum, parse_optional_datetime, parse_required_datetime, parse_uuid};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub user_id: String,
    pub contest_id: Uuid,
    /// Charged amount in cents
    #[serde(with = "money")]
    pub amount: i64,
    pub payment_type: PaymentType,
    pub payment_status: PaymentStatus,
    /// Unique reference of the intent on the gateway side
    pub gateway_intent_id: String,
    pub transaction_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Payment {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Payment {
            id: parse_uuid(row, "id")?,
            user_id: row.try_get("user_id")?,
            contest_id: parse_uuid(row, "contest_id")?,
            amount: row.try_get("amount")?,
            payment_type: parse_enum(row, "payment_type")?,
            payment_status: parse_enum(row, "payment_status")?,
            gateway_intent_id: row.try_get("gateway_intent_id")?,
            transaction_id: row.try_get("transaction_id")?,
            paid_at: parse_optional_datetime(row, "paid_at")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    /// Amount the client expects to pay, in major units on the wire
    #[serde(with = "money")]
    pub price: i64,
    pub contest_id: Uuid,
    #[serde(default)]
    pub payment_type: PaymentType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    pub client_secret: String,
    pub payment_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub payment_id: Uuid,
    pub transaction_id: Option<String>,
}
