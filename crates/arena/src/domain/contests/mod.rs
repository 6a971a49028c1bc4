mod lifecycle;
mod store;

pub use lifecycle::*;
pub use store::*;

use arena_core::{money, ContestStatus};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::infra::db::{parse_enum, parse_required_datetime, parse_uuid};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contest {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub task_instructions: String,
    pub contest_type: String,
    /// Entry fee in cents
    #[serde(with = "money")]
    pub price: i64,
    #[serde(with = "money")]
    pub prize_money: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
    pub status: ContestStatus,
    /// 0 means unlimited
    pub participation_limit: i64,
    pub participants_count: i64,
    pub creator_id: String,
    pub winner_user_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Contest {
    pub fn is_full(&self) -> bool {
        !arena_core::has_capacity(self.participation_limit, self.participants_count)
    }

    pub fn deadline_passed(&self, now: OffsetDateTime) -> bool {
        now > self.deadline
    }
}

impl FromRow<'_, SqliteRow> for Contest {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Contest {
            id: parse_uuid(row, "id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            task_instructions: row.try_get("task_instructions")?,
            contest_type: row.try_get("contest_type")?,
            price: row.try_get("price")?,
            prize_money: row.try_get("prize_money")?,
            deadline: parse_required_datetime(row, "deadline")?,
            status: parse_enum(row, "status")?,
            participation_limit: row.try_get("participation_limit")?,
            participants_count: row.try_get("participants_count")?,
            creator_id: row.try_get("creator_id")?,
            winner_user_id: row.try_get("winner_user_id")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub task_instructions: String,
    #[serde(default)]
    pub contest_type: String,
    #[serde(with = "money")]
    pub price: i64,
    #[serde(with = "money")]
    pub prize_money: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
    #[serde(default)]
    pub participation_limit: i64,
}

/// Partial update of a contest's details; absent fields keep their value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub task_instructions: Option<String>,
    pub contest_type: Option<String>,
    #[serde(default, with = "money::option")]
    pub price: Option<i64>,
    #[serde(default, with = "money::option")]
    pub prize_money: Option<i64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deadline: Option<OffsetDateTime>,
    pub participation_limit: Option<i64>,
}

impl UpdateContest {
    pub fn apply_to(&self, contest: &Contest) -> Contest {
        Contest {
            name: self.name.clone().unwrap_or_else(|| contest.name.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| contest.description.clone()),
            task_instructions: self
                .task_instructions
                .clone()
                .unwrap_or_else(|| contest.task_instructions.clone()),
            contest_type: self
                .contest_type
                .clone()
                .unwrap_or_else(|| contest.contest_type.clone()),
            price: self.price.unwrap_or(contest.price),
            prize_money: self.prize_money.unwrap_or(contest.prize_money),
            deadline: self.deadline.unwrap_or(contest.deadline),
            participation_limit: self
                .participation_limit
                .unwrap_or(contest.participation_limit),
            ..contest.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestStatusUpdate {
    pub status: ContestStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclareWinner {
    pub winner_user_id: String,
}
