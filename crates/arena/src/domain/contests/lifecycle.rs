use arena_core::{validate_contest_fields, ContestStatus};
use log::{debug, info, warn};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Contest, ContestStore, CreateContest, UpdateContest, WinnerOutcome};
use crate::domain::{Error, Identity};

/// Contest authoring, moderation and the deadline gated winner declaration
#[derive(Debug, Clone)]
pub struct ContestLifecycle {
    store: ContestStore,
}

impl ContestLifecycle {
    pub fn new(store: ContestStore) -> Self {
        Self { store }
    }

    pub async fn get_contest(&self, contest_id: Uuid) -> Result<Contest, Error> {
        self.store
            .get_contest(contest_id)
            .await?
            .ok_or_else(|| Error::NotFound(String::from("Contest not found")))
    }

    pub async fn create_contest(
        &self,
        creator: &Identity,
        body: CreateContest,
    ) -> Result<Contest, Error> {
        let now = OffsetDateTime::now_utc();
        validate_contest_fields(
            &body.name,
            body.price,
            body.prize_money,
            body.participation_limit,
            body.deadline,
            now,
        )?;

        let contest = Contest {
            id: Uuid::now_v7(),
            name: body.name.trim().to_string(),
            description: body.description,
            task_instructions: body.task_instructions,
            contest_type: body.contest_type.trim().to_string(),
            price: body.price,
            prize_money: body.prize_money,
            deadline: body.deadline,
            status: ContestStatus::Pending,
            participation_limit: body.participation_limit,
            participants_count: 0,
            creator_id: creator.user_id.clone(),
            winner_user_id: None,
            created_at: now,
            updated_at: now,
        };

        let contest = self.store.add_contest(contest).await?;
        info!(
            "Contest {} created by {} with entry fee {} cents",
            contest.id, contest.creator_id, contest.price
        );
        Ok(contest)
    }

    /// Any edit sends a confirmed contest back to moderation.
    pub async fn update_contest(
        &self,
        caller: &Identity,
        contest_id: Uuid,
        changes: UpdateContest,
    ) -> Result<Contest, Error> {
        let current = self.get_contest(contest_id).await?;
        if current.creator_id != caller.user_id {
            return Err(Error::Forbidden(String::from(
                "Only the contest creator can update this contest",
            )));
        }

        let now = OffsetDateTime::now_utc();
        let updated = changes.apply_to(&current);
        validate_contest_fields(
            &updated.name,
            updated.price,
            updated.prize_money,
            updated.participation_limit,
            updated.deadline,
            now,
        )?;
        if updated.participation_limit > 0
            && updated.participation_limit < current.participants_count
        {
            return Err(Error::Validation(format!(
                "Participation limit cannot be lower than the current participant count of {}",
                current.participants_count
            )));
        }

        let was_confirmed = current.status == ContestStatus::Confirmed;
        let Some(contest) = self.store.update_details(updated, now).await? else {
            return Err(Error::Validation(String::from(
                "Participation limit cannot be lower than the current participant count",
            )));
        };

        if was_confirmed {
            info!("Contest {} edited and returned to pending", contest.id);
        }
        Ok(contest)
    }

    pub async fn set_status(
        &self,
        contest_id: Uuid,
        status: ContestStatus,
    ) -> Result<Contest, Error> {
        let contest = self
            .store
            .set_status(contest_id, status, OffsetDateTime::now_utc())
            .await?
            .ok_or_else(|| Error::NotFound(String::from("Contest not found")))?;
        info!("Contest {} moved to {}", contest.id, contest.status);
        Ok(contest)
    }

    pub async fn declare_winner(
        &self,
        caller: &Identity,
        contest_id: Uuid,
        winner_user_id: String,
    ) -> Result<Contest, Error> {
        self.declare_winner_at(caller, contest_id, winner_user_id, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn declare_winner_at(
        &self,
        caller: &Identity,
        contest_id: Uuid,
        winner_user_id: String,
        now: OffsetDateTime,
    ) -> Result<Contest, Error> {
        if winner_user_id.trim().is_empty() {
            return Err(Error::Validation(String::from("winnerUserId is required")));
        }

        let contest = self.get_contest(contest_id).await?;
        if contest.creator_id != caller.user_id {
            return Err(Error::Forbidden(String::from(
                "Only the contest creator can declare winners",
            )));
        }
        if now < contest.deadline {
            return Err(Error::Validation(String::from(
                "Cannot declare winner before the contest deadline has passed",
            )));
        }
        if contest.winner_user_id.is_some() {
            return Err(Error::Conflict(String::from(
                "Winner has already been declared for this contest",
            )));
        }

        debug!(
            "Declaring {} the winner of contest {}",
            winner_user_id, contest_id
        );
        match self
            .store
            .declare_winner(contest_id, winner_user_id.clone(), now)
            .await?
        {
            WinnerOutcome::Declared(contest) => {
                info!("Contest {} winner declared: {}", contest.id, winner_user_id);
                Ok(contest)
            }
            WinnerOutcome::AlreadyDeclared => {
                warn!("Contest {} winner was declared concurrently", contest_id);
                Err(Error::Conflict(String::from(
                    "Winner has already been declared for this contest",
                )))
            }
            WinnerOutcome::WinnerMissing => {
                Err(Error::NotFound(String::from("Winner user not found")))
            }
            WinnerOutcome::ContestMissing => {
                Err(Error::NotFound(String::from("Contest not found")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::contests::test_utils::{insert_confirmed_contest, insert_user, move_deadline},
        infra::db::DBConnection,
    };
    use arena_core::Role;
    use sqlx::SqlitePool;
    use time::Duration;

    fn lifecycle(pool: SqlitePool) -> ContestLifecycle {
        let db = DBConnection::new_with_pools(
            "test".to_string(),
            ":memory:".to_string(),
            pool.clone(),
            pool,
        );
        ContestLifecycle::new(ContestStore::new(db))
    }

    fn caller(id: &str, role: Role) -> Identity {
        Identity {
            user_id: id.to_string(),
            email: format!("{}@example.com", id),
            name: None,
            role,
        }
    }

    #[sqlx::test(migrations = "./migrations/ledger")]
    async fn test_create_contest_validates_fields(pool: SqlitePool) {
        insert_user(&pool, "creator-1", "creator").await;
        let lifecycle = lifecycle(pool);
        let creator = caller("creator-1", Role::Creator);

        let body = CreateContest {
            name: "  Logo sprint ".to_string(),
            description: "A new logo".to_string(),
            task_instructions: String::new(),
            contest_type: "design".to_string(),
            price: 2500,
            prize_money: 20_000,
            deadline: OffsetDateTime::now_utc() + Duration::days(3),
            participation_limit: 10,
        };
        let contest = lifecycle.create_contest(&creator, body.clone()).await.unwrap();
        assert_eq!(contest.name, "Logo sprint");
        assert_eq!(contest.status, ContestStatus::Pending);
        assert_eq!(contest.creator_id, "creator-1");

        let past = CreateContest {
            deadline: OffsetDateTime::now_utc() - Duration::hours(1),
            ..body
        };
        assert!(matches!(
            lifecycle.create_contest(&creator, past).await,
            Err(Error::Validation(_))
        ));
    }

    #[sqlx::test(migrations = "./migrations/ledger")]
    async fn test_update_by_owner_resets_to_pending(pool: SqlitePool) {
        insert_user(&pool, "creator-1", "creator").await;
        insert_user(&pool, "creator-2", "creator").await;
        let contest = insert_confirmed_contest(&pool, "creator-1", 2500, 0).await;
        let lifecycle = lifecycle(pool);

        let changes = UpdateContest {
            prize_money: Some(75_000),
            ..Default::default()
        };
        let err = lifecycle
            .update_contest(&caller("creator-2", Role::Creator), contest.id, changes.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let updated = lifecycle
            .update_contest(&caller("creator-1", Role::Creator), contest.id, changes)
            .await
            .unwrap();
        assert_eq!(updated.prize_money, 75_000);
        assert_eq!(updated.price, 2500);
        assert_eq!(updated.status, ContestStatus::Pending);
    }

    #[sqlx::test(migrations = "./migrations/ledger")]
    async fn test_moderation_confirms_contest(pool: SqlitePool) {
        insert_user(&pool, "creator-1", "creator").await;
        let contest = insert_confirmed_contest(&pool, "creator-1", 2500, 0).await;
        let lifecycle = lifecycle(pool);

        let pending = lifecycle
            .set_status(contest.id, ContestStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.status, ContestStatus::Pending);
        let confirmed = lifecycle
            .set_status(contest.id, ContestStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.status, ContestStatus::Confirmed);

        assert!(matches!(
            lifecycle
                .set_status(Uuid::now_v7(), ContestStatus::Confirmed)
                .await,
            Err(Error::NotFound(_))
        ));
    }

    #[sqlx::test(migrations = "./migrations/ledger")]
    async fn test_winner_only_after_deadline_and_once(pool: SqlitePool) {
        insert_user(&pool, "creator-1", "creator").await;
        insert_user(&pool, "user-1", "user").await;
        let contest = insert_confirmed_contest(&pool, "creator-1", 2500, 0).await;
        let lifecycle = lifecycle(pool.clone());
        let creator = caller("creator-1", Role::Creator);

        let early = lifecycle
            .declare_winner(&creator, contest.id, "user-1".to_string())
            .await
            .unwrap_err();
        assert!(matches!(early, Error::Validation(_)));

        move_deadline(&pool, contest.id, OffsetDateTime::now_utc() - Duration::minutes(1)).await;

        let not_owner = lifecycle
            .declare_winner(&caller("user-1", Role::Creator), contest.id, "user-1".to_string())
            .await
            .unwrap_err();
        assert!(matches!(not_owner, Error::Forbidden(_)));

        let declared = lifecycle
            .declare_winner(&creator, contest.id, "user-1".to_string())
            .await
            .unwrap();
        assert_eq!(declared.winner_user_id.as_deref(), Some("user-1"));

        let again = lifecycle
            .declare_winner(&creator, contest.id, "user-1".to_string())
            .await
            .unwrap_err();
        assert!(matches!(again, Error::Conflict(_)));

        let wins: i64 = sqlx::query_scalar("SELECT wins_count FROM users WHERE id = 'user-1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(wins, 1);
    }

    #[sqlx::test(migrations = "./migrations/ledger")]
    async fn test_unknown_winner_is_not_found(pool: SqlitePool) {
        insert_user(&pool, "creator-1", "creator").await;
        let contest = insert_confirmed_contest(&pool, "creator-1", 2500, 0).await;
        let lifecycle = lifecycle(pool);

        let after_deadline = contest.deadline + Duration::seconds(1);
        let err = lifecycle
            .declare_winner_at(
                &caller("creator-1", Role::Creator),
                contest.id,
                "nobody".to_string(),
                after_deadline,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
