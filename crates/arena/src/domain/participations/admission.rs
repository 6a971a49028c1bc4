use arena_core::{validate_submission, ContestStatus, PaymentStatus, PaymentType};
use log::{debug, info, warn};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    AdmitOutcome, AdmitRequest, NewParticipation, Participation, ParticipationStore,
    UpdateSubmission,
};
use crate::domain::{ContestStore, Error, Identity, PaymentStore, UserStore};

/// Turns a completed entry payment into a participation
#[derive(Debug, Clone)]
pub struct AdmissionController {
    participations: ParticipationStore,
    payments: PaymentStore,
    contests: ContestStore,
    users: UserStore,
}

impl AdmissionController {
    pub fn new(
        participations: ParticipationStore,
        payments: PaymentStore,
        contests: ContestStore,
        users: UserStore,
    ) -> Self {
        Self {
            participations,
            payments,
            contests,
            users,
        }
    }

    pub async fn admit(
        &self,
        caller: &Identity,
        request: AdmitRequest,
    ) -> Result<Participation, Error> {
        self.admit_at(caller, request, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn admit_at(
        &self,
        caller: &Identity,
        request: AdmitRequest,
        now: OffsetDateTime,
    ) -> Result<Participation, Error> {
        let submission_link = non_empty(request.submission_link);
        validate_submission(submission_link.as_deref(), None)?;

        let payment = self
            .payments
            .get_payment(request.payment_id)
            .await?
            .filter(|payment| {
                payment.user_id == caller.user_id
                    && payment.contest_id == request.contest_id
                    && payment.payment_type == PaymentType::Entry
                    && payment.payment_status == PaymentStatus::Completed
            })
            .ok_or_else(|| Error::NotFound(String::from("Payment not found or not completed")))?;

        let contest = self
            .contests
            .get_contest(request.contest_id)
            .await?
            .ok_or_else(|| Error::NotFound(String::from("Contest not found")))?;
        if contest.status != ContestStatus::Confirmed {
            return Err(Error::Validation(String::from("Contest is not confirmed yet")));
        }
        if contest.is_full() {
            return Err(limit_reached());
        }
        if contest.deadline_passed(now) {
            return Err(Error::Validation(String::from("Contest deadline has passed")));
        }
        if self
            .participations
            .find_participation(contest.id, &caller.user_id)
            .await?
            .is_some()
        {
            return Err(already_joined());
        }

        let user = self
            .users
            .get_user(&caller.user_id)
            .await?
            .ok_or_else(|| Error::NotFound(String::from("User not found")))?;

        let outcome = self
            .participations
            .admit(
                NewParticipation {
                    contest_id: contest.id,
                    user_id: user.id,
                    user_name: user.name,
                    user_email: user.email,
                    payment_id: payment.id,
                    transaction_id: payment.transaction_id,
                    submission_link,
                },
                now,
            )
            .await?;

        match outcome {
            AdmitOutcome::Admitted(participation) => {
                info!(
                    "User {} joined contest {} with payment {}",
                    participation.user_id, participation.contest_id, participation.payment_id
                );
                Ok(participation)
            }
            AdmitOutcome::AlreadyJoined => {
                debug!(
                    "Concurrent join for user {} on contest {} lost the race",
                    caller.user_id, contest.id
                );
                Err(already_joined())
            }
            AdmitOutcome::LimitReached => {
                warn!(
                    "Contest {} filled up while admitting user {}",
                    contest.id, caller.user_id
                );
                Err(limit_reached())
            }
        }
    }

    /// Submissions sent to a contest, visible only to the contest's creator
    pub async fn contest_submissions(
        &self,
        caller: &Identity,
        contest_id: Uuid,
    ) -> Result<Vec<Participation>, Error> {
        let contest = self
            .contests
            .get_contest(contest_id)
            .await?
            .ok_or_else(|| Error::NotFound(String::from("Contest not found")))?;
        if contest.creator_id != caller.user_id {
            return Err(Error::Forbidden(String::from(
                "You can only view submissions for your own contests",
            )));
        }
        Ok(self.participations.list_for_contest(contest.id).await?)
    }

    pub async fn my_participations(&self, caller: &Identity) -> Result<Vec<Participation>, Error> {
        Ok(self.participations.list_for_user(&caller.user_id).await?)
    }

    pub async fn update_submission(
        &self,
        caller: &Identity,
        participation_id: Uuid,
        changes: UpdateSubmission,
    ) -> Result<Participation, Error> {
        self.update_submission_at(caller, participation_id, changes, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn update_submission_at(
        &self,
        caller: &Identity,
        participation_id: Uuid,
        changes: UpdateSubmission,
        now: OffsetDateTime,
    ) -> Result<Participation, Error> {
        let current = self
            .participations
            .get_participation(participation_id)
            .await?
            .ok_or_else(|| Error::NotFound(String::from("Submission not found")))?;
        if current.user_id != caller.user_id {
            return Err(Error::Forbidden(String::from(
                "You can only update your own submission",
            )));
        }

        let contest = self
            .contests
            .get_contest(current.contest_id)
            .await?
            .ok_or_else(|| Error::Integrity(format!(
                "participation {} points at missing contest {}",
                current.id, current.contest_id
            )))?;
        if contest.deadline_passed(now) {
            return Err(Error::Validation(String::from(
                "Submissions can no longer be edited, the contest deadline has passed",
            )));
        }

        // An empty string clears the field, an absent one keeps it
        let submission_link = match changes.submission_link {
            Some(link) => non_empty(Some(link)),
            None => current.submission_link,
        };
        let submission_text = match changes.submission_text {
            Some(text) => non_empty(Some(text)),
            None => current.submission_text,
        };
        validate_submission(submission_link.as_deref(), submission_text.as_deref())?;

        self.participations
            .update_submission(current.id, submission_link, submission_text, now)
            .await?
            .ok_or_else(|| Error::NotFound(String::from("Submission not found")))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn already_joined() -> Error {
    Error::Conflict(String::from("You have already joined this contest"))
}

fn limit_reached() -> Error {
    Error::Validation(String::from("Contest participation limit reached"))
}
