use arena_core::{PaymentStatus, PaymentType};
use log::{debug, error, info, warn};
use secrecy::SecretString;
use std::{future::Future, sync::Arc, time::Duration};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    CreateIntentRequest, IntentResponse, NewIntent, Payment, PaymentKey, PaymentStore,
    RecordOutcome,
};
use crate::{
    domain::{ContestStore, Error, Identity},
    infra::{
        db::is_unique_violation,
        gateway::{
            verify_webhook_signature, CreateIntent, IntentMetadata, IntentStatus, PaymentGateway,
            WebhookEvent, EVENT_INTENT_FAILED, EVENT_INTENT_SUCCEEDED,
        },
    },
    DatabaseWriteError, GatewaySettings,
};

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub currency: String,
    /// Flat fee in cents accepted for `PaymentType::Update`
    pub update_fee: i64,
    pub gateway_timeout: Duration,
    pub webhook_secret: SecretString,
    pub webhook_tolerance_secs: u64,
}

impl PaymentSettings {
    pub fn new(settings: &GatewaySettings, webhook_secret: SecretString) -> Self {
        Self {
            currency: settings.currency.clone(),
            update_fee: settings.update_fee_cents,
            gateway_timeout: Duration::from_secs(settings.request_timeout_secs),
            webhook_secret,
            webhook_tolerance_secs: settings.webhook_tolerance_secs,
        }
    }
}

/// What a webhook delivery did to the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Completed(Payment),
    Failed(Payment),
    /// Replay, unknown intent, or a payment that already left `pending`
    NoChange,
    Ignored(String),
}

/// Owns the pending -> completed/failed transition of every payment. Client confirmation,
/// webhook delivery and the reconciliation watcher all go through the same conditional
/// update, so whichever arrives first wins and the rest become no-ops.
#[derive(Clone)]
pub struct PaymentCoordinator {
    store: PaymentStore,
    contests: ContestStore,
    gateway: Arc<dyn PaymentGateway>,
    settings: PaymentSettings,
}

impl PaymentCoordinator {
    pub fn new(
        store: PaymentStore,
        contests: ContestStore,
        gateway: Arc<dyn PaymentGateway>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            store,
            contests,
            gateway,
            settings,
        }
    }

    pub fn store(&self) -> &PaymentStore {
        &self.store
    }

    pub async fn create_intent(
        &self,
        payer: &Identity,
        request: CreateIntentRequest,
    ) -> Result<IntentResponse, Error> {
        if request.price <= 0 {
            return Err(Error::Validation(String::from("Valid price is required")));
        }

        let contest = self
            .contests
            .get_contest(request.contest_id)
            .await?
            .ok_or_else(|| Error::NotFound(String::from("Contest not found")))?;

        match request.payment_type {
            PaymentType::Update if request.price != self.settings.update_fee => {
                return Err(Error::Validation(String::from(
                    "Price does not match the submission update fee",
                )));
            }
            PaymentType::Entry if request.price != contest.price => {
                return Err(Error::Validation(String::from(
                    "Price does not match contest entry fee",
                )));
            }
            _ => {}
        }

        if request.payment_type == PaymentType::Entry
            && self
                .store
                .find_entry_payment(&payer.user_id, contest.id, PaymentStatus::Completed)
                .await?
                .is_some()
        {
            return Err(already_paid());
        }

        let intent = self
            .call_gateway(self.gateway.create_intent(CreateIntent {
                amount: request.price,
                currency: self.settings.currency.clone(),
                metadata: IntentMetadata {
                    user_id: payer.user_id.clone(),
                    contest_id: contest.id.to_string(),
                    payment_type: request.payment_type.to_string(),
                },
            }))
            .await?;
        let client_secret = intent.client_secret.clone().ok_or_else(|| {
            Error::Upstream(format!("intent {} came back without a client secret", intent.id))
        })?;

        let outcome = self
            .store
            .record_intent(
                NewIntent {
                    user_id: payer.user_id.clone(),
                    contest_id: contest.id,
                    amount: request.price,
                    payment_type: request.payment_type,
                    gateway_intent_id: intent.id.clone(),
                },
                OffsetDateTime::now_utc(),
            )
            .await
            .map_err(|e| match e {
                DatabaseWriteError::Sqlx(ref err) if is_unique_violation(err) => {
                    Error::Integrity(format!("gateway intent {} is already recorded", intent.id))
                }
                e => e.into(),
            })?;

        let payment = match outcome {
            RecordOutcome::Created(payment) => payment,
            RecordOutcome::Reattached(payment) => {
                debug!(
                    "Reused pending payment {} for intent {}",
                    payment.id, intent.id
                );
                payment
            }
            RecordOutcome::AlreadyPaid => return Err(already_paid()),
        };

        info!(
            "Payment {} pending for user {} on contest {} ({} cents, {})",
            payment.id, payment.user_id, payment.contest_id, payment.amount, payment.payment_type
        );
        Ok(IntentResponse {
            client_secret,
            payment_id: payment.id,
        })
    }

    /// The caller's payment history with one row per contest and payment type: the
    /// completed payment when there is one, otherwise the most recent attempt.
    pub async fn payment_history(&self, payer: &Identity) -> Result<Vec<Payment>, Error> {
        let payments = self.store.list_for_user(&payer.user_id).await?;

        let mut history: Vec<Payment> = Vec::with_capacity(payments.len());
        for payment in payments {
            let kept = history.iter().position(|kept| {
                kept.contest_id == payment.contest_id && kept.payment_type == payment.payment_type
            });
            match kept {
                Some(index) => {
                    if payment.payment_status == PaymentStatus::Completed
                        && history[index].payment_status != PaymentStatus::Completed
                    {
                        history[index] = payment;
                    }
                }
                None => history.push(payment),
            }
        }
        Ok(history)
    }

    /// Settles a payment from the gateway's own view of the intent; the client only tells
    /// us which payment to look at. A payment that already left `pending` is returned as is.
    pub async fn confirm(
        &self,
        payer: &Identity,
        payment_id: Uuid,
        transaction_id: Option<String>,
    ) -> Result<Payment, Error> {
        let payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| Error::NotFound(String::from("Payment not found")))?;
        if payment.user_id != payer.user_id {
            return Err(Error::Forbidden(String::from("Access denied")));
        }
        if payment.payment_status.is_terminal() {
            debug!(
                "Payment {} already {}, nothing to confirm",
                payment.id, payment.payment_status
            );
            return Ok(payment);
        }

        let intent = self
            .call_gateway(self.gateway.retrieve_intent(&payment.gateway_intent_id))
            .await?;
        let now = OffsetDateTime::now_utc();

        let transitioned = if intent.status == IntentStatus::Succeeded {
            let transaction_id = transaction_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| intent.id.clone());
            self.store
                .complete_pending(PaymentKey::Id(payment.id), transaction_id, now)
                .await?
        } else {
            warn!(
                "Payment {} confirmed while intent {} is {:?}, marking failed",
                payment.id, intent.id, intent.status
            );
            self.store
                .fail_pending(PaymentKey::Id(payment.id), now)
                .await?
        };

        match transitioned {
            Some(updated) => {
                info!("Payment {} is now {}", updated.id, updated.payment_status);
                Ok(updated)
            }
            // Lost the race against the webhook or watcher; report the winner's result
            None => self
                .store
                .get_payment(payment.id)
                .await?
                .ok_or_else(|| Error::Integrity(format!("payment {} disappeared", payment.id))),
        }
    }

    /// Verifies and applies one webhook delivery. Fails closed on a bad signature.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, Error> {
        verify_webhook_signature(
            payload,
            signature,
            &self.settings.webhook_secret,
            self.settings.webhook_tolerance_secs,
            OffsetDateTime::now_utc(),
        )
        .map_err(|e| {
            warn!("Rejected webhook delivery: {}", e);
            Error::Validation(format!("Webhook Error: {}", e))
        })?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| Error::Validation(format!("Webhook Error: invalid event: {}", e)))?;
        let intent_id = event.data.object.id.clone();
        let now = OffsetDateTime::now_utc();

        let outcome = match event.event_type.as_str() {
            EVENT_INTENT_SUCCEEDED => self
                .store
                .complete_pending(PaymentKey::Intent(intent_id.clone()), intent_id.clone(), now)
                .await?
                .map(WebhookOutcome::Completed)
                .unwrap_or(WebhookOutcome::NoChange),
            EVENT_INTENT_FAILED => self
                .store
                .fail_pending(PaymentKey::Intent(intent_id.clone()), now)
                .await?
                .map(WebhookOutcome::Failed)
                .unwrap_or(WebhookOutcome::NoChange),
            other => WebhookOutcome::Ignored(other.to_string()),
        };

        match &outcome {
            WebhookOutcome::Completed(payment) => {
                info!("Webhook {} completed payment {}", event.id, payment.id)
            }
            WebhookOutcome::Failed(payment) => {
                info!("Webhook {} failed payment {}", event.id, payment.id)
            }
            WebhookOutcome::NoChange => debug!(
                "Webhook {} for intent {} changed nothing",
                event.id, intent_id
            ),
            WebhookOutcome::Ignored(event_type) => {
                debug!("Ignoring webhook {} of type {}", event.id, event_type)
            }
        }
        Ok(outcome)
    }

    /// Asks the gateway about one stale pending payment. Only final gateway states move
    /// the ledger: success completes it, cancellation fails it.
    pub async fn reconcile(&self, payment: &Payment) -> Result<Option<Payment>, Error> {
        let intent = self
            .call_gateway(self.gateway.retrieve_intent(&payment.gateway_intent_id))
            .await?;
        let now = OffsetDateTime::now_utc();

        let updated = match intent.status {
            IntentStatus::Succeeded => {
                self.store
                    .complete_pending(PaymentKey::Id(payment.id), intent.id.clone(), now)
                    .await?
            }
            IntentStatus::Canceled => {
                self.store
                    .fail_pending(PaymentKey::Id(payment.id), now)
                    .await?
            }
            _ => None,
        };
        if let Some(updated) = &updated {
            info!(
                "Reconciled payment {} to {}",
                updated.id, updated.payment_status
            );
        }
        Ok(updated)
    }

    async fn call_gateway<T, F>(&self, call: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, anyhow::Error>>,
    {
        match tokio::time::timeout(self.settings.gateway_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("Payment gateway call failed: {:#}", e);
                Err(Error::Upstream(e.to_string()))
            }
            Err(_) => {
                error!(
                    "Payment gateway call timed out after {:?}",
                    self.settings.gateway_timeout
                );
                Err(Error::Upstream(format!(
                    "timed out after {}s",
                    self.settings.gateway_timeout.as_secs()
                )))
            }
        }
    }
}

fn already_paid() -> Error {
    Error::Conflict(String::from("You have already paid for this contest"))
}
