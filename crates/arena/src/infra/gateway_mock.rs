use anyhow::anyhow;
use async_trait::async_trait;
use log::info;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use super::gateway::{CreateIntent, IntentStatus, PaymentGateway, PaymentIntent};

/// In-process payment gateway for E2E testing and local development.
///
/// Intents live in memory. A test drives them to a final state with
/// `succeed_intent` or `cancel_intent`, or builds the client with
/// `with_auto_succeed` so every intent reports success right away.
#[derive(Clone, Default)]
pub struct MockGatewayClient {
    intents: Arc<RwLock<HashMap<String, PaymentIntent>>>,
    counter: Arc<AtomicU64>,
    auto_succeed: bool,
    unavailable: Arc<AtomicBool>,
}

impl MockGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_succeed() -> Self {
        Self {
            auto_succeed: true,
            ..Self::default()
        }
    }

    /// While set, every call fails the way an unreachable gateway would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn succeed_intent(&self, intent_id: &str) -> Result<(), String> {
        self.transition(intent_id, IntentStatus::Succeeded)
    }

    pub fn cancel_intent(&self, intent_id: &str) -> Result<(), String> {
        self.transition(intent_id, IntentStatus::Canceled)
    }

    pub fn intent_count(&self) -> usize {
        self.intents.read().map(|intents| intents.len()).unwrap_or(0)
    }

    fn transition(&self, intent_id: &str, status: IntentStatus) -> Result<(), String> {
        let mut intents = self.intents.write().map_err(|e| e.to_string())?;
        let intent = intents
            .get_mut(intent_id)
            .ok_or_else(|| format!("Intent {} not found", intent_id))?;
        if intent.status == IntentStatus::Succeeded || intent.status == IntentStatus::Canceled {
            return Err(format!(
                "Intent {} already final ({:?})",
                intent_id, intent.status
            ));
        }
        info!("Mock: intent {} -> {:?}", intent_id, status);
        intent.status = status;
        Ok(())
    }

    fn ensure_available(&self) -> Result<(), anyhow::Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("Mock gateway unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockGatewayClient {
    async fn create_intent(&self, request: CreateIntent) -> Result<PaymentIntent, anyhow::Error> {
        self.ensure_available()?;
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pi_mock_{:08}", sequence);
        let intent = PaymentIntent {
            client_secret: Some(format!("{}_secret_{}", id, sequence)),
            id: id.clone(),
            status: if self.auto_succeed {
                IntentStatus::Succeeded
            } else {
                IntentStatus::RequiresPaymentMethod
            },
            amount: request.amount,
        };

        self.intents
            .write()
            .map_err(|e| anyhow!("Mock gateway lock poisoned: {}", e))?
            .insert(id.clone(), intent.clone());
        info!(
            "Mock: created intent {} for {} {} cents",
            id, request.amount, request.currency
        );
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, anyhow::Error> {
        self.ensure_available()?;
        self.intents
            .read()
            .map_err(|e| anyhow!("Mock gateway lock poisoned: {}", e))?
            .get(intent_id)
            .cloned()
            .ok_or_else(|| anyhow!("No such payment_intent: '{}'", intent_id))
    }
}
