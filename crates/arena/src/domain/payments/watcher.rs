use log::{debug, error, info, warn};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::PaymentCoordinator;
use crate::GatewaySettings;

const BATCH_SIZE: i64 = 50;

/// Reconciles pending payments whose client never confirmed and whose webhook never
/// arrived, by asking the gateway for the intent's current state.
pub struct PendingPaymentWatcher {
    coordinator: PaymentCoordinator,
    sync_interval: Duration,
    min_age: Duration,
    cancel_token: CancellationToken,
}

impl PendingPaymentWatcher {
    pub fn new(
        coordinator: PaymentCoordinator,
        settings: &GatewaySettings,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            sync_interval: Duration::from_secs(settings.pending_watch_interval_secs),
            min_age: Duration::from_secs(settings.pending_min_age_secs),
            cancel_token,
        }
    }

    pub async fn watch(&self) -> Result<(), anyhow::Error> {
        info!("Starting pending payment watcher");

        loop {
            if self.cancel_token.is_cancelled() {
                info!("Pending payment watcher received cancellation");
                break;
            }

            match self.reconcile_stale_payments().await {
                Ok(settled) => debug!("Pending payment pass settled {} payments", settled),
                Err(e) => error!("Pending payment pass failed: {}", e),
            }

            tokio::select! {
                _ = sleep(self.sync_interval) => continue,
                _ = self.cancel_token.cancelled() => {
                    info!("Pending payment watcher cancelled during sleep");
                    break;
                }
            }
        }

        Ok(())
    }

    /// One pass over the oldest stale pending payments. Returns how many moved.
    pub async fn reconcile_stale_payments(&self) -> Result<usize, anyhow::Error> {
        let min_age = time::Duration::try_from(self.min_age)?;
        let stale = self
            .coordinator
            .store()
            .list_stale_pending(OffsetDateTime::now_utc() - min_age, BATCH_SIZE)
            .await?;
        debug!("Checking {} stale pending payments", stale.len());

        let mut settled = 0;
        for payment in stale {
            if self.cancel_token.is_cancelled() {
                break;
            }
            match self.coordinator.reconcile(&payment).await {
                Ok(Some(_)) => settled += 1,
                Ok(None) => debug!("Payment {} still pending on the gateway", payment.id),
                Err(e) => warn!("Failed to reconcile payment {}: {}", payment.id, e),
            }
        }
        Ok(settled)
    }
}
