use anyhow::anyhow;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use log::{debug, info};
use reqwest_middleware::{reqwest::Url, ClientWithMiddleware};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use time::OffsetDateTime;

use crate::GatewaySettings;

/// Metadata attached to every intent so gateway side records can be traced back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub user_id: String,
    pub contest_id: String,
    pub payment_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIntent {
    /// Amount in cents
    pub amount: i64,
    pub currency: String,
    pub metadata: IntentMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: IntentStatus,
    pub amount: i64,
}

/// Contract the payment coordinator needs from the third party processor
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: CreateIntent) -> Result<PaymentIntent, anyhow::Error>;
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, anyhow::Error>;
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorDetail {
    message: Option<String>,
}

/// Client for a Stripe compatible payment intents api
#[derive(Clone)]
pub struct GatewayClient {
    pub base_url: Url,
    pub client: ClientWithMiddleware,
    secret_key: SecretString,
}

impl GatewayClient {
    pub fn new(
        client: ClientWithMiddleware,
        settings: &GatewaySettings,
        secret_key: SecretString,
    ) -> Result<Self, anyhow::Error> {
        Ok(Self {
            base_url: Url::parse(&settings.base_url)?,
            client,
            secret_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, anyhow::Error> {
        self.base_url
            .join(path)
            .map_err(|e| anyhow!("Invalid gateway path {}: {}", path, e))
    }

    async fn read_intent(
        &self,
        response: reqwest_middleware::reqwest::Response,
    ) -> Result<PaymentIntent, anyhow::Error> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<GatewayErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(anyhow!(message));
        }
        Ok(response.json::<PaymentIntent>().await?)
    }
}

#[async_trait]
impl PaymentGateway for GatewayClient {
    async fn create_intent(&self, request: CreateIntent) -> Result<PaymentIntent, anyhow::Error> {
        let form = vec![
            ("amount", request.amount.to_string()),
            ("currency", request.currency.clone()),
            ("automatic_payment_methods[enabled]", String::from("true")),
            ("metadata[userId]", request.metadata.user_id.clone()),
            ("metadata[contestId]", request.metadata.contest_id.clone()),
            ("metadata[paymentType]", request.metadata.payment_type.clone()),
        ];
        debug!("Creating payment intent: {:?}", request);

        let response = self
            .client
            .post(self.endpoint("v1/payment_intents")?)
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;

        let intent = self.read_intent(response).await?;
        info!(
            "Created payment intent {} for {} cents",
            intent.id, intent.amount
        );
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, anyhow::Error> {
        let response = self
            .client
            .get(self.endpoint(&format!("v1/payment_intents/{}", intent_id))?)
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        self.read_intent(response).await
    }
}

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Error, Debug, PartialEq)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no matching signature")]
    Mismatch,
    #[error("webhook secret cannot be used as an hmac key")]
    InvalidKey,
}

type HmacSha256 = Hmac<Sha256>;

/// Builds the header value the gateway sends: `t=<unix>,v1=<hex hmac of "<t>.<body>">`
pub fn sign_webhook_payload(
    payload: &[u8],
    secret: &SecretString,
    timestamp: i64,
) -> Result<String, SignatureError> {
    let signature = signing_mac(payload, secret, timestamp)?
        .finalize()
        .into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

fn signing_mac(
    payload: &[u8],
    secret: &SecretString,
    timestamp: i64,
) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Checks a webhook signature header against the raw body. Any `v1` entry may match,
/// which lets the gateway roll secrets. Comparison is constant time.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &SecretString,
    tolerance_secs: u64,
    now: OffsetDateTime,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;

    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(SignatureError::Malformed);
        };
        match key {
            "t" => timestamp = Some(value.parse().map_err(|_| SignatureError::Malformed)?),
            "v1" => signatures.push(hex::decode(value).map_err(|_| SignatureError::Malformed)?),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now.unix_timestamp() - timestamp).unsigned_abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    let mut matched = false;
    for candidate in &signatures {
        if signing_mac(payload, secret, timestamp)?
            .verify_slice(candidate)
            .is_ok()
        {
            matched = true;
        }
    }
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// The subset of a gateway event the coordinator acts on
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEventData {
    pub object: WebhookObject,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookObject {
    pub id: String,
    pub status: Option<IntentStatus>,
}

pub const EVENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_INTENT_FAILED: &str = "payment_intent.payment_failed";

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from(String::from("whsec_test_secret"))
    }

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let now = OffsetDateTime::now_utc();
        let header = sign_webhook_payload(body, &secret(), now.unix_timestamp()).unwrap();

        assert_eq!(
            verify_webhook_signature(body, Some(&header), &secret(), 300, now),
            Ok(())
        );
    }

    #[test]
    fn test_signature_rejections() {
        let body = br#"{"id":"evt_1"}"#;
        let now = OffsetDateTime::now_utc();
        let header = sign_webhook_payload(body, &secret(), now.unix_timestamp()).unwrap();

        assert_eq!(
            verify_webhook_signature(b"{\"id\":\"evt_2\"}", Some(&header), &secret(), 300, now),
            Err(SignatureError::Mismatch)
        );
        let other_secret = SecretString::from(String::from("whsec_other"));
        assert_eq!(
            verify_webhook_signature(body, Some(&header), &other_secret, 300, now),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_webhook_signature(body, None, &secret(), 300, now),
            Err(SignatureError::Missing)
        );
        assert_eq!(
            verify_webhook_signature(body, Some("v1=zz"), &secret(), 300, now),
            Err(SignatureError::Malformed)
        );

        let stale = sign_webhook_payload(body, &secret(), now.unix_timestamp() - 301).unwrap();
        assert_eq!(
            verify_webhook_signature(body, Some(&stale), &secret(), 300, now),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_any_v1_entry_may_match() {
        let body = b"{}";
        let now = OffsetDateTime::now_utc();
        let good = sign_webhook_payload(body, &secret(), now.unix_timestamp()).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!(
            "t={},v1={},v1={}",
            now.unix_timestamp(),
            "00".repeat(32),
            good_sig
        );

        assert_eq!(
            verify_webhook_signature(body, Some(&header), &secret(), 300, now),
            Ok(())
        );
    }

    #[test]
    fn test_event_parsing_tolerates_unknown_status() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{"id":"evt_9","type":"payment_intent.succeeded","data":{"object":{"id":"pi_9","status":"succeeded","amount":2500}}}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, EVENT_INTENT_SUCCEEDED);
        assert_eq!(event.data.object.status, Some(IntentStatus::Succeeded));

        let intent: PaymentIntent = serde_json::from_str(
            r#"{"id":"pi_1","client_secret":"pi_1_secret","status":"brand_new_state","amount":100}"#,
        )
        .unwrap();
        assert_eq!(intent.status, IntentStatus::Unknown);
    }
}
