use anyhow::Result;
use arena::{
    api::extractors::Claims, infra::gateway::sign_webhook_payload,
    infra::gateway_mock::MockGatewayClient, Application, Settings,
};
use arena_core::Role;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::{Client, Response};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Once},
};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

static INIT_LOGGER: Once = Once::new();

pub fn setup_static_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

const JWT_SECRET: &str = "integration-jwt-secret";
const WEBHOOK_SECRET: &str = "whsec_integration";

pub struct TestApp {
    pub base_url: String,
    pub client: Client,
    pub gateway: MockGatewayClient,
    pub data_folder: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.data_folder);
    }
}

impl TestApp {
    pub async fn spawn() -> Result<Self> {
        setup_static_logger();
        let data_folder = std::env::temp_dir().join(format!("arena-it-{}", Uuid::now_v7()));
        fs::create_dir_all(&data_folder)?;

        let jwt_file = data_folder.join("jwt.secret");
        let webhook_file = data_folder.join("webhook.secret");
        fs::write(&jwt_file, JWT_SECRET)?;
        fs::write(&webhook_file, WEBHOOK_SECRET)?;

        let mut settings = Settings::default();
        settings.db_settings.data_folder = data_folder.to_string_lossy().into_owned();
        settings.api_settings.port = String::from("0");
        settings.auth_settings.jwt_secret_file = jwt_file.to_string_lossy().into_owned();
        settings.auth_settings.leeway_secs = 0;
        settings.gateway_settings.webhook_secret_file =
            webhook_file.to_string_lossy().into_owned();
        settings.gateway_settings.mock_enabled = true;
        // Keep the watcher out of the way; tests drive every transition themselves
        settings.gateway_settings.pending_watch_interval_secs = 3600;
        settings.gateway_settings.pending_min_age_secs = 3600;

        let gateway = MockGatewayClient::new();
        let application =
            Application::build_with_gateway(settings, Arc::new(gateway.clone())).await?;
        let address = application.local_addr()?;
        tokio::spawn(application.run_until_stopped());

        Ok(Self {
            base_url: format!("http://{}/api/v1", address),
            client: Client::new(),
            gateway,
            data_folder,
        })
    }

    pub fn token(&self, user_id: &str, role: Role) -> String {
        let claims = Claims {
            user_id: user_id.to_string(),
            email: format!("{}@example.com", user_id),
            role,
            name: Some(format!("{} name", user_id)),
            exp: (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp() as u64,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("token encodes")
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("request sent")
    }

    pub async fn patch(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .patch(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("request sent")
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("request sent")
    }

    pub async fn get_as(&self, path: &str, token: &str) -> Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("request sent")
    }

    pub async fn send_webhook(&self, event: &Value, secret: &str) -> Response {
        let body = serde_json::to_vec(event).expect("event serializes");
        let signature = sign_webhook_payload(
            &body,
            &SecretString::from(secret.to_string()),
            OffsetDateTime::now_utc().unix_timestamp(),
        )
        .expect("payload signs");
        self.client
            .post(format!("{}/payments/webhook", self.base_url))
            .header("Stripe-Signature", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .expect("request sent")
    }

    pub fn webhook_secret(&self) -> &'static str {
        WEBHOOK_SECRET
    }

    /// Creates a contest as `creator_id` and has an admin confirm it
    pub async fn confirmed_contest(
        &self,
        creator_id: &str,
        price: f64,
        limit: i64,
        deadline: OffsetDateTime,
    ) -> Value {
        let creator = self.token(creator_id, Role::Creator);
        let created = self
            .post(
                "/contests",
                Some(&creator),
                json!({
                    "name": "Mascot illustration",
                    "description": "Draw the team mascot",
                    "taskInstructions": "Share a link to a PNG",
                    "contestType": "illustration",
                    "price": price,
                    "prizeMoney": 500,
                    "deadline": deadline.format(&time::format_description::well_known::Rfc3339).unwrap(),
                    "participationLimit": limit,
                }),
            )
            .await;
        assert_eq!(created.status(), 201);
        let contest_id = created.json::<Value>().await.unwrap()["contest"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let admin = self.token("admin-1", Role::Admin);
        let confirmed = self
            .patch(
                &format!("/contests/{}/status", contest_id),
                &admin,
                json!({ "status": "confirmed" }),
            )
            .await;
        assert_eq!(confirmed.status(), 200);
        confirmed.json::<Value>().await.unwrap()["contest"].clone()
    }

    /// Creates an entry intent for the user, lets the gateway succeed it and confirms it
    pub async fn paid_entry(&self, user_id: &str, contest_id: &str, price: f64) -> String {
        let token = self.token(user_id, Role::User);
        let intent = self
            .post(
                "/payments/create-intent",
                Some(&token),
                json!({ "price": price, "contestId": contest_id }),
            )
            .await;
        assert_eq!(intent.status(), 200);
        let intent: Value = intent.json().await.unwrap();
        let payment_id = intent["paymentId"].as_str().unwrap().to_string();
        let intent_id = intent_id_from_secret(intent["clientSecret"].as_str().unwrap());
        self.gateway.succeed_intent(&intent_id).unwrap();

        let confirmed = self
            .post(
                "/payments/confirm",
                Some(&token),
                json!({ "paymentId": payment_id }),
            )
            .await;
        assert_eq!(confirmed.status(), 200);
        payment_id
    }
}

/// Mock client secrets look like `<intent id>_secret_<n>`
pub fn intent_id_from_secret(client_secret: &str) -> String {
    client_secret
        .split("_secret_")
        .next()
        .unwrap_or_default()
        .to_string()
}
