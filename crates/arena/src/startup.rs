use crate::{
    api::{
        extractors::JwtVerifier,
        routes::{
            confirm_payment, contest_submissions, create_contest, create_payment_intent,
            declare_winner, get_contest, health, join_contest, my_participations, my_payments,
            payment_webhook, update_contest, update_contest_status, update_submission,
        },
    },
    config::Settings,
    domain::{
        AdmissionController, ContestLifecycle, ContestStore, ParticipationStore,
        PaymentCoordinator, PaymentSettings, PaymentStore, PendingPaymentWatcher, UserStore,
    },
    infra::{
        db::{DBConnection, DatabasePoolConfig},
        file_utils::create_folder,
        gateway::{GatewayClient, PaymentGateway},
        secrets::{get_or_create_secret, read_secret},
    },
};

// Mock implementations only available with e2e-testing feature or debug builds
#[cfg(any(feature = "e2e-testing", debug_assertions))]
use crate::infra::gateway_mock::MockGatewayClient;
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{connect_info::IntoMakeServiceWithConnectInfo, ConnectInfo, Request},
    http::{Extensions, HeaderValue},
    middleware::{self, AddExtension, Next},
    response::IntoResponse,
    routing::{get, patch, post},
    serve::Serve,
    Router,
};
use hyper::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use log::{error, info, warn};
use reqwest_middleware::{
    reqwest::{self, Client},
    ClientBuilder, ClientWithMiddleware, Middleware,
};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use secrecy::ExposeSecret;
use std::{collections::HashMap, net::SocketAddr, str::FromStr};
use std::{sync::Arc, time::Duration};
use tokio::signal::unix::{signal, SignalKind};
use tokio::{net::TcpListener, select, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct Application {
    server: Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    cancellation_token: CancellationToken,
    background_tasks: TaskTracker,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let gateway = build_gateway(&config)?;
        Self::build_with_gateway(config, gateway).await
    }

    /// Builds the server around an already constructed payment gateway
    pub async fn build_with_gateway(
        config: Settings,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            config.api_settings.domain, config.api_settings.port
        );
        let listener = SocketAddr::from_str(&address)?;
        let (app_state, background_tasks, cancellation_token) =
            build_app(config.clone(), gateway).await?;
        let server = build_server(listener, app_state, config.api_settings.origins).await?;
        Ok(Self {
            server,
            cancellation_token,
            background_tasks,
        })
    }

    /// Address actually bound, useful when configured with port 0
    pub fn local_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.server.local_addr()?)
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        info!("Starting server...");
        match self.server.with_graceful_shutdown(shutdown_signal()).await {
            Ok(_) => {
                info!("Server shutdown initiated");
                self.cancellation_token.cancel();

                let timeout = tokio::time::sleep(Duration::from_secs(10));
                select! {
                    _ = self.background_tasks.wait() => {
                        info!("Background tasks completed gracefully");
                    }
                    _ = timeout => {
                        warn!("Background tasks timed out during shutdown");
                    }
                }

                info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Server shutdown error: {}", e);
                self.cancellation_token.cancel();

                let _ = tokio::time::timeout(Duration::from_secs(5), self.background_tasks.wait())
                    .await;

                Err(anyhow!("Error during server shutdown: {}", e))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DBConnection,
    pub jwt: JwtVerifier,
    pub users: UserStore,
    pub contests: ContestLifecycle,
    pub payments: PaymentCoordinator,
    pub admission: AdmissionController,
    pub background_tasks: Arc<HashMap<String, JoinHandle<()>>>,
}

/// Real gateway client, or the in-process one when `mock_enabled` is set
pub fn build_gateway(config: &Settings) -> Result<Arc<dyn PaymentGateway>, anyhow::Error> {
    #[cfg(any(feature = "e2e-testing", debug_assertions))]
    if config.gateway_settings.mock_enabled {
        let mock = if config.gateway_settings.mock_auto_succeed {
            MockGatewayClient::with_auto_succeed()
        } else {
            MockGatewayClient::new()
        };
        info!(
            "Mock payment gateway configured (auto_succeed: {})",
            config.gateway_settings.mock_auto_succeed
        );
        return Ok(Arc::new(mock));
    }

    #[cfg(not(any(feature = "e2e-testing", debug_assertions)))]
    if config.gateway_settings.mock_enabled {
        return Err(anyhow!(
            "Mock payment gateway requires e2e-testing feature or debug build"
        ));
    }

    let secret_key = read_secret(&config.gateway_settings.secret_key_file)
        .map_err(|e| anyhow!("Failed to load gateway secret key: {}", e))?;
    let client = GatewayClient::new(
        build_reqwest_client(),
        &config.gateway_settings,
        secret_key,
    )?;
    info!(
        "Payment gateway client configured for {}",
        config.gateway_settings.base_url
    );
    Ok(Arc::new(client))
}

pub async fn build_app(
    config: Settings,
    gateway: Arc<dyn PaymentGateway>,
) -> Result<(AppState, TaskTracker, CancellationToken), anyhow::Error> {
    create_folder(&config.db_settings.data_folder)
        .map_err(|e| anyhow!("Error creating data folder: {}", e))?;

    let pool_config: DatabasePoolConfig = config.db_settings.clone().into();
    let ledger_db = DBConnection::new(
        &config.db_settings.data_folder,
        &config.db_settings.database_name,
        pool_config,
    )
    .await
    .map_err(|e| anyhow!("Error setting up ledger db: {}", e))?;

    let jwt_secret = get_or_create_secret(&config.auth_settings.jwt_secret_file)?;
    let jwt = JwtVerifier::new(
        jwt_secret.expose_secret().as_bytes(),
        config.auth_settings.leeway_secs,
    );
    let webhook_secret = get_or_create_secret(&config.gateway_settings.webhook_secret_file)?;

    let users = UserStore::new(ledger_db.clone());
    let contest_store = ContestStore::new(ledger_db.clone());
    let payment_store = PaymentStore::new(ledger_db.clone());

    let payments = PaymentCoordinator::new(
        payment_store.clone(),
        contest_store.clone(),
        gateway,
        PaymentSettings::new(&config.gateway_settings, webhook_secret),
    );
    let admission = AdmissionController::new(
        ParticipationStore::new(ledger_db.clone()),
        payment_store,
        contest_store.clone(),
        users.clone(),
    );
    let contests = ContestLifecycle::new(contest_store);
    info!("Ledger services configured");

    let tracker = TaskTracker::new();
    let mut tasks = HashMap::new();
    let cancel_token = CancellationToken::new();

    let pending_watcher = PendingPaymentWatcher::new(
        payments.clone(),
        &config.gateway_settings,
        cancel_token.clone(),
    );
    let pending_watcher_task = tracker.spawn(async move {
        match pending_watcher.watch().await {
            Ok(_) => {
                info!("Successfully shutdown pending payment watcher")
            }
            Err(e) => {
                error!("Error in pending payment watcher: {}", e)
            }
        }
    });
    tracker.close();
    tasks.insert(
        String::from("pending_payment_watcher"),
        pending_watcher_task,
    );

    let app_state = AppState {
        db: ledger_db,
        jwt,
        users,
        contests,
        payments,
        admission,
        background_tasks: Arc::new(tasks),
    };
    Ok((app_state, tracker, cancel_token))
}

pub async fn build_server(
    socket_addr: SocketAddr,
    app_state: AppState,
    origins: Vec<String>,
) -> Result<
    Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    anyhow::Error,
> {
    let listener = TcpListener::bind(socket_addr).await?;
    let bound = listener.local_addr()?;

    info!("Setting up service");
    let app = app(app_state, origins);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    info!("Service running @: http://{}:{}", bound.ip(), bound.port());
    Ok(server)
}

pub fn app(app_state: AppState, origins: Vec<String>) -> Router {
    let origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION])
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true);

    let payment_endpoints = Router::new()
        .route("/create-intent", post(create_payment_intent))
        .route("/confirm", post(confirm_payment))
        .route("/me", get(my_payments))
        .route("/webhook", post(payment_webhook));

    let participation_endpoints = Router::new()
        .route("/", post(join_contest))
        .route("/me", get(my_participations))
        .route("/contest/{contest_id}", get(contest_submissions))
        .route("/{participation_id}", patch(update_submission));

    let contest_endpoints = Router::new()
        .route("/", post(create_contest))
        .route("/{contest_id}", get(get_contest).put(update_contest))
        .route("/{contest_id}/status", patch(update_contest_status))
        .route("/{contest_id}/winner", patch(declare_winner));

    Router::new()
        .route("/api/v1/health_check", get(health))
        .nest("/api/v1/payments", payment_endpoints)
        .nest("/api/v1/participations", participation_endpoints)
        .nest("/api/v1/contests", contest_endpoints)
        .layer(middleware::from_fn(log_request))
        .with_state(Arc::new(app_state))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}

pub fn build_reqwest_client() -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    ClientBuilder::new(Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(LoggingMiddleware)
        .build()
}

struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let method = req.method().clone();
        let url = req.url().clone();

        info!("Making {} request to: {}", method, url);

        let result = next.run(req, extensions).await;

        match &result {
            Ok(response) => {
                info!("{} {} -> Status: {}", method, url, response.status());
            }
            Err(error) => {
                warn!("{} {} -> Error: {:?}", method, url, error);
            }
        }

        result
    }
}

async fn shutdown_signal() {
    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to install signal handlers: {}", e);
            return std::future::pending().await;
        }
    };

    select! {
        _ = sigint.recv() => info!("Received SIGINT signal"),
        _ = sigterm.recv() => info!("Received SIGTERM signal"),
    }
}
