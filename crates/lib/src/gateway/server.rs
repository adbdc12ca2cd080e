//! Gateway HTTP server.

use crate::config::{self, Config, MailSettings};
use crate::contact::{client_ip, ContactError, ContactHandler, InquiryPayload, RateLimiter};
use crate::delivery::DeliveryChain;
use crate::gateway::protocol::{whatsapp_url, ContactResponse, HealthResponse, SiteResponse};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Shared state for the gateway.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub handler: Arc<ContactHandler>,
    /// Floating contact link target, resolved at startup.
    pub whatsapp_url: Option<String>,
}

impl GatewayState {
    /// Resolve runtime mode and build the rate limiter and delivery chain from `mail`.
    pub fn new(config: Config, mail: &MailSettings) -> Self {
        let mode = config::resolve_runtime_mode(&config);
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_secs(config.contact.rate_limit_window_secs),
            config.contact.rate_limit_max_entries,
        ));
        let chain = DeliveryChain::from_settings(mail, mode, &config.contact.company_name);
        let handler = Arc::new(ContactHandler::new(limiter, chain, mode));
        let whatsapp_url = config::resolve_whatsapp_number(&config)
            .as_deref()
            .and_then(whatsapp_url);
        Self {
            config: Arc::new(config),
            handler,
            whatsapp_url,
        }
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/api/contact", post(contact_http))
        .route("/api/site", get(site_http))
        .with_state(state)
}

/// Run the gateway server; binds to config.server.bind:config.server.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config, mail: MailSettings) -> Result<()> {
    let state = GatewayState::new(config, &mail);
    let bind_addr = format!("{}:{}", state.config.server.bind.trim(), state.config.server.port);
    log::info!(
        "mode {}, providers: {}",
        state.handler.mode().as_str(),
        state.handler.provider_names().join(" -> ")
    );

    let sweeper = spawn_rate_limit_sweeper(state.handler.limiter().clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("gateway server exited")?;
    sweeper.abort();
    log::info!("gateway stopped");
    Ok(())
}

/// Periodically drop rate-limit entries whose window has passed.
fn spawn_rate_limit_sweeper(limiter: Arc<RateLimiter>) -> JoinHandle<()> {
    let period = limiter.window().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.evict_expired(Instant::now()).await;
            if removed > 0 {
                log::debug!("rate limiter: evicted {} expired entr(ies)", removed);
            }
        }
    })
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST /api/contact — body is parsed here so malformed JSON gets the form's error shape.
async fn contact_http(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> (StatusCode, Json<ContactResponse>) {
    let payload = match InquiryPayload::from_json(&body) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("contact: unparsable body: {}", e);
            let err = ContactError::InvalidRequest;
            return (err.status(), Json(ContactResponse::rejected(err)));
        }
    };
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    match state.handler.submit(payload, &ip).await {
        Ok(submission) => (StatusCode::OK, Json(ContactResponse::accepted(submission))),
        Err(err) => (err.status(), Json(ContactResponse::rejected(err))),
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        runtime: "running".to_string(),
        mode: state.handler.mode().as_str().to_string(),
        port: state.config.server.port,
        providers: state
            .handler
            .provider_names()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

async fn site_http(State(state): State<GatewayState>) -> Json<SiteResponse> {
    Json(SiteResponse {
        whatsapp_url: state.whatsapp_url.clone(),
    })
}
