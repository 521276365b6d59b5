use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::routing::post;
use axum::Router;
use cubic_spacy_api::Update;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio_util::sync::CancellationToken;

use crate::config::{ListenAddress, WebhookConfig};
use crate::dispatch::Dispatcher;

pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(key: &[u8], message: &[u8]) -> Option<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).ok()?;
    mac.update(message);
    Some(mac)
}

/// Configured webhook secret, compared in constant time.
#[derive(Clone)]
struct SecretToken(Arc<[u8]>);

impl SecretToken {
    fn new(secret: &str) -> Self {
        Self(Arc::from(secret.as_bytes()))
    }

    fn matches(&self, provided: &[u8]) -> bool {
        match (keyed_mac(&self.0, provided), keyed_mac(&self.0, &self.0)) {
            (Some(provided), Some(expected)) => {
                provided.verify_slice(&expected.finalize().into_bytes()).is_ok()
            }
            _ => false,
        }
    }
}

#[derive(Clone)]
struct WebhookState {
    dispatcher: Dispatcher,
    secret_token: Option<SecretToken>,
}

/// Router accepting update deliveries on any path.
pub fn app(dispatcher: Dispatcher, secret_token: Option<String>) -> Router {
    let state =
        WebhookState { dispatcher, secret_token: secret_token.as_deref().map(SecretToken::new) };
    Router::new()
        .route("/", post(receive_update))
        .route("/{*path}", post(receive_update))
        .with_state(state)
}

async fn receive_update(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(expected) = &state.secret_token {
        let provided = headers.get(SECRET_TOKEN_HEADER).map(HeaderValue::as_bytes);
        if !provided.is_some_and(|provided| expected.matches(provided)) {
            tracing::warn!("rejected webhook delivery with a missing or wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    // Undecodable deliveries are acknowledged so the platform does not retry them.
    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => state.dispatcher.dispatch(update),
        Err(err) => {
            tracing::warn!(error = %err, bytes = body.len(), "failed to decode webhook update");
        }
    }
    StatusCode::OK
}

/// Bind the configured listener and serve `app` until `shutdown` fires.
///
/// # Errors
/// Returns an error when the listener cannot be bound, the socket
/// permissions cannot be applied, or the server fails.
pub async fn serve(config: &WebhookConfig, app: Router, shutdown: CancellationToken) -> Result<()> {
    match &config.listen {
        ListenAddress::Tcp(address) => {
            let listener = tokio::net::TcpListener::bind(*address)
                .await
                .with_context(|| format!("failed to start webhook listener on tcp {address}"))?;
            let local_address = listener.local_addr()?;
            tracing::info!(listen_address = %local_address, "started webhook server");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
                .context("failed to serve webhook")?;
        }
        ListenAddress::Unix(path) => serve_unix(path, config, app, shutdown).await?,
    }
    Ok(())
}

#[cfg(unix)]
async fn serve_unix(
    path: &std::path::Path,
    config: &WebhookConfig,
    app: Router,
    shutdown: CancellationToken,
) -> Result<()> {
    crate::socket::remove_stale_socket(path)?;
    let listener = tokio::net::UnixListener::bind(path)
        .with_context(|| format!("failed to start webhook listener on unix {}", path.display()))?;
    crate::socket::apply_permissions(path, &config.permissions)?;
    tracing::info!(listen_address = %path.display(), "started webhook server");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("failed to serve webhook");
    let _ = std::fs::remove_file(path);
    served
}

#[cfg(not(unix))]
async fn serve_unix(
    path: &std::path::Path,
    _config: &WebhookConfig,
    _app: Router,
    _shutdown: CancellationToken,
) -> Result<()> {
    anyhow::bail!("unix domain sockets are not supported on this platform: {}", path.display())
}
