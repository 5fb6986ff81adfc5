use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::admin::AdminMessages;
use crate::config::{Config, ConfigStore, ServiceConfig};
use crate::engine::Dispatcher;
use crate::models::StatusRecord;
use crate::render;

const DEFAULT_TTL_MINUTES: u64 = 60;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub messages: Arc<AdminMessages>,
    /// Mount point without a trailing slash; empty at the root.
    pub prefix: String,
}

impl AppState {
    pub fn new(config: Arc<ConfigStore>, dispatcher: Arc<Dispatcher>, base_path: &str) -> Self {
        Self {
            config,
            dispatcher,
            messages: Arc::new(AdminMessages::new()),
            prefix: normalize_base_path(base_path),
        }
    }
}

/// Maps `/` and the empty string to no prefix, and `status/` to `/status`.
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusPayload {
    pub message: Option<String>,
    pub services: Vec<StatusRecord>,
}

#[derive(Debug, Deserialize)]
pub struct MessageForm {
    pub message: String,
    #[serde(default)]
    pub ttl_minutes: Option<String>,
}

async fn dashboard(State(state): State<AppState>) -> Html<String> {
    let config = state.config.current().await;
    let records = state.dispatcher.dispatch(&config.services).await;
    let broadcast = state.messages.get().await;
    Html(render::dashboard(&config.title, &records, broadcast.as_ref()))
}

async fn public_status(State(state): State<AppState>) -> Json<StatusPayload> {
    let config = state.config.current().await;
    let services = state.dispatcher.dispatch(&config.services).await;
    let message = state.messages.get().await.map(|b| b.message);
    Json(StatusPayload { message, services })
}

fn admin_services(config: &Config) -> &[ServiceConfig] {
    config
        .admin
        .as_ref()
        .map(|admin| admin.services.as_slice())
        .unwrap_or_default()
}

async fn admin_page(
    State(state): State<AppState>,
    Extension(config): Extension<Arc<Config>>,
) -> Html<String> {
    let records = state.dispatcher.dispatch(admin_services(&config)).await;
    let broadcast = state.messages.get().await;
    Html(render::admin(&config.title, &records, broadcast.as_ref(), &state.prefix))
}

async fn admin_status(
    State(state): State<AppState>,
    Extension(config): Extension<Arc<Config>>,
) -> Json<StatusPayload> {
    let services = state.dispatcher.dispatch(admin_services(&config)).await;
    let message = state.messages.get().await.map(|b| b.message);
    Json(StatusPayload { message, services })
}

async fn set_message(State(state): State<AppState>, Form(form): Form<MessageForm>) -> Redirect {
    let minutes = form
        .ttl_minutes
        .as_deref()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_TTL_MINUTES);
    state
        .messages
        .set(form.message, Duration::from_secs(minutes.saturating_mul(60)))
        .await;
    Redirect::to(&format!("{}/admin", state.prefix))
}

async fn clear_message(State(state): State<AppState>) -> Redirect {
    state.messages.clear().await;
    Redirect::to(&format!("{}/admin", state.prefix))
}

/// Basic auth against the admin section of the current config. Admin routes
/// do not exist when that section is absent.
async fn require_admin(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let config = state.config.current().await;
    let Some(admin) = config.admin.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let authorized = basic_credentials(request.headers()).is_some_and(|(user, password)| {
        timing_safe_eq(user.as_bytes(), admin.username.as_bytes())
            & timing_safe_eq(password.as_bytes(), admin.password.as_bytes())
    });
    if !authorized {
        warn!(path = %request.uri().path(), "Rejected admin request");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"admin\", charset=\"UTF-8\"")],
            "Unauthorized",
        )
            .into_response();
    }

    request.extensions_mut().insert(Arc::clone(&config));
    next.run(request).await
}

pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

pub fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin", get(admin_page))
        .route("/admin/api/status", get(admin_status))
        .route("/admin/message", post(set_message))
        .route("/admin/message/clear", post(clear_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let routes = Router::new()
        .route("/", get(dashboard))
        .route("/api/status", get(public_status))
        .merge(admin)
        .with_state(state.clone());

    // `nest` only matches the bare prefix, so `{prefix}/` gets its own route.
    let app = if state.prefix.is_empty() {
        routes
    } else {
        Router::new()
            .route(
                &format!("{}/", state.prefix),
                get(dashboard).with_state(state.clone()),
            )
            .nest(&state.prefix, routes)
    };
    app.layer(TraceLayer::new_for_http())
}

pub async fn start_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let prefix = state.prefix.clone();
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Dashboard: http://{}{}/", listener.local_addr()?, prefix);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_authorization(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn decodes_basic_credentials() {
        let encoded = STANDARD.encode("admin:s3cr:et");
        let headers = with_authorization(&format!("Basic {encoded}"));
        assert_eq!(
            basic_credentials(&headers),
            Some(("admin".to_string(), "s3cr:et".to_string()))
        );

        let headers = with_authorization(&format!("basic {encoded}"));
        assert!(basic_credentials(&headers).is_some());
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert_eq!(basic_credentials(&HeaderMap::new()), None);
        assert_eq!(basic_credentials(&with_authorization("Bearer abc")), None);
        assert_eq!(basic_credentials(&with_authorization("Basic !!!")), None);
        let no_colon = STANDARD.encode("admin");
        assert_eq!(basic_credentials(&with_authorization(&format!("Basic {no_colon}"))), None);
    }

    #[test]
    fn timing_safe_eq_compares_contents() {
        assert!(timing_safe_eq(b"secret", b"secret"));
        assert!(!timing_safe_eq(b"secret", b"secreT"));
        assert!(!timing_safe_eq(b"secret", b"secret!"));
        assert!(timing_safe_eq(b"", b""));
    }

    #[test]
    fn base_path_is_normalized() {
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("status"), "/status");
        assert_eq!(normalize_base_path("/status/"), "/status");
        assert_eq!(normalize_base_path("/ops/status"), "/ops/status");
    }
}
