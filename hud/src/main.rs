mod agents;
mod pipeline;
mod throttle;
mod vision;
mod watcher;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use pipeline::{AppState, ChatRequest};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vision_hud_common::config::Config;
use vision_hud_common::frame::Region;
use vision_hud_detector::MonotonicClock;
use vision::VisionClient;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/get_agents
async fn get_agents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let dir = state.config.agents.dir.clone();
    match tokio::task::spawn_blocking(move || agents::list_agents(&dir)).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /api/chat
/// Body: { "agent_id": "...", "message": "...", "mode": "manual" | "auto" }
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    Json(pipeline::run_chat(&state, body).await)
}

/// PUT /api/overlay — the overlay window reports where it sits on screen.
/// Body: { "x": 0, "y": 0, "width": 750, "height": 480 } or null to clear.
async fn set_overlay(
    State(state): State<Arc<AppState>>,
    Json(region): Json<Option<Region>>,
) -> impl IntoResponse {
    *state.overlay.write().await = region;
    info!(?region, "overlay region updated");
    StatusCode::NO_CONTENT
}

/// GET /api/status — change detector diagnostics
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.detector.lock().await.status())
}

/// POST /api/reset — next auto request bootstraps a fresh baseline
async fn reset(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.detector.lock().await.reset();
    StatusCode::NO_CONTENT
}

/// GET /api/latest — newest observation from the background watcher
async fn latest(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.latest.read().await.clone() {
        Some(observation) => Json(observation).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// GET /api/close
async fn close(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("close requested, shutting down");
    state.shutdown.send_replace(true);
    StatusCode::NO_CONTENT
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/get_agents", get(get_agents))
        .route("/api/chat", post(chat))
        .route("/api/overlay", put(set_overlay))
        .route("/api/status", get(status))
        .route("/api/reset", post(reset))
        .route("/api/latest", get(latest))
        .route("/api/close", get(close))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// Filter for the configured `[logging] level`. Tracing is not up yet, so a
/// bad value is reported on stderr before falling back to `info`.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("Invalid logging level {level:?} ({e}), falling back to \"info\"");
        EnvFilter::new("info")
    })
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level_filter(&config.logging.level)),
        )
        .init();

    info!(
        capture = config.capture.mode,
        vision_url = config.vision.url,
        diff_threshold = config.detector.diff_threshold,
        strong_diff_threshold = config.detector.strong_diff_threshold,
        watch = config.watch.enabled,
        "starting vision-hud"
    );

    let source = match vision_hud_capture::build_source(&config.capture) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to set up frame source");
            std::process::exit(1);
        }
    };
    let vision = match VisionClient::new(&config.vision) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "failed to set up vision client");
            std::process::exit(1);
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let watch_enabled = config.watch.enabled;
    let state = Arc::new(AppState::new(config, source, vision, Arc::new(MonotonicClock)));

    if watch_enabled {
        tokio::spawn(watcher::run_watch_loop(Arc::clone(&state)));
    }

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    info!(addr, "vision-hud server listening");

    let mut shutdown = state.shutdown.subscribe();
    let shutdown_state = Arc::clone(&state);
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => {}
                _ = tokio::signal::ctrl_c() => {
                    shutdown_state.shutdown.send_replace(true);
                }
            }
        })
        .await;

    if let Err(e) = served {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
    info!("vision-hud stopped");
}
