use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use vision_hud_capture::FrameSource;
use vision_hud_common::config::{secs_to_duration, Config};
use vision_hud_common::frame::{Frame, FramePayload, Region};
use vision_hud_detector::{ChangeDetector, Clock};

use crate::agents;
use crate::throttle::RequestThrottle;
use crate::vision::{self, ChatMode, VisionClient, SILENCE_MARKER};

/// Shared state behind every handler and the background watcher.
pub struct AppState {
    pub config: Config,
    pub source: Arc<dyn FrameSource>,
    /// One lock per `observe` call keeps each evaluation atomic.
    pub detector: Arc<Mutex<ChangeDetector>>,
    pub throttle: Mutex<RequestThrottle>,
    /// Overlay window geometry reported by the UI; overrides `capture.mask`.
    pub overlay: RwLock<Option<Region>>,
    pub vision: VisionClient,
    pub latest: RwLock<Option<Observation>>,
    pub shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(
        config: Config,
        source: Arc<dyn FrameSource>,
        vision: VisionClient,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let detector = ChangeDetector::from_config(&config.detector, clock.clone());
        let throttle = RequestThrottle::new(
            secs_to_duration(config.request.min_auto_request_interval_secs),
            clock,
        );
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            source,
            detector: Arc::new(Mutex::new(detector)),
            throttle: Mutex::new(throttle),
            overlay: RwLock::new(None),
            vision,
            latest: RwLock::new(None),
            shutdown,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Missing or null selects the default agent.
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub mode: ChatMode,
}

impl ChatRequest {
    pub fn agent_id(&self) -> &str {
        self.agent_id.as_deref().unwrap_or(agents::DEFAULT_AGENT_ID)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    Ok,
    Silent,
    Unchanged,
    Cooldown,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatResponse {
    pub reply: Option<String>,
    pub status: ChatStatus,
}

impl ChatResponse {
    fn empty(status: ChatStatus) -> Self {
        Self {
            reply: None,
            status,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            reply: Some(message.into()),
            status: ChatStatus::Error,
        }
    }
}

/// Most recent reply produced by the background watcher.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub id: u64,
    pub reply: String,
    pub observed_at: String,
}

/// Capture, optionally gate on screen change, and ask the vision service.
pub async fn run_chat(state: &AppState, request: ChatRequest) -> ChatResponse {
    let frame = match state.source.capture().await {
        Ok(frame) => frame,
        Err(e) => {
            error!(error = %e, source = state.source.name(), "screen capture failed");
            return ChatResponse::error("screen capture failed");
        }
    };
    let mask = (*state.overlay.read().await).or(state.config.capture.mask);
    let frame = match tokio::task::spawn_blocking(move || prepare_frame(frame, mask)).await {
        Ok(frame) => frame,
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            return ChatResponse::error("frame preparation failed");
        }
    };

    if request.mode == ChatMode::Auto {
        // Comparison decodes and resizes pixels, so it runs off the async
        // workers with the detector lock held for the whole evaluation.
        let mut detector = Arc::clone(&state.detector).lock_owned().await;
        let observed = frame.clone();
        let verdict =
            match tokio::task::spawn_blocking(move || detector.observe(observed)).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    error!(error = %e, "spawn_blocking failed");
                    return ChatResponse::error("change detection failed");
                }
            };
        let Some(reason) = verdict.reason() else {
            return ChatResponse::empty(ChatStatus::Unchanged);
        };
        if !state.throttle.lock().await.try_acquire() {
            debug!(%reason, "change detected but request cooldown active");
            return ChatResponse::empty(ChatStatus::Cooldown);
        }
        info!(%reason, agent = request.agent_id(), "screen change, requesting commentary");
    }

    let vision_config = &state.config.vision;
    let (max_dimension, quality) = (vision_config.max_dimension, vision_config.jpeg_quality);
    let encoded =
        tokio::task::spawn_blocking(move || frame.encode_snapshot(max_dimension, quality)).await;
    let jpeg = match encoded {
        Ok(Ok(jpeg)) => jpeg,
        Ok(Err(e)) => {
            error!(error = %e, "failed to encode snapshot");
            return ChatResponse::error(e.to_string());
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            return ChatResponse::error("snapshot encoding failed");
        }
    };

    let agents_dir = state.config.agents.dir.clone();
    let agent_id = request.agent_id().to_string();
    let default_model = vision_config.default_model.clone();
    let agent = match tokio::task::spawn_blocking(move || {
        agents::resolve_agent(&agents_dir, &agent_id, &default_model)
    })
    .await
    {
        Ok(agent) => agent,
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            return ChatResponse::error("failed to load agent");
        }
    };

    let completion = vision::build_request(
        &agent,
        request.mode,
        &request.message,
        &jpeg,
        vision_config.temperature,
    );
    match state.vision.complete(&completion).await {
        Ok(reply) if request.mode == ChatMode::Auto && reply.contains(SILENCE_MARKER) => {
            debug!("vision service chose silence");
            ChatResponse::empty(ChatStatus::Silent)
        }
        Ok(reply) => ChatResponse {
            reply: Some(reply),
            status: ChatStatus::Ok,
        },
        Err(e) => {
            warn!(error = %e, "vision request failed");
            ChatResponse::error(e.to_string())
        }
    }
}

/// Decode the captured bytes once and paint the overlay window black so
/// the companion never sees itself.
fn prepare_frame(frame: Frame, mask: Option<Region>) -> Frame {
    let frame = if matches!(frame.payload, FramePayload::Encoded(_)) {
        match frame.clone().decoded() {
            Ok(decoded) => decoded,
            Err(e) => {
                // The detector sees the unreadable frame and fails open on it.
                warn!(seq = frame.seq, error = %e, "captured frame is unreadable");
                return frame;
            }
        }
    } else {
        frame
    };
    let Some(region) = mask else {
        return frame;
    };
    match frame.masked(region) {
        Ok(masked) => masked,
        Err(e) => {
            warn!(error = %e, "failed to mask overlay region");
            frame
        }
    }
}
