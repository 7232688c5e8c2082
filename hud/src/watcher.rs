use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::pipeline::{run_chat, AppState, ChatRequest, ChatStatus, Observation};
use crate::vision::ChatMode;

/// Runs the automatic observation cycle on a fixed cadence until shutdown,
/// keeping the newest reply for `GET /api/latest`.
pub async fn run_watch_loop(state: Arc<AppState>) {
    let interval = Duration::from_millis(state.config.watch.interval_ms.max(1));
    let agent_id = state.config.watch.agent_id.clone();
    let mut shutdown = state.shutdown.subscribe();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut next_id: u64 = 1;

    info!(interval_ms = interval.as_millis() as u64, agent = agent_id, "watcher started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.wait_for(|stop| *stop) => break,
        }

        let request = ChatRequest {
            agent_id: Some(agent_id.clone()),
            message: String::new(),
            mode: ChatMode::Auto,
        };
        let resp = run_chat(&state, request).await;
        match (resp.status, resp.reply) {
            (ChatStatus::Ok, Some(reply)) => {
                info!(id = next_id, chars = reply.len(), "new observation");
                *state.latest.write().await = Some(Observation {
                    id: next_id,
                    reply,
                    observed_at: chrono::Utc::now().to_rfc3339(),
                });
                next_id += 1;
            }
            (status, _) => debug!(?status, "watch cycle produced no observation"),
        }
    }

    info!("watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use serde_json::json;
    use std::time::Instant;
    use vision_hud_capture::{CaptureError, FrameSource};
    use vision_hud_common::config::Config;
    use vision_hud_common::frame::Frame;
    use vision_hud_detector::MonotonicClock;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StillSource;

    #[async_trait]
    impl FrameSource for StillSource {
        async fn capture(&self) -> Result<Frame, CaptureError> {
            Ok(Frame::from_raster(
                RgbaImage::from_pixel(16, 16, Rgba([5, 5, 5, 255])),
                Instant::now(),
                0,
            ))
        }
    }

    #[tokio::test]
    async fn stores_first_observation_and_stops_on_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Hello there"}}]
            })))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.vision.url = server.uri();
        config.watch.interval_ms = 10;
        config.agents.dir = "/nonexistent/agents".into();
        let vision = crate::vision::VisionClient::new(&config.vision).unwrap();
        let state = Arc::new(AppState::new(
            config,
            Arc::new(StillSource),
            vision,
            Arc::new(MonotonicClock),
        ));

        let handle = tokio::spawn(run_watch_loop(state.clone()));
        let mut latest = None;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            latest = state.latest.read().await.clone();
            if latest.is_some() {
                break;
            }
        }

        state.shutdown.send_replace(true);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watcher did not stop")
            .unwrap();

        let latest = latest.expect("no observation recorded");
        assert_eq!(latest.id, 1);
        assert_eq!(latest.reply, "Hello there");
    }
}
