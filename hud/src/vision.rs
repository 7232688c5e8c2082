//! Client for an OpenAI-compatible, vision-capable chat completion service.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;
use vision_hud_common::config::VisionConfig;

use crate::agents::ResolvedAgent;

/// Replies containing this marker mean "nothing worth saying".
pub const SILENCE_MARKER: &str = "[SILENCE]";

const AUTO_MODE_INSTRUCTION: &str =
    "\n[Mode: automatic observation] The screen has changed. If nothing is worth mentioning, reply with [SILENCE].";
const AUTO_MODE_USER_TEXT: &str = "The screen changed. Decide whether it deserves a comment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    #[default]
    Manual,
    Auto,
}

// Anything other than "auto", null included, is a manual request.
impl<'de> Deserialize<'de> for ChatMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mode = Option::<String>::deserialize(deserializer)?;
        Ok(match mode.as_deref() {
            Some(m) if m.eq_ignore_ascii_case("auto") => ChatMode::Auto,
            _ => ChatMode::Manual,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("vision request failed: {0}")]
    Request(reqwest::Error),
    #[error("vision service returned status {0}: {1}")]
    Status(u16, String),
    #[error("malformed vision response: {0}")]
    MalformedResponse(String),
}

/// `data:` URL for a JPEG snapshot.
pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

/// Assemble the system + user messages for one request.
pub fn build_request(
    agent: &ResolvedAgent,
    mode: ChatMode,
    user_message: &str,
    jpeg: &[u8],
    temperature: f32,
) -> CompletionRequest {
    let mut system_text = agent.system_prompt.clone();
    if mode == ChatMode::Auto {
        system_text.push_str(AUTO_MODE_INSTRUCTION);
    }

    let prompt = match mode {
        ChatMode::Auto => AUTO_MODE_USER_TEXT.to_string(),
        ChatMode::Manual => format!("User: {user_message}"),
    };

    CompletionRequest {
        model: agent.model.clone(),
        messages: vec![
            Message {
                role: "system".into(),
                content: MessageContent::Text(system_text),
            },
            Message {
                role: "user".into(),
                content: MessageContent::Parts(vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: jpeg_data_url(jpeg),
                        },
                    },
                    ContentPart::Text { text: prompt },
                ]),
            },
        ],
        temperature,
    }
}

pub struct VisionClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl VisionClient {
    pub fn new(config: &VisionConfig) -> Result<Self, VisionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(VisionError::Client)?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    /// Send one completion request and return the trimmed reply text.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, VisionError> {
        let mut req = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(VisionError::Request)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VisionError::Status(status.as_u16(), body));
        }

        let body: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| VisionError::MalformedResponse(e.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| VisionError::MalformedResponse("no choices in response".into()))?;

        let reply = content.trim().to_string();
        debug!(model = request.model, chars = reply.len(), "vision reply received");
        Ok(reply)
    }
}
