//! OpenAI-compatible chat-completions client for image understanding
//!
//! The agent is built once per client with the configured timeout, so a
//! stalled request surfaces as a transport error instead of hanging the
//! extraction.

use base64::Engine as _;
use serde_json::{json, Value};
use tracing::debug;

use super::{VisionClient, VisionRequest};
use crate::config::VisionConfig;
use crate::error::BackendError;
use crate::types::MediaType;

const MAX_ERROR_BODY_CHARS: usize = 500;

pub struct OpenAiVisionClient {
    agent: ureq::Agent,
    api_key: String,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiVisionClient {
    /// Fails with `NotConfigured` when no API key resolves
    pub fn new(config: &VisionConfig) -> Result<Self, BackendError> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            BackendError::NotConfigured(format!(
                "no API key (set vision.api_key or ${})",
                config.api_key_env
            ))
        })?;

        let agent = ureq::AgentBuilder::new().timeout(config.timeout()).build();

        Ok(Self {
            agent,
            api_key,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn request_body(&self, prompt: &str, image_base64: &str, media_type: MediaType) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:{};base64,{}", media_type.mime(), image_base64)
                        }
                    }
                ]
            }]
        })
    }
}

impl VisionClient for OpenAiVisionClient {
    fn complete(&self, request: &VisionRequest<'_>) -> Result<String, BackendError> {
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(request.image);
        let body = self.request_body(request.prompt, &image_base64, request.media_type);

        debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            image_bytes = request.image.len(),
            "calling vision model"
        );

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_string(&body.to_string());

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(BackendError::Status {
                    status,
                    body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(BackendError::Transport(transport.to_string()));
            }
        };

        let text = response.into_string()?;
        completion_content(&text)
    }

    fn name(&self) -> &str {
        "openai-vision"
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response
pub fn completion_content(response_body: &str) -> Result<String, BackendError> {
    let value: Value = serde_json::from_str(response_body)
        .map_err(|err| BackendError::MalformedResponse(format!("response is not JSON: {err}")))?;

    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::MalformedResponse("response has no message content".to_string()))
}
