use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    config::Settings,
    error::{Result, ScribeError},
    provider::Provider,
    types::EncodedFrame,
};

pub static FRAME_PROMPT: &str = r#"Analyze this video frame meticulously. Provide a detailed description covering these aspects:
1.  **Foreground:** What objects or people are most prominent? Describe their appearance and position.
2.  **Background:** Describe the setting and environment. What can be seen in the distance or surroundings?
3.  **Actions:** What is happening in the scene? Describe any movements, interactions, or events.
4.  **Context:** If possible, infer the overall context, mood, or potential narrative of the scene.

Your response should be a clear, well-structured paragraph."#;

/// Used when the model answers without any text. One silent frame should
/// not abort the whole run.
pub const FALLBACK_DESCRIPTION: &str = "No description could be generated for this frame.";

/// Longest slice of an error body carried into an error message.
const ERROR_BODY_LIMIT: usize = 300;

#[async_trait]
pub trait DescriptionClient: Send + Sync {
    async fn describe_frame(&self, frame: &EncodedFrame) -> Result<String>;
}

/// Client for a remote multimodal model.
pub struct VisionClient {
    http: reqwest::Client,
    provider: Provider,
    api_url: String,
    api_key: String,
    model: String,
}

impl VisionClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            http,
            provider: settings.provider,
            api_url: settings.provider.config().api_url.to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }

    /// Point the client at another endpoint (proxies, local gateways).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn request_url(&self) -> String {
        match self.provider {
            Provider::Gemini => format!(
                "{}/{}:generateContent",
                self.api_url.trim_end_matches('/'),
                self.model
            ),
            Provider::Openai => self.api_url.clone(),
        }
    }

    fn request_body(&self, frame: &EncodedFrame) -> Value {
        match self.provider {
            Provider::Gemini => gemini_request_body(frame, FRAME_PROMPT),
            Provider::Openai => openai_request_body(&self.model, frame, FRAME_PROMPT),
        }
    }

    fn extract_text(&self, response: &Value) -> Option<String> {
        match self.provider {
            Provider::Gemini => extract_gemini_text(response),
            Provider::Openai => extract_openai_text(response),
        }
    }
}

#[async_trait]
impl DescriptionClient for VisionClient {
    async fn describe_frame(&self, frame: &EncodedFrame) -> Result<String> {
        let request = self
            .http
            .post(self.request_url())
            .json(&self.request_body(frame));

        let request = match self.provider {
            Provider::Gemini => request.header("x-goog-api-key", &self.api_key),
            Provider::Openai => request.bearer_auth(&self.api_key),
        };

        debug!(
            provider = self.provider.name(),
            model = %self.model,
            timestamp = frame.timestamp,
            "requesting frame description"
        );

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "description request rejected");
            return Err(ScribeError::RemoteService {
                reason: format!("{} responded with {}: {}", self.provider.name(), status, truncate(&body)),
            });
        }

        let body = response.json::<Value>().await?;

        Ok(self.extract_text(&body).unwrap_or_else(|| {
            warn!(
                timestamp = frame.timestamp,
                "model returned no text, using fallback description"
            );
            FALLBACK_DESCRIPTION.to_string()
        }))
    }
}

/// `generateContent` body: the image part followed by the prompt.
pub fn gemini_request_body(frame: &EncodedFrame, prompt: &str) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "inlineData": { "mimeType": frame.mime_type, "data": frame.data } },
                { "text": prompt },
            ]
        }]
    })
}

/// Chat completions body with the image inlined as a data URI.
pub fn openai_request_body(model: &str, frame: &EncodedFrame, prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                {
                    "type": "image_url",
                    "image_url": { "url": format!("data:{};base64,{}", frame.mime_type, frame.data) }
                },
                { "type": "text", "text": prompt },
            ]
        }],
    })
}

/// Concatenate every text part of the first candidate.
pub fn extract_gemini_text(response: &Value) -> Option<String> {
    let text = response["candidates"][0]["content"]["parts"]
        .as_array()?
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<String>();

    non_blank(text)
}

pub fn extract_openai_text(response: &Value) -> Option<String> {
    let text = response["choices"][0]["message"]["content"].as_str()?;
    non_blank(text.to_string())
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
