//! Chat-completion client for an OpenAI-compatible provider.

use crate::inference::gateway::{Completion, InferenceGateway, Prompt, ProviderError};
use crate::types::ComplexityTier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sampling temperature for agent invocations.
const TEMPERATURE: f64 = 0.7;

/// HTTP inference client.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

// -- OpenAI-compatible request/response types --------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [MessagePayload<'a>; 2],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    total_tokens: u64,
}

impl InferenceClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl InferenceGateway for InferenceClient {
    async fn invoke(
        &self,
        prompt: &Prompt,
        tier: ComplexityTier,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        let model = tier.model();
        let request = ChatRequest {
            model,
            messages: [
                MessagePayload {
                    role: "system",
                    content: &prompt.system,
                },
                MessagePayload {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens,
            temperature: TEMPERATURE,
        };

        debug!("Inference request to model: {}", model);

        let resp = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        parse_completion(&body)
    }
}

/// Extract the first choice and total token usage from a response body.
fn parse_completion(body: &str) -> Result<Completion, ProviderError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content);

    Ok(Completion {
        text,
        tokens_used: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
    })
}
