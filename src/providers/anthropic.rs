use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{check_status, log_usage, ProviderError, ProviderRequest, StructuredProvider};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 8192;

/// Messages API. Structured output is obtained by forcing a single tool
/// call whose input schema is the requested schema.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    id: String,
}

impl AnthropicProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client,
            api_key: api_key.into(),
            id: format!("anthropic:{model}"),
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn body(&self, request: &ProviderRequest) -> serde_json::Value {
        let mut content: Vec<serde_json::Value> = request
            .images
            .iter()
            .map(|url| json!({ "type": "image", "source": { "type": "url", "url": url } }))
            .collect();
        content.push(json!({ "type": "text", "text": request.user }));

        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": request.system,
            "tools": [{
                "name": request.schema_name,
                "description": "Return the result in this exact structure.",
                "input_schema": request.schema,
            }],
            "tool_choice": { "type": "tool", "name": request.schema_name },
            "messages": [{ "role": "user", "content": content }],
        })
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    input: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[async_trait]
impl StructuredProvider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(&self, request: &ProviderRequest) -> Result<serde_json::Value, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %self.model, schema = %request.schema_name, "Sending request to Anthropic");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.body(request))
            .send()
            .await?;
        let response = check_status(response).await?;

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ResponseInvalid(format!("Anthropic envelope: {e}")))?;

        if let Some(usage) = &parsed.usage {
            log_usage(&self.id, &self.model, usage.input_tokens, usage.output_tokens);
        }

        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "tool_use")
            .and_then(|block| block.input)
            .ok_or_else(|| {
                ProviderError::ResponseInvalid("Anthropic reply had no tool_use block".to_string())
            })
    }
}
