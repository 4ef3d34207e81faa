use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{check_status, extract_json, log_usage, ProviderError, ProviderRequest, StructuredProvider};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat completions with `response_format: json_schema`.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    id: String,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client,
            api_key: api_key.into(),
            id: format!("openai:{model}"),
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn body(&self, request: &ProviderRequest) -> serde_json::Value {
        let mut user_content = vec![json!({ "type": "text", "text": request.user })];
        for url in &request.images {
            user_content.push(json!({ "type": "image_url", "image_url": { "url": url } }));
        }

        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": user_content },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                },
            },
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl StructuredProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(&self, request: &ProviderRequest) -> Result<serde_json::Value, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, schema = %request.schema_name, "Sending request to OpenAI");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.body(request))
            .send()
            .await?;
        let response = check_status(response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ResponseInvalid(format!("OpenAI envelope: {e}")))?;

        if let Some(usage) = &parsed.usage {
            log_usage(&self.id, &self.model, usage.prompt_tokens, usage.completion_tokens);
        }

        let message = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .ok_or_else(|| ProviderError::ResponseInvalid("OpenAI returned no choices".to_string()))?;

        if let Some(refusal) = message.refusal {
            return Err(ProviderError::ResponseInvalid(format!("refused: {refusal}")));
        }

        match message.content {
            Some(text) if !text.trim().is_empty() => extract_json(&text),
            _ => Err(ProviderError::ResponseInvalid(
                "OpenAI returned empty content".to_string(),
            )),
        }
    }
}
