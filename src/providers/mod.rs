//! Structured-output adapters for the external model providers.
//!
//! Every adapter takes the same [`ProviderRequest`] and returns the parsed
//! JSON payload. Typed validation happens once, in [`call_structured`], so a
//! malformed reply looks the same regardless of which provider produced it.

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{resolve_model_id, ApiKeys, PROVIDER_HTTP_TIMEOUT_SECS};
use crate::pricing::calculate_cost;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    ResponseInvalid(String),

    #[error("all {attempts} provider attempts failed")]
    ProvidersExhausted { attempts: usize },
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Network(e.to_string())
    }
}

/// One structured-output request. `schema` is a JSON Schema object the
/// reply must satisfy; `images` are public URLs sent as image parts.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub schema_name: String,
    pub system: String,
    pub user: String,
    pub schema: serde_json::Value,
    pub images: Vec<String>,
}

#[async_trait]
pub trait StructuredProvider: Send + Sync {
    /// `provider:model`, used in logs and fallback bookkeeping.
    fn id(&self) -> &str;

    async fn call(&self, request: &ProviderRequest) -> Result<serde_json::Value, ProviderError>;
}

/// Range and shape checks serde alone can't express.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Call `provider` and decode the reply into `T`. Any structural or range
/// mismatch is reported as [`ProviderError::ResponseInvalid`].
pub async fn call_structured<T>(
    provider: &dyn StructuredProvider,
    request: &ProviderRequest,
) -> Result<T, ProviderError>
where
    T: DeserializeOwned + Validate,
{
    let raw = provider.call(request).await?;
    let value: T = serde_json::from_value(raw)
        .map_err(|e| ProviderError::ResponseInvalid(format!("{}: {}", request.schema_name, e)))?;
    value
        .validate()
        .map_err(|e| ProviderError::ResponseInvalid(format!("{}: {}", request.schema_name, e)))?;
    Ok(value)
}

/// Pull a JSON object out of model text. Accepts bare JSON or JSON wrapped
/// in prose or markdown fences.
pub fn extract_json(raw: &str) -> Result<serde_json::Value, ProviderError> {
    let trimmed = raw.trim();

    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Ok(v);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str(&trimmed[start..=end]) {
                return Ok(v);
            }
        }
    }

    let preview: String = trimmed.chars().take(100).collect();
    Err(ProviderError::ResponseInvalid(format!(
        "reply is not JSON. Response starts with: {preview}"
    )))
}

/// Log the estimated spend for one call.
pub(crate) fn log_usage(provider_id: &str, model: &str, input_tokens: u64, output_tokens: u64) {
    match calculate_cost(model, input_tokens, output_tokens) {
        Some(cost) => info!(
            provider = provider_id,
            input_tokens,
            output_tokens,
            "Provider call cost ~${:.4}",
            cost
        ),
        None => info!(
            provider = provider_id,
            input_tokens, output_tokens, "Provider call (no price for {})", model
        ),
    }
}

/// Turn a non-2xx reply into [`ProviderError::Http`], keeping a bounded
/// slice of the body for the logs.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body: String = text.chars().take(500).collect();
    Err(ProviderError::Http { status, body })
}

pub(crate) fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(PROVIDER_HTTP_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build provider HTTP client, using default");
            reqwest::Client::new()
        })
}

/// Providers keyed by `(provider, model key)`, e.g. `("gemini", "flash")`.
/// Only configured providers are registered, so a chain built from the
/// registry silently skips the ones without credentials.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<(String, String), Arc<dyn StructuredProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: &ApiKeys) -> Self {
        let client = build_http_client();
        let mut registry = Self::new();

        if let Some(key) = &keys.gemini {
            for model_key in ["flash", "pro"] {
                if let Some(model) = resolve_model_id("gemini", model_key) {
                    registry.insert(
                        "gemini",
                        model_key,
                        Arc::new(GeminiProvider::new(client.clone(), key.clone(), model)),
                    );
                }
            }
        }
        if let Some(key) = &keys.openai {
            for model_key in ["mini", "gpt5"] {
                if let Some(model) = resolve_model_id("openai", model_key) {
                    registry.insert(
                        "openai",
                        model_key,
                        Arc::new(OpenAiProvider::new(client.clone(), key.clone(), model)),
                    );
                }
            }
        }
        if let Some(key) = &keys.anthropic {
            if let Some(model) = resolve_model_id("anthropic", "sonnet") {
                registry.insert(
                    "anthropic",
                    "sonnet",
                    Arc::new(AnthropicProvider::new(client.clone(), key.clone(), model)),
                );
            }
        }

        registry
    }

    pub fn insert(&mut self, provider: &str, model_key: &str, p: Arc<dyn StructuredProvider>) {
        self.providers
            .insert((provider.to_string(), model_key.to_string()), p);
    }

    pub fn get(&self, provider: &str, model_key: &str) -> Option<Arc<dyn StructuredProvider>> {
        self.providers
            .get(&(provider.to_string(), model_key.to_string()))
            .cloned()
    }

    /// Resolve a preference list into the providers that are available,
    /// keeping the order.
    pub fn chain(&self, prefs: &[(&str, &str)]) -> Vec<Arc<dyn StructuredProvider>> {
        prefs
            .iter()
            .filter_map(|(provider, key)| self.get(provider, key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
