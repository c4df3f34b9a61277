use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hinge_contracts::config::OllamaConfig;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use crate::gateway::{truncate_text, ProviderRequest, TextModelProvider};

/// Local Ollama server, `/api/generate` without streaming.
pub struct OllamaProvider {
    host: String,
    model: String,
    timeout: Duration,
    http: HttpClient,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: config.timeout(),
            http: HttpClient::new(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/generate", self.host)
    }

    pub fn build_payload(&self, request: &ProviderRequest) -> Value {
        let images: Vec<Value> = request
            .images
            .iter()
            .map(|bytes| Value::String(BASE64.encode(bytes)))
            .collect();
        let mut payload = Map::new();
        payload.insert("model".to_string(), Value::String(self.model.clone()));
        payload.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        if let Some(system) = request.system.as_deref().filter(|value| !value.is_empty()) {
            payload.insert("system".to_string(), Value::String(system.to_string()));
        }
        if !images.is_empty() {
            payload.insert("images".to_string(), Value::Array(images));
        }
        payload.insert("options".to_string(), Value::Object(request.options.clone()));
        payload.insert("stream".to_string(), json!(false));
        Value::Object(payload)
    }
}

impl TextModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn generate(&self, request: &ProviderRequest) -> Result<String> {
        let endpoint = self.endpoint();
        let payload = self.build_payload(request);
        log::debug!(
            "POST {endpoint} model={} images={}",
            self.model,
            request.images.len()
        );
        let response = self
            .http
            .post(&endpoint)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .with_context(|| format!("Ollama request failed ({endpoint})"))?;
        let parsed = response_json_or_error("Ollama", response)?;
        extract_response_text(&parsed)
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn extract_response_text(payload: &Value) -> Result<String> {
    if let Some(error) = payload.get("error").and_then(Value::as_str) {
        bail!("Ollama reported an error: {}", truncate_text(error, 512));
    }
    match payload.get("response").and_then(Value::as_str) {
        Some(text) => Ok(text.to_string()),
        None => bail!(
            "Ollama response missing `response` field: {}",
            truncate_text(&payload.to_string(), 512)
        ),
    }
}
