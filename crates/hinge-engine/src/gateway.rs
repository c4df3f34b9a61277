use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hinge_contracts::config::OllamaConfig;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ports::Pause;
use crate::screenshot::ScreenshotRef;

#[derive(Debug, Clone)]
pub enum ImageInput {
    Path(PathBuf),
    Screenshot(ScreenshotRef),
}

impl From<ScreenshotRef> for ImageInput {
    fn from(value: ScreenshotRef) -> Self {
        Self::Screenshot(value)
    }
}

impl From<PathBuf> for ImageInput {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub options: Map<String, Value>,
    pub images: Vec<ImageInput>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn with_images<I, T>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ImageInput>,
    {
        self.images.extend(images.into_iter().map(Into::into));
        self
    }
}

/// What a provider actually receives: options already merged, images already
/// read into memory.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub options: Map<String, Value>,
    pub images: Vec<Arc<[u8]>>,
}

pub trait TextModelProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ProviderRequest) -> anyhow::Result<String>;
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{provider} generation failed after {attempts} attempt(s): {source}")]
    GenerationFailed {
        provider: String,
        attempts: usize,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub backoff_step: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&OllamaConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &OllamaConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_step: config.backoff_step(),
            backoff_cap: config.backoff_cap(),
        }
    }

    /// Wait after the failed 0-based `attempt`: linear in the attempt number,
    /// capped.
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let linear = self.backoff_step.saturating_mul(attempt as u32 + 1);
        linear.min(self.backoff_cap)
    }
}

/// Provider-agnostic front door for text generation with retry.
pub struct ModelGateway {
    provider: Box<dyn TextModelProvider>,
    default_options: Map<String, Value>,
    retry: RetryPolicy,
    pause: Arc<dyn Pause>,
}

impl ModelGateway {
    pub fn new(
        provider: Box<dyn TextModelProvider>,
        default_options: Map<String, Value>,
        retry: RetryPolicy,
        pause: Arc<dyn Pause>,
    ) -> Self {
        Self {
            provider,
            default_options,
            retry,
            pause,
        }
    }

    pub fn from_config(
        provider: Box<dyn TextModelProvider>,
        config: &OllamaConfig,
        pause: Arc<dyn Pause>,
    ) -> Self {
        Self::new(
            provider,
            config.options.clone(),
            RetryPolicy::from_config(config),
            pause,
        )
    }

    pub fn generate(&self, request: GenerateRequest) -> Result<String, GatewayError> {
        let provider_request = self.prepare(request);
        let attempts = self.retry.max_retries + 1;
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.provider.generate(&provider_request) {
                Ok(text) => {
                    log::debug!(
                        "{} replied on attempt {}: {}",
                        self.provider.name(),
                        attempt + 1,
                        truncate_text(&text, 200)
                    );
                    return Ok(text);
                }
                Err(err) => {
                    log::warn!(
                        "{} attempt {}/{} failed: {}",
                        self.provider.name(),
                        attempt + 1,
                        attempts,
                        error_chain_text(&err, 512)
                    );
                    last_error = Some(err);
                    if attempt + 1 < attempts {
                        self.pause.pause(self.retry.delay_after(attempt));
                    }
                }
            }
        }

        Err(GatewayError::GenerationFailed {
            provider: self.provider.name().to_string(),
            attempts,
            source: last_error.unwrap_or_else(|| anyhow::anyhow!("no attempt was made")),
        })
    }

    fn prepare(&self, request: GenerateRequest) -> ProviderRequest {
        let mut options = self.default_options.clone();
        for (key, value) in request.options {
            options.insert(key, value);
        }

        let mut images = Vec::with_capacity(request.images.len());
        for image in request.images {
            match image {
                ImageInput::Screenshot(shot) => images.push(shot.shared_bytes()),
                ImageInput::Path(path) => match fs::read(&path) {
                    Ok(bytes) => images.push(Arc::from(bytes)),
                    Err(err) => {
                        log::warn!("skipping unreadable image {}: {err}", path.display());
                    }
                },
            }
        }

        ProviderRequest {
            prompt: request.prompt,
            system: request.system,
            options,
            images,
        }
    }
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
