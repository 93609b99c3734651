//! Client for the local Ollama model server.

use crate::settings::Settings;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Model server error: {0}")]
    Api(String),
    #[error("Model server did not answer within {0}s")]
    Timeout(u64),
    #[error("Cannot connect to Ollama at {0}. Is 'ollama serve' running?")]
    ServerNotRunning(String),
    #[error("Model '{0}' not found. Pull it with: ollama pull {0}")]
    ModelNotFound(String),
}

/// Anything that turns a prompt into generated text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalModel {
    pub name: String,
    pub size: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagsModel>,
}

#[derive(Debug, Deserialize)]
struct TagsModel {
    name: String,
    #[serde(default)]
    size: i64,
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
    temperature: Option<f32>,
}

impl OllamaClient {
    pub fn new(settings: &Settings) -> Self {
        Self::with_config(settings.base_url(), settings.model.clone())
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .with_temperature(settings.temperature)
    }

    pub fn with_config(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout: Duration::from_secs(300),
            temperature: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_connect() {
            ModelError::ServerNotRunning(self.base_url.clone())
        } else if e.is_timeout() {
            ModelError::Timeout(self.timeout.as_secs())
        } else {
            ModelError::Http(e)
        }
    }

    pub async fn list_models(&self) -> Result<Vec<LocalModel>, ModelError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(ModelError::ServerNotRunning(self.base_url.clone()));
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags
            .models
            .into_iter()
            .map(|raw| LocalModel {
                name: raw.name,
                size: format_size(raw.size),
            })
            .collect())
    }

    /// Fails unless the server answers and the configured model is pulled.
    pub async fn check_availability(&self) -> Result<(), ModelError> {
        let models = self.list_models().await?;
        if models.iter().any(|m| model_matches(&self.model, &m.name)) {
            Ok(())
        } else {
            Err(ModelError::ModelNotFound(self.model.clone()))
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.base_url);
        let payload = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self
                .temperature
                .map(|temperature| GenerateOptions { temperature }),
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending prompt");
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;
        debug!(%status, elapsed_ms = started.elapsed().as_millis() as u64, "model answered");

        let body: Option<Value> = serde_json::from_str(&text).ok();
        let error = body
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if !status.is_success() {
            let detail = error.unwrap_or_else(|| text.trim().to_string());
            return Err(ModelError::Api(format!("{}: {}", status, detail)));
        }
        if let Some(error) = error {
            return Err(ModelError::Api(error));
        }

        let generated = body
            .as_ref()
            .and_then(|v| v.get("response"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string());

        Ok(generated.unwrap_or_else(|| text.trim().to_string()))
    }
}

/// `llama3` matches an installed `llama3:latest`; a tagged name must match exactly.
fn model_matches(wanted: &str, installed: &str) -> bool {
    if wanted == installed {
        return true;
    }
    !wanted.contains(':')
        && installed
            .split_once(':')
            .map(|(base, _)| base == wanted)
            .unwrap_or(false)
}

fn format_size(bytes: i64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as i64, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
