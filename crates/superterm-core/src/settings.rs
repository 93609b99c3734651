use crate::models::{ModelError, OllamaClient};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_ENDPOINT: &str = "localhost:11434";
const DEFAULT_MODEL: &str = "llama3";
const ENV_PREFIX: &str = "SUPERTERM_";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("endpoint is empty")]
    Endpoint,
    #[error("model name is empty")]
    Model,
    #[error("timeout must be greater than zero")]
    Timeout,
    #[error("context and capture limits must be greater than zero")]
    Limits,
    #[error("model server is not reachable")]
    EndpointUnreachable,
    #[error("model is not installed on the model server")]
    ModelNotFound,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not determine a configuration directory")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub context_limit: usize,
    pub capture_limit: usize,
    pub history_size: usize,
    #[serde(default)]
    pub interactive_programs: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 300,
            temperature: None,
            context_limit: 8000,
            capture_limit: 10000,
            history_size: 1000,
            interactive_programs: Vec::new(),
        }
    }
}

impl Settings {
    /// Location of the per-user config file, e.g. `~/.config/superterm/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "superterm").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Layers defaults, the TOML file and `SUPERTERM_*` environment variables.
    ///
    /// A missing file is fine; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        let file = path.map(Path::to_path_buf).or_else(Self::default_path);
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }

        let settings = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Endpoint as a URL without a trailing slash.
    pub fn base_url(&self) -> String {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        if endpoint.starts_with("http") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        }
    }

    pub fn is_valid(&self) -> Result<(), ValidationError> {
        if self.endpoint.trim().is_empty() {
            return Err(ValidationError::Endpoint);
        }
        if self.model.trim().is_empty() {
            return Err(ValidationError::Model);
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::Timeout);
        }
        if self.context_limit == 0 || self.capture_limit == 0 {
            return Err(ValidationError::Limits);
        }
        Ok(())
    }

    pub async fn validate_endpoint(&self) -> Result<(), ValidationError> {
        self.is_valid()?;

        let client = OllamaClient::new(self);
        client.check_availability().await.map_err(|e| match e {
            ModelError::ModelNotFound(_) => ValidationError::ModelNotFound,
            _ => ValidationError::EndpointUnreachable,
        })
    }
}
