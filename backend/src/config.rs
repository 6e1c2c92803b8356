use std::env;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::pipeline::PipelineConfig;

pub const PIPELINE_CONFIG_VAR: &str = "PIPELINE_CONFIG";
const BUNDLED_CONFIG: &str = "config/pipeline.yaml";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("environment variable {name} has invalid value {value:?}")]
    Env { name: &'static str, value: String },
}

/// Server settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub apply_softmax: bool,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            model_path: PathBuf::from("models/classifier.pt"),
            apply_softmax: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind_address: lookup("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            port: parse_var(&lookup, "PORT")?.unwrap_or(defaults.port),
            model_path: lookup("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            apply_softmax: parse_var(&lookup, "MODEL_APPLY_SOFTMAX")?
                .unwrap_or(defaults.apply_softmax),
            max_upload_bytes: parse_var(&lookup, "MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
        })
    }

    pub fn bind_target(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { name, value }),
    }
}

/// `PIPELINE_CONFIG` if set, otherwise the first bundled config found
/// (`$CARGO_MANIFEST_DIR/../config/pipeline.yaml`, then `config/pipeline.yaml`
/// under the working directory), otherwise built-in defaults.
pub fn load_pipeline_config() -> Result<PipelineConfig, ConfigError> {
    load_pipeline_config_from(|name| env::var(name).ok())
}

pub fn load_pipeline_config_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PipelineConfig, ConfigError> {
    if let Some(path) = lookup(PIPELINE_CONFIG_VAR) {
        log::info!("Loading pipeline configuration from {}", path);
        return PipelineConfig::from_file(Path::new(&path));
    }

    for candidate in bundled_config_paths(&lookup) {
        if candidate.is_file() {
            log::info!("Loading pipeline configuration from {}", candidate.display());
            return PipelineConfig::from_file(&candidate);
        }
    }

    log::warn!("No pipeline configuration found, using defaults");
    Ok(PipelineConfig::default())
}

fn bundled_config_paths(lookup: &impl Fn(&str) -> Option<String>) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(2);
    if let Some(manifest_dir) = lookup("CARGO_MANIFEST_DIR") {
        paths.push(Path::new(&manifest_dir).join("../config/pipeline.yaml"));
    }
    paths.push(PathBuf::from(BUNDLED_CONFIG));
    paths
}
