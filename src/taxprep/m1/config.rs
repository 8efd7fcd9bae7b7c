//! Runtime configuration read from the process environment.

use std::path::PathBuf;
use std::str::FromStr;

use crate::taxprep::m1::error::{AssistantError, Result};
use crate::taxprep::m1::provider::{ProviderConfig, anthropic};
use crate::taxprep::m1::workpaper::DEFAULT_OUTPUT_DIR;

/// Environment variable holding the model credential.
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const BASE_URL_VAR: &str = "ANTHROPIC_BASE_URL";
pub const MODEL_VAR: &str = "M1_MODEL";
pub const MAX_TURNS_VAR: &str = "M1_MAX_TURNS";
pub const OUTPUT_DIR_VAR: &str = "M1_OUTPUT_DIR";
pub const TIMEOUT_VAR: &str = "M1_TIMEOUT_SECS";

const DOTENV_FILE: &str = ".env";
const DEFAULT_MAX_TURNS: usize = 8;
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Assistant configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential for the hosted model.
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Upper bound on model round trips per run.
    pub max_turns: usize,
    /// Directory the working paper is written to unless the model names one.
    pub output_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Config {
    /// Loads configuration from the environment, after reading a `.env` file
    /// from the working directory when one exists.
    pub fn from_env() -> Result<Self> {
        check_dotenv(dotenvy::dotenv().map(|_| ()))?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key =
            read(API_KEY_VAR).ok_or_else(|| AssistantError::MissingCredential(API_KEY_VAR.into()))?;

        Ok(Self {
            api_key,
            base_url: read(BASE_URL_VAR).unwrap_or_else(|| anthropic::DEFAULT_BASE_URL.into()),
            model: read(MODEL_VAR).unwrap_or_else(|| anthropic::DEFAULT_MODEL.into()),
            max_turns: parse_or(MAX_TURNS_VAR, read(MAX_TURNS_VAR), DEFAULT_MAX_TURNS)?,
            output_dir: read(OUTPUT_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            timeout_secs: parse_or(TIMEOUT_VAR, read(TIMEOUT_VAR), DEFAULT_TIMEOUT_SECS)?,
        })
    }

    /// Connection settings for the model client.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::anthropic(&self.api_key)
            .with_base_url(&self.base_url)
            .with_model(&self.model)
            .with_timeout(self.timeout_secs)
    }
}

/// A missing `.env` file is the normal case; one that fails to parse is not.
fn check_dotenv(loaded: std::result::Result<(), dotenvy::Error>) -> Result<()> {
    match loaded {
        Ok(()) => Ok(()),
        Err(error) if error.not_found() => Ok(()),
        Err(error) => Err(AssistantError::InvalidConfig {
            key: DOTENV_FILE.to_string(),
            value: error.to_string(),
        }),
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| AssistantError::InvalidConfig {
            key: key.to_string(),
            value: raw,
        }),
    }
}
