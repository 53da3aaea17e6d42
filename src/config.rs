use std::env;

use anyhow::{anyhow, Result};

use crate::completion::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::endpoints::parse_endpoint_order;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub max_bytes: Option<u64>,
    pub keep: usize,
    pub compress: bool,
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: Option<String>,
    pub service_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub completion: CompletionConfig,
    pub store: StoreConfig,
    pub endpoint_order: Vec<String>,
    pub cors_origins: Option<Vec<String>>,
    pub max_request_bytes: Option<usize>,
    pub log_file: Option<String>,
    pub rotation: RotationConfig,
    pub log_stdout: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let completion = CompletionConfig {
            api_key: non_empty_env("OPENAI_API_KEY"),
            base_url: non_empty_env("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: non_empty_env("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        // The MY_ prefixed names are what older deployments set.
        let store = StoreConfig {
            url: non_empty_env("SUPABASE_URL").or_else(|| non_empty_env("MY_SUPABASE_URL")),
            service_key: non_empty_env("SUPABASE_SERVICE_ROLE_KEY")
                .or_else(|| non_empty_env("MY_SUPABASE_SERVICE_ROLE_KEY")),
        };

        let endpoint_order = parse_endpoint_order();

        let cors_origins = non_empty_env("PROMPTRELAY_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty() && *s != "*")
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty());

        let rotation = RotationConfig {
            max_bytes: parse_optional_u64("LOG_MAX_BYTES")?,
            keep: parse_optional_u64("LOG_ROTATE_KEEP")?.unwrap_or(1) as usize,
            compress: parse_bool_env("LOG_ROTATE_COMPRESS")?.unwrap_or(false),
        };

        Ok(Self {
            port: parse_port()?,
            completion,
            store,
            endpoint_order,
            cors_origins,
            max_request_bytes: parse_optional_u64("PROMPTRELAY_MAX_REQUEST_BYTES")?
                .map(|v| v as usize),
            log_file: non_empty_env("LOG_FILE"),
            rotation,
            log_stdout: parse_bool_env("PROMPTRELAY_LOG_STDOUT")?.unwrap_or(false),
        })
    }
}

impl Default for AppConfig {
    /// Every endpoint, no credentials, in-memory store, no telemetry file.
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            completion: CompletionConfig {
                api_key: None,
                base_url: DEFAULT_BASE_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
            },
            store: StoreConfig {
                url: None,
                service_key: None,
            },
            endpoint_order: crate::endpoints::default_order(),
            cors_origins: None,
            max_request_bytes: None,
            log_file: None,
            rotation: RotationConfig {
                max_bytes: None,
                keep: 1,
                compress: false,
            },
            log_stdout: false,
        }
    }
}

fn parse_port() -> Result<u16> {
    match parse_optional_u64("PORT")? {
        Some(port) => u16::try_from(port).map_err(|_| anyhow!("PORT must be between 0 and 65535")),
        None => Ok(DEFAULT_PORT),
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
