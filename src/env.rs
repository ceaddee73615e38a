use std::path::Path;

use tracing::{info, warn};

use crate::error::AppError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://student_records.db?mode=rwc";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Which env files were applied and which were absent. Loading happens before
/// the tracing subscriber exists, so the caller logs this afterwards.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvReport {
    pub loaded: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

impl EnvReport {
    pub fn log(&self) {
        for path in &self.loaded {
            info!("Loaded environment from: {}", path);
        }
        for path in &self.skipped {
            warn!("Environment file {} not found, skipped", path);
        }
    }
}

pub fn load_environment() -> Result<EnvReport, dotenvy::Error> {
    let is_production =
        dotenvy::var("APP_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        ["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        ["config/common.env", "config/dev.env", ".secrets.env"]
    };

    let mut report = EnvReport::default();
    for env_file in env_files {
        if load_env_file(env_file)? {
            report.loaded.push(env_file);
        } else {
            report.skipped.push(env_file);
        }
    }

    Ok(report)
}

/// Returns false when the file does not exist.
fn load_env_file(path: &str) -> Result<bool, dotenvy::Error> {
    if !Path::new(path).exists() {
        return Ok(false);
    }

    dotenvy::from_filename_override(path)?;
    Ok(true)
}

/// Process settings, read once at startup after [`load_environment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    pub otlp_endpoint: Option<String>,
    pub otlp_api_key: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            non_empty_var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let max_connections = match non_empty_var("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) | Err(_) => {
                    return Err(AppError::Validation(format!(
                        "DATABASE_MAX_CONNECTIONS must be a positive integer, got '{}'",
                        raw
                    )));
                }
                Ok(n) => n,
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            max_connections,
            otlp_endpoint: non_empty_var("OTEL_EXPORTER_OTLP_ENDPOINT"),
            otlp_api_key: non_empty_var("OTEL_EXPORTER_API_KEY"),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
