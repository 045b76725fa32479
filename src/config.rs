//! Application settings read from the process environment.
//!
//! Rocket's own settings (address, port, secret key) stay in Rocket's figment
//! and are configured through `Rocket.toml` or `ROCKET_*` variables.

use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://course_enrollment.db";
pub const DEFAULT_UPLOAD_DIR: &str = "static/uploads";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub session_ttl_hours: i64,
    pub otlp_endpoint: Option<String>,
    pub telemetry_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            otlp_endpoint: None,
            telemetry_api_key: None,
        }
    }
}

impl AppConfig {
    /// Reads every setting from the environment, falling back to the defaults
    /// for anything unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = non_empty_var("DATABASE_URL").unwrap_or(defaults.database_url);

        let upload_dir = non_empty_var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);

        let max_upload_bytes = match non_empty_var("MAX_UPLOAD_BYTES") {
            Some(raw) => parse_var("MAX_UPLOAD_BYTES", &raw)?,
            None => defaults.max_upload_bytes,
        };

        let session_ttl_hours = match non_empty_var("SESSION_TTL_HOURS") {
            Some(raw) => {
                let hours: i64 = parse_var("SESSION_TTL_HOURS", &raw)?;
                if !(1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
                    return Err(ConfigError::InvalidValue(
                        "SESSION_TTL_HOURS".to_string(),
                        format!(
                            "'{}' must be between 1 and {} hours",
                            raw, MAX_SESSION_TTL_HOURS
                        ),
                    ));
                }
                hours
            }
            None => defaults.session_ttl_hours,
        };

        Ok(Self {
            database_url,
            upload_dir,
            max_upload_bytes,
            session_ttl_hours,
            otlp_endpoint: non_empty_var("OTEL_EXPORTER_OTLP_ENDPOINT"),
            telemetry_api_key: non_empty_var("TELEMETRY_API_KEY"),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| {
        ConfigError::InvalidValue(name.to_string(), format!("'{}' is not a valid number", raw))
    })
}
