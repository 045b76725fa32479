//! Layered `.env` files, applied to the process environment before
//! [`crate::config::AppConfig::from_env`] reads it. Later files override
//! earlier ones.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Outcome of [`load_environment`]. Tracing is not installed yet when the
/// files are read, so the report is logged afterwards.
#[derive(Debug, Default)]
pub struct EnvFiles {
    pub loaded: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

impl EnvFiles {
    pub fn log(&self) {
        for path in &self.loaded {
            info!(path = %path.display(), "Loaded environment file");
        }
        for path in &self.skipped {
            warn!(path = %path.display(), "Environment file not found, skipped");
        }
    }
}

pub fn env_files(profile: &str) -> [&'static str; 3] {
    if profile == "production" {
        ["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        ["config/common.env", "config/dev.env", ".secrets.env"]
    }
}

pub fn load_environment() -> Result<EnvFiles, dotenvy::Error> {
    let profile = dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());
    load_from(Path::new("."), &profile)
}

pub fn load_from(root: &Path, profile: &str) -> Result<EnvFiles, dotenvy::Error> {
    let mut report = EnvFiles::default();

    for file in env_files(profile) {
        let path = root.join(file);
        if path.is_file() {
            dotenvy::from_filename_override(&path)?;
            report.loaded.push(path);
        } else {
            report.skipped.push(path);
        }
    }

    Ok(report)
}
