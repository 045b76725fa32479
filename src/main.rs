#[macro_use]
extern crate rocket;

mod auth;
mod catalog;
mod config;
mod db;
mod env;
mod error;
mod models;
mod routes;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use auth::unauthorized;
use config::{AppConfig, ConfigError};
use db::clean_expired_sessions;
use error::AppError;
use rocket::data::{Limits, ToByteUnit};
use rocket::{Build, Rocket, tokio};
use routes::{
    add_course_material, add_lesson_material, course_detail, create_course_page,
    create_lesson_page, enroll, health, index, login_page, logout, process_create_course,
    process_create_lesson, process_login, process_register, profile, register_page, search,
};
use telemetry::TelemetryFairing;
use telemetry::init_tracing;
use thiserror::Error;

use sqlx::SqlitePool;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Environment file error: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Launch error: {0}")]
    Rocket(#[from] rocket::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    let env_files = env::load_environment()?;
    let config = AppConfig::from_env()?;
    init_tracing(&config)?;
    env_files.log();

    std::fs::create_dir_all(&config.upload_dir)?;

    let pool = db::connect(&config.database_url).await?;

    info!("Running database migrations...");
    db::run_migrations(&pool).await?;
    info!("Migrations completed successfully");

    spawn_session_cleanup(pool.clone());

    let _rocket = init_rocket(pool, config).launch().await?;

    Ok(())
}

fn spawn_session_cleanup(pool: SqlitePool) {
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });
}

pub fn init_rocket(pool: SqlitePool, config: AppConfig) -> Rocket<Build> {
    info!("Starting course enrollment service");

    let upload_limit = config.max_upload_bytes.bytes();
    let figment = rocket::Config::figment().merge((
        "limits",
        Limits::default()
            .limit("data-form", upload_limit)
            .limit("file", upload_limit),
    ));

    rocket::custom(figment)
        .manage(pool)
        .manage(config)
        .mount(
            "/",
            routes![
                index,
                login_page,
                process_login,
                register_page,
                process_register,
                logout,
                profile,
                create_course_page,
                process_create_course,
                course_detail,
                enroll,
                create_lesson_page,
                process_create_lesson,
                add_course_material,
                add_lesson_material,
                search,
                health,
            ],
        )
        .register("/", catchers![unauthorized])
        .attach(TelemetryFairing)
}
