use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    /// Absent means the in-memory document store is used.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub fetch_timeout_secs: u64,
    pub activity_recent_window_secs: i64,
    pub activity_max_entries: usize,
    pub seed_file: Option<String>,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Default for Config {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:8080".to_string(),
            database_url: None,
            jwt_secret: String::new(),
            fetch_timeout_secs: 10,
            activity_recent_window_secs: 3600,
            activity_max_entries: 200,
            seed_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let defaults = Config::default();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_optional_env("DATABASE_URL"),
            jwt_secret: get_env("JWT_SECRET")?,
            fetch_timeout_secs: get_env_parse_or("FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs)?,
            activity_recent_window_secs: get_env_parse_or(
                "ACTIVITY_RECENT_WINDOW_SECS",
                defaults.activity_recent_window_secs,
            )?,
            activity_max_entries: get_env_parse_or(
                "ACTIVITY_MAX_ENTRIES",
                defaults.activity_max_entries,
            )?,
            seed_file: get_optional_env("SEED_FILE"),
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        None => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
