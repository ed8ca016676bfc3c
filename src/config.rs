use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::state::ServiceOptions;
use crate::store::feed::DEFAULT_FEED_CAPACITY;
use crate::stream::DEFAULT_STREAM_BUFFER;

pub const DEFAULT_PASSWORD_HASH_COST: u32 = 10;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backup_dir: PathBuf,
    pub feed_capacity: usize,
    pub stream_buffer: usize,
    pub password_hash_cost: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("APP_PORT must be a valid u16")?;

        let backup_dir = env::var("BACKUP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./backups"));

        let feed_capacity = env::var("FEED_CAPACITY")
            .map(|raw| raw.parse::<usize>())
            .unwrap_or(Ok(DEFAULT_FEED_CAPACITY))
            .context("FEED_CAPACITY must be a valid usize")?;

        let stream_buffer = env::var("STREAM_BUFFER")
            .map(|raw| raw.parse::<usize>())
            .unwrap_or(Ok(DEFAULT_STREAM_BUFFER))
            .context("STREAM_BUFFER must be a valid usize")?;

        let password_hash_cost = env::var("PASSWORD_HASH_COST")
            .map(|raw| raw.parse::<u32>())
            .unwrap_or(Ok(DEFAULT_PASSWORD_HASH_COST))
            .context("PASSWORD_HASH_COST must be a valid u32")?;

        Ok(Self {
            host,
            port,
            backup_dir,
            feed_capacity,
            stream_buffer,
            password_hash_cost: clamp_cost(password_hash_cost),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            backup_dir: self.backup_dir.clone(),
            stream_buffer: self.stream_buffer,
            password_hash_cost: self.password_hash_cost,
        }
    }
}

/// bcrypt only accepts costs in `4..=31`.
pub fn clamp_cost(cost: u32) -> u32 {
    cost.clamp(4, 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_is_clamped_to_bcrypt_range() {
        assert_eq!(clamp_cost(0), 4);
        assert_eq!(clamp_cost(12), 12);
        assert_eq!(clamp_cost(99), 31);
    }

    #[test]
    fn address_joins_host_and_port() {
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            backup_dir: PathBuf::from("./backups"),
            feed_capacity: DEFAULT_FEED_CAPACITY,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            password_hash_cost: DEFAULT_PASSWORD_HASH_COST,
        };
        assert_eq!(config.address(), "127.0.0.1:3000");
        assert_eq!(config.service_options().stream_buffer, DEFAULT_STREAM_BUFFER);
    }
}
