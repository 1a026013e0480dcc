use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    /// Number of concurrent ingestion workers pulling from the job store.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_delay_ms")]
    pub backoff_delay_ms: u64,
    /// Purge terminally failed jobs instead of retaining them for inspection.
    #[serde(default)]
    pub remove_on_fail: bool,
    /// How long a claimed job stays invisible before a crashed worker's
    /// claim is considered abandoned.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: i64,
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

fn default_worker_count() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_delay_ms() -> u64 {
    5000
}

fn default_lease_secs() -> i64 {
    300
}

fn default_idle_poll_ms() -> u64 {
    500
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_optional_knobs() {
        let config: AppConfig = Config::builder()
            .set_override("surrealdb_address", "ws://localhost:8000")
            .and_then(|b| b.set_override("surrealdb_username", "root"))
            .and_then(|b| b.set_override("surrealdb_password", "root"))
            .and_then(|b| b.set_override("surrealdb_namespace", "docs"))
            .and_then(|b| b.set_override("surrealdb_database", "docs"))
            .expect("overrides")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");

        assert_eq!(config.worker_count, 2);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_delay_ms, 5000);
        assert!(!config.remove_on_fail);
        assert_eq!(config.lease_secs, 300);
        assert_eq!(config.idle_poll_ms, 500);
    }
}
