// config.rs
use anyhow::{anyhow, Result};
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use tracing::Level;

#[derive(Debug, Clone)]
pub struct ResyncConfig {
    pub database_url: String,
    pub db_max_conn: u32,
    pub storage_root: PathBuf,
    pub read_concurrency: usize,
    /// Unset or zero disables the periodic pass.
    pub resync_interval: Option<Duration>,
    pub resync_on_start: bool,
    pub host: String,
    pub port: u16,
    pub log_level: Level,
}

impl ResyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the config from any variable source. Unparseable numbers fall
    /// back to their defaults; a non-SQLite database URL is an error.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = var("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://data/catalog.db?mode=rwc".to_string());
        if !database_url.starts_with("sqlite:") {
            return Err(anyhow!("Invalid DATABASE_URL: must start with 'sqlite:'"));
        }

        let parsed = |key: &str| var(key).and_then(|v| v.trim().parse::<u64>().ok());

        Ok(Self {
            database_url,
            db_max_conn: parsed("DB_MAX_CONN").and_then(|v| u32::try_from(v).ok()).unwrap_or(10),
            storage_root: PathBuf::from(var("STORAGE_ROOT").unwrap_or_else(|| "./backup_storage".into())),
            read_concurrency: parsed("RESYNC_READ_CONCURRENCY")
                .map(|v| v.max(1) as usize)
                .unwrap_or(8),
            resync_interval: parsed("RESYNC_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            resync_on_start: var("RESYNC_ON_START").map_or(true, |v| parse_flag(&v)),
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: var("PORT").and_then(|v| v.parse::<u16>().ok()).unwrap_or(3000),
            log_level: var("LOG_LEVEL")
                .and_then(|v| Level::from_str(v.trim()).ok())
                .unwrap_or(Level::INFO),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(v: &str) -> bool {
    !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<ResyncConfig> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ResyncConfig::from_vars(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.database_url, "sqlite://data/catalog.db?mode=rwc");
        assert_eq!(cfg.db_max_conn, 10);
        assert_eq!(cfg.storage_root, PathBuf::from("./backup_storage"));
        assert_eq!(cfg.read_concurrency, 8);
        assert_eq!(cfg.resync_interval, None);
        assert!(cfg.resync_on_start);
        assert_eq!(cfg.listen_addr(), "127.0.0.1:3000");
        assert_eq!(cfg.log_level, Level::INFO);
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("RESYNC_READ_CONCURRENCY", "0"),
            ("RESYNC_INTERVAL_SECS", "60"),
            ("RESYNC_ON_START", "false"),
            ("PORT", "8080"),
            ("LOG_LEVEL", "debug"),
            ("DB_MAX_CONN", "not-a-number"),
        ])
        .unwrap();
        assert_eq!(cfg.read_concurrency, 1);
        assert_eq!(cfg.resync_interval, Some(Duration::from_secs(60)));
        assert!(!cfg.resync_on_start);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.log_level, Level::DEBUG);
        assert_eq!(cfg.db_max_conn, 10);
    }

    #[test]
    fn zero_interval_disables_periodic_pass() {
        let cfg = config(&[("RESYNC_INTERVAL_SECS", "0")]).unwrap();
        assert_eq!(cfg.resync_interval, None);
    }

    #[test]
    fn rejects_non_sqlite_database() {
        assert!(config(&[("DATABASE_URL", "postgres://localhost/db")]).is_err());
    }
}
