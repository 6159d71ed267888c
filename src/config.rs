use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Server settings, read from `INNKEEP_*` environment variables.
/// Unset or unparseable values fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    /// WAL appends since the last compaction before the compactor rewrites the log.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            password: "innkeep".into(),
            max_connections: 256,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            metrics_port: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: parsed(&lookup, "INNKEEP_PORT").unwrap_or(defaults.port),
            bind: lookup("INNKEEP_BIND").unwrap_or(defaults.bind),
            data_dir: lookup("INNKEEP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            password: lookup("INNKEEP_PASSWORD").unwrap_or(defaults.password),
            max_connections: parsed(&lookup, "INNKEEP_MAX_CONNECTIONS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.max_connections),
            compact_threshold: parsed(&lookup, "INNKEEP_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            // A zero period would make the compactor's interval panic.
            compact_interval: parsed(&lookup, "INNKEEP_COMPACT_INTERVAL_SECS")
                .filter(|&secs: &u64| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
            metrics_port: parsed(&lookup, "INNKEEP_METRICS_PORT"),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("innkeep.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.parse().ok())
}
