use serde::Deserialize;
use std::path::Path;

/// Top-level config loaded from `slowlog.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SyncConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncOptions,
}

/// Admin API credentials and query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub access_key_secret: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Override the derived `https://rds.{region}.aliyuncs.com` endpoint.
    pub endpoint: Option<String>,
    /// Restrict the slow-log fetch to one database. `None` fetches all.
    pub db_name: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            access_key_secret: String::new(),
            region: default_region(),
            endpoint: None,
            db_name: None,
            page_size: default_page_size(),
        }
    }
}

fn default_region() -> String {
    "cn-hangzhou".to_string()
}

fn default_page_size() -> u32 {
    30
}

impl ApiConfig {
    pub fn base_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://rds.{}.aliyuncs.com", self.region))
    }
}

/// Log store connection details.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,
    #[serde(default = "default_store_port")]
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Base name for daily partitions (`{index_base}-YYYY.MM.DD`).
    #[serde(default = "default_index_base")]
    pub index_base: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            port: default_store_port(),
            protocol: default_protocol(),
            username: None,
            password: None,
            index_base: default_index_base(),
        }
    }
}

fn default_hosts() -> Vec<String> {
    vec!["localhost".to_string()]
}

fn default_store_port() -> u16 {
    9200
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_index_base() -> String {
    "slowlog".to_string()
}

/// What to do when a single record fails to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WriteFailurePolicy {
    /// Terminate the whole run on the first failed write (the conservative
    /// default: slow-query logs are treated as required, not best-effort).
    #[default]
    AbortRun,
    /// Log and move on to the next record.
    SkipRecord,
    /// Log and abandon the current instance, continue with the next one.
    SkipInstance,
}

/// Tuning for the sync pass itself.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncOptions {
    /// Fixed operator-timezone offset used for daily partition naming.
    /// A deployment constant, not auto-detected.
    #[serde(default = "default_offset_hours")]
    pub local_offset_hours: i32,
    /// Cold-start lookback: fetch from N days back, truncated to midnight UTC.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Query windows end at now minus this lag, so the remote API has had
    /// time to flush the current minute.
    #[serde(default = "default_sixty")]
    pub end_lag_secs: i64,
    /// The resume watermark is the last stored timestamp plus this step.
    #[serde(default = "default_sixty")]
    pub watermark_step_secs: i64,
    #[serde(default)]
    pub write_failure: WriteFailurePolicy,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            local_offset_hours: default_offset_hours(),
            lookback_days: default_lookback_days(),
            end_lag_secs: default_sixty(),
            watermark_step_secs: default_sixty(),
            write_failure: WriteFailurePolicy::default(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_offset_hours() -> i32 {
    8
}

fn default_lookback_days() -> i64 {
    1
}

fn default_sixty() -> i64 {
    60
}

fn default_timeout_secs() -> u64 {
    30
}

impl SyncConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Secrets can come from the environment instead of the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SLOWLOG_ACCESS_KEY_ID") {
            self.api.access_key_id = v;
        }
        if let Ok(v) = std::env::var("SLOWLOG_ACCESS_KEY_SECRET") {
            self.api.access_key_secret = v;
        }
        if let Ok(v) = std::env::var("SLOWLOG_STORE_USER") {
            self.store.username = Some(v);
        }
        if let Ok(v) = std::env::var("SLOWLOG_STORE_PASSWORD") {
            self.store.password = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.api.page_size, 30);
        assert_eq!(cfg.api.base_url(), "https://rds.cn-hangzhou.aliyuncs.com");
        assert_eq!(cfg.store.port, 9200);
        assert_eq!(cfg.store.index_base, "slowlog");
        assert_eq!(cfg.sync.local_offset_hours, 8);
        assert_eq!(cfg.sync.write_failure, WriteFailurePolicy::AbortRun);
    }

    #[test]
    fn test_parse_toml() {
        let cfg: SyncConfig = toml::from_str(
            r#"
            [api]
            access_key_id = "ak"
            access_key_secret = "sk"
            region = "cn-shenzhen"
            db_name = "orders"

            [store]
            hosts = ["es-1", "es-2"]
            protocol = "https"
            index_base = "slow_sql"

            [sync]
            write_failure = "skip-record"
            local_offset_hours = 9
            "#,
        )
        .unwrap();
        assert_eq!(cfg.api.region, "cn-shenzhen");
        assert_eq!(cfg.api.db_name.as_deref(), Some("orders"));
        assert_eq!(cfg.api.base_url(), "https://rds.cn-shenzhen.aliyuncs.com");
        assert_eq!(cfg.store.hosts, vec!["es-1", "es-2"]);
        assert_eq!(cfg.store.index_base, "slow_sql");
        assert_eq!(cfg.sync.write_failure, WriteFailurePolicy::SkipRecord);
        assert_eq!(cfg.sync.local_offset_hours, 9);
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.sync.end_lag_secs, 60);
    }
}
