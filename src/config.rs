use crate::logs::store::StoreConfig;
use crate::logs::source::MAX_PAGE_SIZE;
use dotenvy::dotenv;
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub owner_id: Option<u64>,
    pub dev_guild_id: Option<u64>,
    pub status_message: String,

    // Archive settings
    pub archive_dir: PathBuf,
    pub archive_passphrase: Option<String>,
    pub archive_retention: Duration,
    pub archive_sweep_interval_secs: u64,
    pub require_opt_in: bool,

    // Sync settings
    pub fast_path_threshold_secs: u64,
    pub progress_interval_ms: u64,
    pub fetch_chunk_size: usize,

    pub command_cache_capacity: usize,
}

const DEFAULT_RETENTION: Duration = Duration::from_secs(90 * 24 * 3600);

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Counting messages".to_string()),
            archive_dir: env::var("ARCHIVE_DIR")
                .unwrap_or_else(|_| "logs".to_string())
                .into(),
            archive_passphrase: env::var("ARCHIVE_PASSPHRASE")
                .ok()
                .filter(|p| !p.is_empty()),
            archive_retention: match env::var("ARCHIVE_RETENTION") {
                Ok(raw) => humantime::parse_duration(&raw).map_err(|e| {
                    anyhow::anyhow!("ARCHIVE_RETENTION must be a duration like 90days: {}", e)
                })?,
                Err(_) => DEFAULT_RETENTION,
            },
            archive_sweep_interval_secs: env::var("ARCHIVE_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .unwrap_or(3600),
            require_opt_in: env::var("REQUIRE_OPT_IN")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            fast_path_threshold_secs: env::var("FAST_PATH_THRESHOLD_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .unwrap_or(3600),
            progress_interval_ms: env::var("PROGRESS_INTERVAL_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            fetch_chunk_size: env::var("FETCH_CHUNK_SIZE")
                .unwrap_or_else(|_| MAX_PAGE_SIZE.to_string())
                .parse::<usize>()
                .unwrap_or(MAX_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            command_cache_capacity: env::var("COMMAND_CACHE_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .unwrap_or(256),
        })
    }

    /// Users allowed past permission checks, on top of the application owner.
    pub fn owners(&self) -> HashSet<u64> {
        self.owner_id.into_iter().collect()
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            dir: self.archive_dir.clone(),
            passphrase: self.archive_passphrase.clone(),
            retention: self.archive_retention,
            fast_threshold: Duration::from_secs(self.fast_path_threshold_secs),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            chunk_size: self.fetch_chunk_size,
            require_opt_in: self.require_opt_in,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("status_message", &self.status_message)
            .field("archive_dir", &self.archive_dir)
            .field(
                "archive_passphrase",
                &self.archive_passphrase.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "archive_retention",
                &humantime::format_duration(self.archive_retention).to_string(),
            )
            .field(
                "archive_sweep_interval_secs",
                &self.archive_sweep_interval_secs,
            )
            .field("require_opt_in", &self.require_opt_in)
            .field("fast_path_threshold_secs", &self.fast_path_threshold_secs)
            .field("progress_interval_ms", &self.progress_interval_ms)
            .field("fetch_chunk_size", &self.fetch_chunk_size)
            .field("command_cache_capacity", &self.command_cache_capacity)
            .finish()
    }
}
