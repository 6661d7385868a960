use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub addon: AddonConfig,
    #[serde(default)]
    pub realdebrid: RealDebridConfig,
    #[serde(default)]
    pub kitsu: KitsuConfig,
    #[serde(default)]
    pub guessit: GuessitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub precache: PrecacheConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    7000
}

/// Addon identity advertised in the manifest.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AddonConfig {
    #[serde(default = "default_addon_id")]
    pub id: String,
    #[serde(default = "default_addon_name")]
    pub name: String,
    #[serde(default = "default_addon_version")]
    pub version: String,
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            id: default_addon_id(),
            name: default_addon_name(),
            version: default_addon_version(),
        }
    }
}

fn default_addon_id() -> String {
    "io.github.kingclutch23.carbone".to_string()
}

fn default_addon_name() -> String {
    "Carbone".to_string()
}

fn default_addon_version() -> String {
    "0.0.3".to_string()
}

/// Real-Debrid listing client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RealDebridConfig {
    /// API base URL (default: https://api.real-debrid.com/rest/1.0)
    #[serde(default = "default_realdebrid_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum downloads requested per listing (default: 200)
    #[serde(default = "default_listing_limit")]
    pub listing_limit: u32,
}

impl Default for RealDebridConfig {
    fn default() -> Self {
        Self {
            base_url: default_realdebrid_url(),
            timeout_secs: default_timeout(),
            listing_limit: default_listing_limit(),
        }
    }
}

fn default_realdebrid_url() -> String {
    "https://api.real-debrid.com/rest/1.0".to_string()
}

fn default_listing_limit() -> u32 {
    200
}

fn default_timeout() -> u64 {
    30
}

/// Kitsu title search configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KitsuConfig {
    /// API base URL (default: https://kitsu.io/api/edge)
    #[serde(default = "default_kitsu_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Results requested per query (default: 3)
    #[serde(default = "default_kitsu_page_limit")]
    pub page_limit: u32,
}

impl Default for KitsuConfig {
    fn default() -> Self {
        Self {
            base_url: default_kitsu_url(),
            timeout_secs: default_timeout(),
            page_limit: default_kitsu_page_limit(),
        }
    }
}

fn default_kitsu_url() -> String {
    "https://kitsu.io/api/edge".to_string()
}

fn default_kitsu_page_limit() -> u32 {
    3
}

/// OpenSubtitles guessit fallback configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuessitConfig {
    /// Use the remote fallback when the local heuristic fails.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// OpenSubtitles API key. The fallback is skipped when empty.
    #[serde(default)]
    pub api_key: String,
    /// API base URL (default: https://api.opensubtitles.com/api/v1)
    #[serde(default = "default_guessit_url")]
    pub base_url: String,
    /// Per-call timeout in seconds (default: 5)
    #[serde(default = "default_guessit_timeout")]
    pub timeout_secs: u64,
    /// Rate limit for remote calls (default: 5)
    #[serde(default = "default_guessit_rps")]
    pub requests_per_second: u32,
}

impl Default for GuessitConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            api_key: String::new(),
            base_url: default_guessit_url(),
            timeout_secs: default_guessit_timeout(),
            requests_per_second: default_guessit_rps(),
        }
    }
}

impl GuessitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_guessit_url() -> String {
    "https://api.opensubtitles.com/api/v1".to_string()
}

fn default_guessit_timeout() -> u64 {
    5
}

fn default_guessit_rps() -> u32 {
    5
}

/// Cache lifetimes and persistence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Directory holding identity.json and streams.json
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// TTL used when a caller does not pick one (default: 300)
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// TTL for resolved stream lists (default: 3600)
    #[serde(default = "default_stream_ttl_secs")]
    pub stream_ttl_secs: u64,
    /// TTL for memoized filename parses (default: 21600)
    #[serde(default = "default_parse_memo_ttl_secs")]
    pub parse_memo_ttl_secs: u64,
    /// Debounce window for stream snapshot writes (default: 1000)
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,
    /// Interval between identity snapshot writes (default: 900)
    #[serde(default = "default_identity_flush_interval_secs")]
    pub identity_flush_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            default_ttl_secs: default_ttl_secs(),
            stream_ttl_secs: default_stream_ttl_secs(),
            parse_memo_ttl_secs: default_parse_memo_ttl_secs(),
            persist_debounce_ms: default_persist_debounce_ms(),
            identity_flush_interval_secs: default_identity_flush_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn stream_ttl(&self) -> Duration {
        Duration::from_secs(self.stream_ttl_secs)
    }

    pub fn parse_memo_ttl(&self) -> Duration {
        Duration::from_secs(self.parse_memo_ttl_secs)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    pub fn identity_flush_interval(&self) -> Duration {
        Duration::from_secs(self.identity_flush_interval_secs)
    }

    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join("identity.json")
    }

    pub fn streams_path(&self) -> PathBuf {
        self.data_dir.join("streams.json")
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_stream_ttl_secs() -> u64 {
    3600
}

fn default_parse_memo_ttl_secs() -> u64 {
    6 * 3600
}

fn default_persist_debounce_ms() -> u64 {
    1000
}

fn default_identity_flush_interval_secs() -> u64 {
    15 * 60
}

/// Stream matcher tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatcherConfig {
    /// Records evaluated concurrently per batch (default: 10)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Stop scanning once this many candidates are found (default: 3)
    #[serde(default = "default_early_exit_threshold")]
    pub early_exit_threshold: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            early_exit_threshold: default_early_exit_threshold(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_early_exit_threshold() -> usize {
    3
}

/// Background precache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrecacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum tasks running at once (default: 2)
    #[serde(default = "default_precache_concurrency")]
    pub concurrency: usize,
    /// Episodes after the requested one to precache (default: 2)
    #[serde(default = "default_lookahead")]
    pub lookahead: u32,
    /// Recent downloads considered by a catalog preload (default: 50)
    #[serde(default = "default_preload_limit")]
    pub preload_limit: usize,
}

impl Default for PrecacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            concurrency: default_precache_concurrency(),
            lookahead: default_lookahead(),
            preload_limit: default_preload_limit(),
        }
    }
}

fn default_precache_concurrency() -> usize {
    2
}

fn default_lookahead() -> u32 {
    2
}

fn default_preload_limit() -> usize {
    50
}

/// Metrics summary logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Seconds between summary log lines (default: 60)
    #[serde(default = "default_summary_interval_secs")]
    pub summary_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            summary_interval_secs: default_summary_interval_secs(),
        }
    }
}

fn default_summary_interval_secs() -> u64 {
    60
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub addon: AddonConfig,
    pub realdebrid: RealDebridConfig,
    pub kitsu: KitsuConfig,
    pub guessit: SanitizedGuessitConfig,
    pub cache: CacheConfig,
    pub matcher: MatcherConfig,
    pub precache: PrecacheConfig,
    pub metrics: MetricsConfig,
}

/// Sanitized guessit config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGuessitConfig {
    pub enabled: bool,
    pub api_key_configured: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub requests_per_second: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            addon: config.addon.clone(),
            realdebrid: config.realdebrid.clone(),
            kitsu: config.kitsu.clone(),
            guessit: SanitizedGuessitConfig {
                enabled: config.guessit.enabled,
                api_key_configured: !config.guessit.api_key.is_empty(),
                base_url: config.guessit.base_url.clone(),
                timeout_secs: config.guessit.timeout_secs,
                requests_per_second: config.guessit.requests_per_second,
            },
            cache: config.cache.clone(),
            matcher: config.matcher.clone(),
            precache: config.precache.clone(),
            metrics: config.metrics.clone(),
        }
    }
}
