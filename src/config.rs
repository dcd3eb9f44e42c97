// Runtime settings with environment overrides

use std::path::PathBuf;
use std::time::Duration;

/// Default reachability check target for proxy probing.
const DEFAULT_PROBE_URL: &str = "https://api.ipify.org?format=json";

/// Everything the pipeline needs at construction time. The proxy pool is an
/// injected, read-mostly value so tests can supply deterministic pools.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding downloaded artifacts
    pub store_root: PathBuf,
    /// Artifact age after which the sweeper may delete it
    pub retention: Duration,
    /// Pause between sweep passes
    pub sweep_interval: Duration,
    /// Per-candidate proxy probe timeout
    pub probe_timeout: Duration,
    /// URL the prober hits through each candidate
    pub probe_url: String,
    /// Timeout for a single strategy's metadata probe
    pub metadata_timeout: Duration,
    /// Timeout for a single strategy's transfer
    pub transfer_timeout: Duration,
    /// Timeout for the external conversion call (longer: the service may queue)
    pub fallback_timeout: Duration,
    /// External conversion API endpoint; fallback disabled when absent
    pub fallback_endpoint: Option<String>,
    /// Candidate egress proxy addresses (e.g. "socks5h://10.0.0.1:1080")
    pub proxy_pool: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_root: std::env::temp_dir().join("yt_audio_artifacts"),
            retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(10),
            probe_url: DEFAULT_PROBE_URL.to_string(),
            metadata_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(300),
            fallback_timeout: Duration::from_secs(120),
            fallback_endpoint: None,
            proxy_pool: Vec::new(),
        }
    }
}

impl Settings {
    /// Defaults overlaid with environment variables. `PROXY_POOL` is a
    /// comma-separated list of proxy URLs.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(dir) = std::env::var("ARTIFACT_STORE_DIR") {
            settings.store_root = PathBuf::from(dir);
        }
        if let Some(secs) = env_secs("ARTIFACT_RETENTION_SECS") {
            settings.retention = secs;
        }
        if let Some(secs) = env_secs("ARTIFACT_SWEEP_SECS") {
            settings.sweep_interval = secs;
        }
        if let Ok(url) = std::env::var("PROXY_PROBE_URL") {
            settings.probe_url = url;
        }
        if let Ok(endpoint) = std::env::var("CONVERT_API_URL") {
            if !endpoint.is_empty() {
                settings.fallback_endpoint = Some(endpoint);
            }
        }
        if let Ok(pool) = std::env::var("PROXY_POOL") {
            settings.proxy_pool = pool
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        settings
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
