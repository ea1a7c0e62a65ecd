//! Configuration types for tube-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Where artifacts live and how many jobs may run at once
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Artifact store root (default: "./downloads")
    #[serde(default = "default_download_dir")]
    #[schema(value_type = String)]
    pub download_dir: PathBuf,

    /// Maximum concurrently running extractions (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_jobs: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_jobs: default_max_concurrent(),
        }
    }
}

/// yt-dlp location, format selectors and the Running time budget
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtractorConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Format selector for audio jobs (default: "bestaudio")
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Format selector for video jobs (default: "best[height<=720]")
    #[serde(default = "default_video_format")]
    pub video_format: String,

    /// Upper bound on a job's Running duration, retries included (default: 600 seconds)
    #[serde(default = "default_running_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub running_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            search_path: true,
            audio_format: default_audio_format(),
            video_format: default_video_format(),
            running_timeout: default_running_timeout(),
        }
    }
}

/// Retry configuration for transient extractor failures
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retries after the first call (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Artifact and registry retention policy
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetentionConfig {
    /// How long a committed artifact is kept (default: 24 hours)
    #[serde(default = "default_artifact_ttl", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub artifact_ttl: Duration,

    /// How long a Failed/Expired job stays queryable (default: 1 hour)
    #[serde(default = "default_registry_ttl", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub registry_ttl: Duration,

    /// Total artifact bytes budget (None = unlimited)
    #[serde(default)]
    pub storage_quota_bytes: Option<u64>,

    /// Interval between background sweeps (default: 300 seconds)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            artifact_ttl: default_artifact_ttl(),
            registry_ttl: default_registry_ttl(),
            storage_quota_bytes: None,
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// API server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:8000)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Optional API key required by `/song` and `/video`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for [`JobOrchestrator`](crate::JobOrchestrator)
///
/// `download` and `server` are flattened so their fields sit at the top
/// level of the JSON document; `extractor`, `retry` and `retention` are
/// nested objects.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Store root and concurrency
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// yt-dlp settings
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Retention and garbage collection
    #[serde(default)]
    pub retention: RetentionConfig,

    /// API server settings
    #[serde(flatten)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Artifact store root
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Load a config from a JSON file, filling every missing field with its default
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        Ok(config)
    }

    /// Apply the binary's environment overrides
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    /// Recognized names: `API_KEY`, `PORT`, `BIND_ADDRESS`, `DOWNLOAD_DIR`,
    /// `YTDLP_PATH`. `PORT` is applied after `BIND_ADDRESS` and only replaces
    /// the port.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("API_KEY").filter(|k| !k.is_empty()) {
            self.server.api.api_key = Some(key);
        }

        if let Some(addr) = lookup("BIND_ADDRESS") {
            self.server.api.bind_address = addr.parse().map_err(|e| Error::Config {
                message: format!("invalid BIND_ADDRESS {addr:?}: {e}"),
                key: Some("bind_address".to_string()),
            })?;
        }

        if let Some(port) = lookup("PORT") {
            let port: u16 = port.trim().parse().map_err(|e| Error::Config {
                message: format!("invalid PORT {port:?}: {e}"),
                key: Some("bind_address".to_string()),
            })?;
            self.server.api.bind_address.set_port(port);
        }

        if let Some(dir) = lookup("DOWNLOAD_DIR") {
            self.download.download_dir = PathBuf::from(dir);
        }

        if let Some(path) = lookup("YTDLP_PATH") {
            self.extractor.ytdlp_path = Some(PathBuf::from(path));
        }

        Ok(())
    }

    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_jobs == 0 {
            return Err(Error::Config {
                message: "max_concurrent_jobs must be at least 1".to_string(),
                key: Some("max_concurrent_jobs".to_string()),
            });
        }
        if self.extractor.running_timeout.is_zero() {
            return Err(Error::Config {
                message: "running_timeout must be greater than zero".to_string(),
                key: Some("extractor.running_timeout".to_string()),
            });
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff_multiplier must be a finite number >= 1.0".to_string(),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if self.retention.sweep_interval.is_zero() {
            return Err(Error::Config {
                message: "sweep_interval must be greater than zero".to_string(),
                key: Some("retention.sweep_interval".to_string()),
            });
        }
        if self.server.api.api_key.as_deref() == Some("") {
            return Err(Error::Config {
                message: "api_key must not be empty (omit it to disable auth)".to_string(),
                key: Some("api_key".to_string()),
            });
        }
        Ok(())
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_audio_format() -> String {
    "bestaudio".to_string()
}

fn default_video_format() -> String {
    "best[height<=720]".to_string()
}

fn default_running_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_artifact_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_registry_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").expect("empty object should parse");

        assert_eq!(config.download.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.download.max_concurrent_jobs, 3);
        assert_eq!(config.extractor.audio_format, "bestaudio");
        assert_eq!(config.extractor.video_format, "best[height<=720]");
        assert_eq!(config.extractor.running_timeout, Duration::from_secs(600));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retention.artifact_ttl, Duration::from_secs(86_400));
        assert_eq!(config.retention.storage_quota_bytes, None);
        assert_eq!(config.server.api.bind_address.port(), 8000);
        assert!(config.server.api.api_key.is_none());
        config.validate().expect("defaults must validate");
    }

    #[test]
    fn durations_are_seconds_on_the_wire() {
        let config: Config = serde_json::from_str(
            r#"{
                "download_dir": "/srv/media",
                "api_key": "secret",
                "retry": { "initial_delay": 5, "max_delay": 120 },
                "retention": { "artifact_ttl": 60, "storage_quota_bytes": 1048576 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.download.download_dir, PathBuf::from("/srv/media"));
        assert_eq!(config.server.api.api_key.as_deref(), Some("secret"));
        assert_eq!(config.retry.initial_delay, Duration::from_secs(5));
        assert_eq!(config.retry.max_delay, Duration::from_secs(120));
        assert_eq!(config.retry.max_retries, 3, "unset fields keep defaults");
        assert_eq!(config.retention.artifact_ttl, Duration::from_secs(60));
        assert_eq!(config.retention.storage_quota_bytes, Some(1_048_576));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["retry"]["initial_delay"], 5);
        assert_eq!(json["download_dir"], "/srv/media");
    }

    #[test]
    fn env_overrides_api_key_port_and_paths() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("API_KEY", "hunter2"),
                ("PORT", "9090"),
                ("DOWNLOAD_DIR", "/tmp/tube"),
                ("YTDLP_PATH", "/opt/bin/yt-dlp"),
            ]))
            .unwrap();

        assert_eq!(config.server.api.api_key.as_deref(), Some("hunter2"));
        assert_eq!(
            config.server.api.bind_address,
            "0.0.0.0:9090".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.download.download_dir, PathBuf::from("/tmp/tube"));
        assert_eq!(
            config.extractor.ytdlp_path,
            Some(PathBuf::from("/opt/bin/yt-dlp"))
        );
    }

    #[test]
    fn port_override_keeps_bind_address_host() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("BIND_ADDRESS", "127.0.0.1:1234"), ("PORT", "5000")]))
            .unwrap();
        assert_eq!(
            config.server.api.bind_address,
            "127.0.0.1:5000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn empty_api_key_env_leaves_gate_open() {
        let mut config = Config::default();
        config.apply_env(env(&[("API_KEY", "")])).unwrap();
        assert!(config.server.api.api_key.is_none());
    }

    #[test]
    fn malformed_port_is_a_config_error() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(
            matches!(err, Error::Config { key: Some(ref k), .. } if k == "bind_address"),
            "got {err:?}"
        );
    }

    #[test]
    fn validate_rejects_zero_concurrency_and_zero_timeout() {
        let mut config = Config::default();
        config.download.max_concurrent_jobs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.extractor.running_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_finite_backoff() {
        for multiplier in [f64::NAN, f64::INFINITY, 0.5] {
            let mut config = Config::default();
            config.retry.backoff_multiplier = multiplier;
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains("backoff_multiplier"),
                "{multiplier}: {err}"
            );
        }

        let mut config = Config::default();
        config.retry.backoff_multiplier = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_json_file_reads_and_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tube-dl.json");
        std::fs::write(&path, r#"{"max_concurrent_jobs": 8}"#).unwrap();
        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.download.max_concurrent_jobs, 8);

        let missing = dir.path().join("missing.json");
        let err = Config::from_json_file(&missing).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }
}
