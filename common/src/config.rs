use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::Region;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Tuning for the adaptive change detector. Scores are mean absolute
/// luminance differences on a 0..255 scale.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// A window average strictly above this fires a sustained change.
    #[serde(default = "default_diff_threshold")]
    pub diff_threshold: f64,
    /// A single sample at or above this fires a strong change.
    #[serde(default = "default_strong_diff_threshold")]
    pub strong_diff_threshold: f64,
    #[serde(default = "default_change_window_secs")]
    pub change_window_secs: f64,
    #[serde(default = "default_min_change_interval_secs")]
    pub min_change_interval_secs: f64,
    #[serde(default = "default_min_sample_count")]
    pub min_sample_count: usize,
    #[serde(default = "default_baseline_refresh_secs")]
    pub baseline_refresh_secs: f64,
    /// Side length of the square luminance thumbnail used for comparison.
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_min_auto_request_interval_secs")]
    pub min_auto_request_interval_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// "screen", "http" or "file".
    #[serde(default = "default_capture_mode")]
    pub mode: String,
    #[serde(default = "default_capture_url")]
    pub url: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Display index; the primary display when unset.
    #[serde(default)]
    pub monitor: Option<usize>,
    /// Sub-rectangle to capture, relative to the chosen display.
    #[serde(default)]
    pub region: Option<Region>,
    /// Static rectangle, in desktop coordinates, painted black before
    /// detection. Used until the overlay reports its own geometry.
    #[serde(default)]
    pub mask: Option<Region>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_agents_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_watch_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            diff_threshold: default_diff_threshold(),
            strong_diff_threshold: default_strong_diff_threshold(),
            change_window_secs: default_change_window_secs(),
            min_change_interval_secs: default_min_change_interval_secs(),
            min_sample_count: default_min_sample_count(),
            baseline_refresh_secs: default_baseline_refresh_secs(),
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            min_auto_request_interval_secs: default_min_auto_request_interval_secs(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: default_capture_mode(),
            url: default_capture_url(),
            path: None,
            monitor: None,
            region: None,
            mask: None,
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            url: default_vision_url(),
            api_key: None,
            default_model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            dir: default_agents_dir(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_watch_interval_ms(),
            agent_id: default_agent_id(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detector;
        for (name, value) in [
            ("diff_threshold", d.diff_threshold),
            ("strong_diff_threshold", d.strong_diff_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }
        if d.strong_diff_threshold < d.diff_threshold {
            return Err(ConfigError::Invalid(format!(
                "strong_diff_threshold ({}) must not be below diff_threshold ({})",
                d.strong_diff_threshold, d.diff_threshold
            )));
        }
        check_secs("change_window_secs", d.change_window_secs, false)?;
        check_secs("min_change_interval_secs", d.min_change_interval_secs, true)?;
        check_secs("baseline_refresh_secs", d.baseline_refresh_secs, true)?;
        check_secs(
            "min_auto_request_interval_secs",
            self.request.min_auto_request_interval_secs,
            true,
        )?;
        if d.min_sample_count == 0 {
            return Err(ConfigError::Invalid("min_sample_count must be at least 1".into()));
        }
        if d.thumbnail_size == 0 {
            return Err(ConfigError::Invalid("thumbnail_size must be positive".into()));
        }
        if !(1..=100).contains(&self.vision.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.vision.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// Seconds must convert to a `Duration`: finite, not negative, not absurdly large.
fn check_secs(name: &str, secs: f64, allow_zero: bool) -> Result<(), ConfigError> {
    if Duration::try_from_secs_f64(secs).is_err() || (!allow_zero && secs <= 0.0) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be a finite number of seconds{}, got {secs}",
            if allow_zero { "" } else { " above zero" }
        )));
    }
    Ok(())
}

/// Convert configured seconds to a `Duration`, saturating instead of
/// panicking on values that `Config::validate` would have rejected.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    5008
}
fn default_diff_threshold() -> f64 {
    3.0
}
fn default_strong_diff_threshold() -> f64 {
    6.0
}
fn default_change_window_secs() -> f64 {
    1.2
}
fn default_min_change_interval_secs() -> f64 {
    0.8
}
fn default_min_sample_count() -> usize {
    2
}
fn default_baseline_refresh_secs() -> f64 {
    30.0
}
fn default_thumbnail_size() -> u32 {
    32
}
fn default_min_auto_request_interval_secs() -> f64 {
    5.0
}
fn default_capture_mode() -> String {
    "http".into()
}
fn default_capture_url() -> String {
    "http://127.0.0.1:8080/frame".into()
}
fn default_vision_url() -> String {
    "http://localhost:6005/v1/chat/completions".into()
}
fn default_model() -> String {
    "gemini-3-flash-preview".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_dimension() -> u32 {
    800
}
fn default_jpeg_quality() -> u8 {
    70
}
fn default_agents_dir() -> PathBuf {
    PathBuf::from("Agents")
}
fn default_watch_interval_ms() -> u64 {
    1000
}
fn default_agent_id() -> String {
    "default".into()
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.port, 5008);
        assert_eq!(config.detector.diff_threshold, 3.0);
        assert_eq!(config.detector.thumbnail_size, 32);
        assert_eq!(config.vision.jpeg_quality, 70);
        assert!(!config.watch.enabled);
        assert!(config.capture.mask.is_none());
    }

    #[test]
    fn partial_sections_fill_missing_keys() {
        let config = Config::from_toml(
            r#"
            [detector]
            diff_threshold = 2.5
            min_sample_count = 4

            [capture]
            mode = "file"
            path = "/tmp/screen.png"
            mask = { x = 10, y = 20, width = 300, height = 200 }
            "#,
        )
        .unwrap();
        assert_eq!(config.detector.diff_threshold, 2.5);
        assert_eq!(config.detector.min_sample_count, 4);
        assert_eq!(config.detector.strong_diff_threshold, 6.0);
        assert_eq!(config.capture.mode, "file");
        let mask = config.capture.mask.unwrap();
        assert_eq!((mask.x, mask.y, mask.width, mask.height), (10, 20, 300, 200));
    }

    #[test]
    fn strong_threshold_below_sustained_is_rejected() {
        let err = Config::from_toml(
            r#"
            [detector]
            diff_threshold = 5.0
            strong_diff_threshold = 4.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_sample_count_is_rejected() {
        let err = Config::from_toml("[detector]\nmin_sample_count = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn jpeg_quality_out_of_range_is_rejected() {
        let err = Config::from_toml("[vision]\njpeg_quality = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        for toml in [
            "[detector]\nbaseline_refresh_secs = inf\n",
            "[detector]\nchange_window_secs = nan\n",
            "[detector]\nmin_change_interval_secs = 1e300\n",
            "[detector]\ndiff_threshold = nan\nstrong_diff_threshold = nan\n",
            "[detector]\nstrong_diff_threshold = inf\n",
            "[request]\nmin_auto_request_interval_secs = -inf\n",
        ] {
            let err = Config::from_toml(toml).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "accepted: {toml}");
        }
    }

    #[test]
    fn zero_intervals_are_allowed_but_zero_window_is_not() {
        let config = Config::from_toml(
            "[detector]\nmin_change_interval_secs = 0\nbaseline_refresh_secs = 0\n",
        )
        .unwrap();
        assert_eq!(config.detector.baseline_refresh_secs, 0.0);

        let err = Config::from_toml("[detector]\nchange_window_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn duration_conversion_saturates() {
        assert_eq!(secs_to_duration(1.5), Duration::from_millis(1500));
        assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(secs_to_duration(-3.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = Config::from_toml("[detector\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
