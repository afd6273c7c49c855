//! TOML Configuration File Support
//!
//! Centralized configuration loading for darkroom, supporting a TOML file at
//! `~/.config/darkroom/darkroom.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (when applicable)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! The API key is never read from the file. It comes from `DARKROOM_API_KEY`
//! (or `GEMINI_API_KEY`) or the command line, and is never logged.
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "https://generativelanguage.googleapis.com/v1beta"
//! describe_model = "gemini-2.0-flash"
//! generate_model = "imagen-3.0-generate-002"
//! request_timeout_secs = 120
//!
//! [progress]
//! nominal_duration_ms = 15000
//! slowdown_min_pct = 75
//! slowdown_max_pct = 90
//! pause_ceiling = 95.0
//! sprint_duration_ms = 400
//!
//! [effect]
//! grid_columns = 40
//! coarse_color_step = 64
//! fine_color_step = 16
//!
//! [render]
//! tick_ms = 50
//! preview_fps = 60
//!
//! [retry]
//! max_attempts = 3
//! backoff_step_ms = 1000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::effect::EffectConfig;
use crate::pipeline::{MessageDetail, PipelineConfig};
use crate::progress::ProgressConfig;
use crate::render_loop::{RenderConfig, MAX_PREVIEW_FPS};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// API section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Service base URL
    pub base_url: Option<String>,

    /// Vision model used by the describe call
    pub describe_model: Option<String>,

    /// Image model used by the generate call
    pub generate_model: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Progress section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressToml {
    /// Unthrottled time to 100 %, in milliseconds
    pub nominal_duration_ms: Option<u64>,

    /// Lowest slowdown threshold (percent)
    pub slowdown_min_pct: Option<u8>,

    /// Highest slowdown threshold (percent)
    pub slowdown_max_pct: Option<u8>,

    /// Deceleration speed floor as a fraction of the linear rate
    pub min_speed_factor: Option<f32>,

    /// Visible progress cap while waiting
    pub pause_ceiling: Option<f32>,

    /// Stall oscillation period in milliseconds
    pub stall_period_ms: Option<u64>,

    /// Stall drive lower bound
    pub stall_drive_min: Option<f32>,

    /// Stall drive upper bound
    pub stall_drive_max: Option<f32>,

    /// Final sprint length in milliseconds
    pub sprint_duration_ms: Option<u64>,
}

/// Effect section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectToml {
    /// Sampling buffer width
    pub sample_width: Option<u32>,

    /// Block columns across the canvas
    pub grid_columns: Option<u32>,

    /// Quantization step at drive 0
    pub coarse_color_step: Option<u8>,

    /// Quantization step at drive 100
    pub fine_color_step: Option<u8>,

    /// Pixels between scanlines
    pub scanline_period: Option<u32>,

    /// Scanline opacity at drive 0
    pub scanline_max_opacity: Option<f32>,
}

/// Render section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderToml {
    /// Processing tick in milliseconds
    pub tick_ms: Option<u64>,

    /// Live preview refresh rate
    pub preview_fps: Option<u32>,

    /// Live preview drive
    pub preview_drive: Option<f32>,

    /// Reveal fade in milliseconds
    pub reveal_fade_ms: Option<u64>,
}

/// Retry section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryToml {
    /// Generate attempts on repeated 401
    pub max_attempts: Option<u32>,

    /// Linear backoff step in milliseconds
    pub backoff_step_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DarkroomToml {
    /// API section
    pub api: ApiToml,

    /// Progress section
    pub progress: ProgressToml,

    /// Effect section
    pub effect: EffectToml,

    /// Render section
    pub render: RenderToml,

    /// Retry section
    pub retry: RetryToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Remote service settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    /// Service base URL
    pub base_url: String,
    /// Vision model used by the describe call
    pub describe_model: String,
    /// Image model used by the generate call
    pub generate_model: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            describe_model: "gemini-2.0-flash".to_string(),
            generate_model: "imagen-3.0-generate-002".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Centralized configuration for darkroom
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone)]
pub struct DarkroomConfig {
    /// Remote service settings
    pub api: ApiConfig,

    /// API key (environment or CLI only)
    pub api_key: Option<String>,

    /// Progress simulator settings
    pub progress: ProgressConfig,

    /// Effect renderer settings
    pub effect: EffectConfig,

    /// Render loop settings
    pub render: RenderConfig,

    /// Generate retry settings
    pub retry: PipelineConfig,

    /// How much error text the user sees
    pub message_detail: MessageDetail,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl std::fmt::Debug for DarkroomConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DarkroomConfig")
            .field("api", &self.api)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("progress", &self.progress)
            .field("effect", &self.effect)
            .field("render", &self.render)
            .field("retry", &self.retry)
            .field("message_detail", &self.message_detail)
            .field("config_file_path", &self.config_file_path)
            .field("source", &self.source)
            .finish()
    }
}

impl Default for DarkroomConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            api_key: None,
            progress: ProgressConfig::default(),
            effect: EffectConfig::default(),
            render: RenderConfig::default(),
            retry: PipelineConfig::default(),
            message_detail: MessageDetail::Generic,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl DarkroomConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check value ranges and cross-field ordering
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.progress;
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if !(1..=99).contains(&p.slowdown_min_pct) || !(1..=99).contains(&p.slowdown_max_pct) {
            return invalid(format!(
                "slowdown thresholds must be within 1..=99 (got {}..={})",
                p.slowdown_min_pct, p.slowdown_max_pct
            ));
        }
        if p.slowdown_min_pct > p.slowdown_max_pct {
            return invalid(format!(
                "slowdown_min_pct ({}) exceeds slowdown_max_pct ({})",
                p.slowdown_min_pct, p.slowdown_max_pct
            ));
        }
        if !(p.stall_drive_min <= p.stall_drive_max
            && p.stall_drive_max <= p.pause_ceiling
            && p.pause_ceiling <= 100.0)
        {
            return invalid(format!(
                "expected stall_drive_min <= stall_drive_max <= pause_ceiling <= 100 (got {} / {} / {})",
                p.stall_drive_min, p.stall_drive_max, p.pause_ceiling
            ));
        }
        if !(0.0..=1.0).contains(&p.min_speed_factor) {
            return invalid(format!("min_speed_factor must be within 0..=1 (got {})", p.min_speed_factor));
        }

        let e = &self.effect;
        if e.fine_color_step == 0 || e.fine_color_step > e.coarse_color_step {
            return invalid(format!(
                "expected 1 <= fine_color_step <= coarse_color_step (got {} / {})",
                e.fine_color_step, e.coarse_color_step
            ));
        }
        if e.grid_columns == 0 {
            return invalid("grid_columns must be at least 1".to_string());
        }

        if self.render.tick.is_zero() {
            return invalid("tick_ms must be at least 1".to_string());
        }
        if !(1..=MAX_PREVIEW_FPS).contains(&self.render.preview_fps) {
            return invalid(format!(
                "preview_fps must be within 1..={MAX_PREVIEW_FPS} (got {})",
                self.render.preview_fps
            ));
        }
        if self.retry.max_attempts == 0 {
            return invalid("max_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/darkroom/darkroom.toml` or
/// `~/.config/darkroom/darkroom.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("darkroom").join("darkroom.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// merged values fail validation. A missing config file is not an error.
pub fn load_config() -> Result<DarkroomConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<DarkroomConfig, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

fn load_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<DarkroomConfig, ConfigError> {
    // Start with defaults
    let mut config = DarkroomConfig::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: DarkroomToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut DarkroomConfig, toml: &DarkroomToml) {
    // API settings
    if let Some(ref url) = toml.api.base_url {
        config.api.base_url.clone_from(url);
    }
    if let Some(ref model) = toml.api.describe_model {
        config.api.describe_model.clone_from(model);
    }
    if let Some(ref model) = toml.api.generate_model {
        config.api.generate_model.clone_from(model);
    }
    if let Some(secs) = toml.api.request_timeout_secs {
        config.api.request_timeout_secs = secs;
    }

    // Progress settings
    let p = &toml.progress;
    if let Some(ms) = p.nominal_duration_ms {
        config.progress.nominal_duration = millis(ms);
    }
    if let Some(pct) = p.slowdown_min_pct {
        config.progress.slowdown_min_pct = pct;
    }
    if let Some(pct) = p.slowdown_max_pct {
        config.progress.slowdown_max_pct = pct;
    }
    if let Some(factor) = p.min_speed_factor {
        config.progress.min_speed_factor = factor;
    }
    if let Some(ceiling) = p.pause_ceiling {
        config.progress.pause_ceiling = ceiling;
    }
    if let Some(ms) = p.stall_period_ms {
        config.progress.stall_period = millis(ms);
    }
    if let Some(v) = p.stall_drive_min {
        config.progress.stall_drive_min = v;
    }
    if let Some(v) = p.stall_drive_max {
        config.progress.stall_drive_max = v;
    }
    if let Some(ms) = p.sprint_duration_ms {
        config.progress.sprint_duration = millis(ms);
    }

    // Effect settings
    let e = &toml.effect;
    if let Some(w) = e.sample_width {
        config.effect.sample_width = w;
    }
    if let Some(cols) = e.grid_columns {
        config.effect.grid_columns = cols;
    }
    if let Some(step) = e.coarse_color_step {
        config.effect.coarse_color_step = step;
    }
    if let Some(step) = e.fine_color_step {
        config.effect.fine_color_step = step;
    }
    if let Some(period) = e.scanline_period {
        config.effect.scanline_period = period;
    }
    if let Some(opacity) = e.scanline_max_opacity {
        config.effect.scanline_max_opacity = opacity;
    }

    // Render settings
    let r = &toml.render;
    if let Some(ms) = r.tick_ms {
        config.render.tick = millis(ms);
    }
    if let Some(fps) = r.preview_fps {
        config.render.preview_fps = fps;
    }
    if let Some(drive) = r.preview_drive {
        config.render.preview_drive = drive;
    }
    if let Some(ms) = r.reveal_fade_ms {
        config.render.reveal_fade.duration = millis(ms);
    }

    // Retry settings
    if let Some(n) = toml.retry.max_attempts {
        config.retry.max_attempts = n;
    }
    if let Some(ms) = toml.retry.backoff_step_ms {
        config.retry.backoff_step = millis(ms);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut DarkroomConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(key) = env("DARKROOM_API_KEY").or_else(|| env("GEMINI_API_KEY")) {
        if !key.is_empty() {
            config.api_key = Some(key);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(url) = env("DARKROOM_API_BASE_URL") {
        config.api.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("DARKROOM_DESCRIBE_MODEL") {
        config.api.describe_model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("DARKROOM_GENERATE_MODEL") {
        config.api.generate_model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(tick) = env("DARKROOM_TICK_MS") {
        if let Ok(ms) = tick.parse::<u64>() {
            config.render.tick = millis(ms);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(attempts) = env("DARKROOM_MAX_ATTEMPTS") {
        if let Ok(n) = attempts.parse::<u32>() {
            config.retry.max_attempts = n;
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Default)]
pub struct ConfigOverrides {
    /// API key override
    pub api_key: Option<String>,

    /// Base URL override
    pub base_url: Option<String>,

    /// Show full error text
    pub detailed_errors: Option<bool>,
}

impl std::fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("detailed_errors", &self.detailed_errors)
            .finish()
    }
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set API key override
    #[must_use]
    pub fn with_api_key(mut self, key: String) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set detailed error display
    #[must_use]
    pub fn with_detailed_errors(mut self, detailed: bool) -> Self {
        self.detailed_errors = Some(detailed);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut DarkroomConfig) {
        if self.api_key.is_some() || self.base_url.is_some() || self.detailed_errors.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref key) = self.api_key {
            config.api_key = Some(key.clone());
        }

        if let Some(ref url) = self.base_url {
            config.api.base_url.clone_from(url);
        }

        if let Some(detailed) = self.detailed_errors {
            config.message_detail = if detailed {
                MessageDetail::Detailed
            } else {
                MessageDetail::Generic
            };
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
