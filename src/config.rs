//! Service configuration module.
//!
//! Handles loading, validating, and merging `compressor.toml`. Stock defaults
//! are serialized to a TOML table and the user file is merged on top, so a
//! config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3000                    # API_PORT in the environment wins
//! max_upload_bytes = 52428800    # 50 MiB request body limit
//! parse_timeout_secs = 60        # whole multipart form must arrive in time
//!
//! [compress]
//! default_quality = 70           # used when the request has no usable quality
//! allow_upscale = false          # enlarge images smaller than the bounds
//!
//! [fallback]
//! disk = true                    # try decoding from a temp file
//! converter = "auto"             # auto | sips | magick | heif-convert | none
//! convert_timeout_secs = 30
//! temp_dir = ""                  # empty = system temp dir
//! keep_temp_files = false        # leave temp files behind for debugging
//!
//! [processing]
//! max_processes = 4              # CLI batch workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::compress::CompressSettings;
use crate::convert::{ConverterSetting, ExternalConverter};
use crate::fallback::FallbackOptions;
use crate::imaging::Quality;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `server.port`.
pub const PORT_ENV: &str = "API_PORT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `compressor.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// HTTP listener and request limits.
    pub server: ServerConfig,
    /// Pipeline defaults.
    pub compress: CompressConfig,
    /// Decode fallback chain.
    pub fallback: FallbackConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.compress.default_quality) {
            return Err(ConfigError::Validation(
                "compress.default_quality must be 1-100".into(),
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.max_upload_bytes must be non-zero".into(),
            ));
        }
        if self.server.parse_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.parse_timeout_secs must be non-zero".into(),
            ));
        }
        if self.fallback.convert_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fallback.convert_timeout_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn default_quality(&self) -> Quality {
        Quality::new(self.compress.default_quality)
    }

    pub fn compress_settings(&self) -> CompressSettings {
        CompressSettings {
            fallback: self.fallback.options(),
            allow_upscale: self.compress.allow_upscale,
        }
    }

    /// Probe the host for the configured conversion tool.
    pub fn detect_converter(&self) -> ExternalConverter {
        ExternalConverter::detect(
            self.fallback.converter,
            Duration::from_secs(self.fallback.convert_timeout_secs),
        )
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Request body limit in bytes.
    pub max_upload_bytes: usize,
    /// Seconds allowed for receiving and parsing the whole multipart form.
    pub parse_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_upload_bytes: 50 * 1024 * 1024,
            parse_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    pub fn parse_timeout(&self) -> Duration {
        Duration::from_secs(self.parse_timeout_secs)
    }
}

/// Pipeline defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressConfig {
    pub default_quality: u32,
    pub allow_upscale: bool,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            default_quality: 70,
            allow_upscale: false,
        }
    }
}

/// Decode fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackConfig {
    /// Try the temp-file and converter tiers.
    pub disk: bool,
    pub converter: ConverterSetting,
    pub convert_timeout_secs: u64,
    /// Directory for temp files. Empty = system temp dir.
    pub temp_dir: String,
    pub keep_temp_files: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            disk: true,
            converter: ConverterSetting::Auto,
            convert_timeout_secs: 30,
            temp_dir: String::new(),
            keep_temp_files: false,
        }
    }
}

impl FallbackConfig {
    pub fn options(&self) -> FallbackOptions {
        FallbackOptions {
            disk: self.disk,
            temp_dir: (!self.temp_dir.is_empty()).then(|| PathBuf::from(&self.temp_dir)),
            keep_temp_files: self.keep_temp_files,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(AppConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Apply the `API_PORT` override. `port` is the raw environment value.
pub fn apply_port_override(
    mut config: AppConfig,
    port: Option<&str>,
) -> Result<AppConfig, ConfigError> {
    if let Some(raw) = port.map(str::trim).filter(|p| !p.is_empty()) {
        config.server.port = raw
            .parse()
            .map_err(|_| ConfigError::Validation(format!("{PORT_ENV} is not a port: {raw:?}")))?;
    }
    Ok(config)
}

/// Load config from a `compressor.toml` path.
///
/// A missing file yields the stock defaults. User values are merged on top of
/// the defaults, unknown keys are rejected, `API_PORT` is applied, and the
/// result is validated.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    let config = resolve_config(base, overlay)?;
    let port = std::env::var(PORT_ENV).ok();
    apply_port_override(config, port.as_deref())
}

/// Returns a fully-commented stock `compressor.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Image Compressor Configuration
# =============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
host = "127.0.0.1"

# The API_PORT environment variable overrides this.
port = 3000

# Largest accepted request body, in bytes (50 MiB).
max_upload_bytes = 52428800

# Seconds allowed for the whole multipart form to arrive and parse.
parse_timeout_secs = 60

# ---------------------------------------------------------------------------
# Compression defaults
# ---------------------------------------------------------------------------
[compress]
# Quality used when a request sends none, 0, or something unparsable (1-100).
default_quality = 70

# Enlarge images that are already smaller than the requested bounds.
allow_upscale = false

# ---------------------------------------------------------------------------
# Decode fallback chain
# ---------------------------------------------------------------------------
[fallback]
# When decoding from memory fails, write the upload to a temp file and retry.
disk = true

# External tool for formats the built-in decoders cannot read (HEIC, ...).
# One of: "auto", "sips", "magick", "heif-convert", "none".
# "auto" uses the first of sips, magick, heif-convert found on PATH.
converter = "auto"

# Kill the conversion tool after this many seconds.
convert_timeout_secs = 30

# Directory for temp files. Empty = system temp dir.
temp_dir = ""

# Leave temp files on disk after each request (debugging aid).
keep_temp_files = false

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for the `compress` command.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
