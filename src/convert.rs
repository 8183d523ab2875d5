//! External conversion tools for formats the `image` crate cannot decode.
//!
//! HEIC/HEIF uploads from phones are the main customer. When both in-process
//! decode tiers fail, the [fallback chain](crate::fallback) hands the temp
//! file to a platform tool that rewrites it as PNG, then decodes that.
//!
//! | Tool | Platform | Invocation |
//! |---|---|---|
//! | `sips` | macOS | `sips -s format png IN --out OUT` |
//! | `magick` | ImageMagick 7 | `magick IN -auto-orient OUT` |
//! | `heif-convert` | libheif | `heif-convert IN OUT` |
//!
//! Tool availability is resolved once at startup by searching `PATH`.

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("no conversion tool available on this host")]
    Unavailable,
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("waiting for {tool}: {source}")]
    Wait {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: &'static str,
        status: String,
        stderr: String,
    },
    #[error("{tool} timed out after {}s", .timeout.as_secs())]
    TimedOut {
        tool: &'static str,
        timeout: Duration,
    },
    #[error("{tool} reported success but wrote no output to {}", .output.display())]
    MissingOutput { tool: &'static str, output: PathBuf },
}

/// A known conversion tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertTool {
    Sips,
    Magick,
    HeifConvert,
}

impl ConvertTool {
    /// Detection order for `converter = "auto"`.
    pub const DETECT_ORDER: [ConvertTool; 3] = [Self::Sips, Self::Magick, Self::HeifConvert];

    pub fn binary(self) -> &'static str {
        match self {
            Self::Sips => "sips",
            Self::Magick => "magick",
            Self::HeifConvert => "heif-convert",
        }
    }

    /// Command-line arguments to convert `input` into a PNG at `output`.
    pub fn args(self, input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        let input = input.as_os_str().to_owned();
        let output = output.as_os_str().to_owned();
        match self {
            Self::Sips => vec![
                "-s".into(),
                "format".into(),
                "png".into(),
                input,
                "--out".into(),
                output,
            ],
            Self::Magick => vec![input, "-auto-orient".into(), output],
            Self::HeifConvert => vec![input, output],
        }
    }
}

/// The `[fallback] converter` setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConverterSetting {
    #[default]
    Auto,
    Sips,
    Magick,
    HeifConvert,
    None,
}

impl ConverterSetting {
    fn candidates(self) -> &'static [ConvertTool] {
        match self {
            Self::Auto => &ConvertTool::DETECT_ORDER,
            Self::Sips => &[ConvertTool::Sips],
            Self::Magick => &[ConvertTool::Magick],
            Self::HeifConvert => &[ConvertTool::HeifConvert],
            Self::None => &[],
        }
    }
}

/// Locate an executable on `PATH`.
pub fn find_in_path(binary: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    find_in(binary, &paths)
}

/// Locate an executable in a `PATH`-style list of directories. Files without
/// execute permission are skipped.
pub fn find_in(binary: &str, paths: &OsStr) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    which::which_in(binary, Some(paths), cwd).ok()
}

/// Run `fut` to completion from synchronous code. Blocking-pool threads reuse
/// the ambient runtime; anywhere else (rayon, tests) gets a current-thread one.
fn block_on<F: Future>(fut: F) -> std::io::Result<F::Output> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Ok(handle.block_on(fut)),
        Err(_) => Ok(tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(fut)),
    }
}

/// Something that can turn an undecodable file into a PNG.
pub trait Converter: Sync {
    /// The tool that will be used, if any.
    fn tool(&self) -> Option<ConvertTool>;

    /// Convert `input` to a PNG written at `output`.
    fn convert_to_png(&self, input: &Path, output: &Path) -> Result<(), ConvertError>;
}

/// Runs a host tool as a child process, killing it on timeout.
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    tool: Option<(ConvertTool, PathBuf)>,
    timeout: Duration,
}

impl ExternalConverter {
    /// Resolve the configured tool against `PATH` and log what was found.
    pub fn detect(setting: ConverterSetting, timeout: Duration) -> Self {
        let tool = setting
            .candidates()
            .iter()
            .find_map(|tool| find_in_path(tool.binary()).map(|path| (*tool, path)));

        match (&tool, setting) {
            (Some((tool, path)), _) => {
                tracing::info!(path = %path.display(), "{}: available on host", tool.binary())
            }
            (None, ConverterSetting::None) => {
                tracing::info!("external conversion disabled")
            }
            (None, ConverterSetting::Auto) => {
                tracing::info!("no conversion tool (sips, magick, heif-convert) available on host")
            }
            (None, other) => {
                tracing::warn!(setting = ?other, "configured conversion tool not found on PATH")
            }
        }

        Self { tool, timeout }
    }

    /// A converter that never converts.
    pub fn disabled() -> Self {
        Self {
            tool: None,
            timeout: Duration::ZERO,
        }
    }

    /// Use a specific binary (tests, or pinned installs).
    pub fn with_binary(tool: ConvertTool, binary: PathBuf, timeout: Duration) -> Self {
        Self {
            tool: Some((tool, binary)),
            timeout,
        }
    }
}

impl Converter for ExternalConverter {
    fn tool(&self) -> Option<ConvertTool> {
        self.tool.as_ref().map(|(tool, _)| *tool)
    }

    fn convert_to_png(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        let Some((tool, binary)) = &self.tool else {
            return Err(ConvertError::Unavailable);
        };
        let name = tool.binary();

        tracing::debug!(tool = name, input = %input.display(), output = %output.display(), "running conversion");

        let run = async {
            let child = Command::new(binary)
                .args(tool.args(input, output))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| ConvertError::Spawn { tool: name, source })?;

            // Dropping the wait future on timeout drops the child, which kills it
            match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
                Ok(finished) => finished.map_err(|source| ConvertError::Wait { tool: name, source }),
                Err(_) => Err(ConvertError::TimedOut {
                    tool: name,
                    timeout: self.timeout,
                }),
            }
        };
        let finished = block_on(run).map_err(|source| ConvertError::Spawn { tool: name, source })??;

        let status = finished.status;
        let stderr = String::from_utf8_lossy(&finished.stderr);

        if !status.success() {
            return Err(ConvertError::Failed {
                tool: name,
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !output.is_file() {
            return Err(ConvertError::MissingOutput {
                tool: name,
                output: output.to_path_buf(),
            });
        }
        Ok(())
    }
}
