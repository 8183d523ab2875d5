//! CLI output formatting for the `compress`, `probe` and `formats` commands.
//!
//! # Output Format
//!
//! ## Compress
//!
//! ```text
//! IMG_0001.HEIC → IMG_0001-compressed.jpg
//!     1920x1440 jpg, 3.21 MB → 412.50 KB (87% smaller) via convert
//! broken.png
//!     Error: Unsupported image: Failed to decode buffer: ...
//!
//! Compressed 1 of 2 files, 3.21 MB → 412.50 KB
//! ```
//!
//! ## Probe
//!
//! ```text
//! IMG_0001.HEIC (3.21 MB)
//!     Detected: image/heic (heic)
//!     Buffer decode: failed: Failed to decode buffer: ...
//!     Path decode: failed: Failed to decode IMG_0001.HEIC: ...
//!     Converter: sips
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions do no I/O.

use crate::convert::ConvertTool;
use crate::fallback::Tier;
use crate::imaging::OutputFormat;
use crate::probe::{DecodeSummary, ProbeReport};
use crate::process::{BatchSummary, ProcessEvent};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count.
pub fn human_size(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut exp = 0;
    let mut scaled = bytes;
    while scaled >= 1024 && exp < UNITS.len() - 1 {
        scaled /= 1024;
        exp += 1;
    }
    if exp == 0 {
        return format!("{bytes} B");
    }
    format!("{:.2} {}", bytes as f64 / 1024f64.powi(exp as i32), UNITS[exp])
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn savings(original: usize, compressed: usize) -> String {
    if original == 0 {
        return "n/a".to_string();
    }
    let pct = ((1.0 - compressed as f64 / original as f64) * 100.0).round() as i64;
    if pct >= 0 {
        format!("{pct}% smaller")
    } else {
        format!("{}% larger", -pct)
    }
}

// ============================================================================
// compress
// ============================================================================

/// Format a single batch event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Done { input, file } => {
            let mut detail = format!(
                "{}{}x{} {}, {} \u{2192} {} ({})",
                indent(1),
                file.width,
                file.height,
                file.format.extension(),
                human_size(file.original_size),
                human_size(file.compressed_size),
                savings(file.original_size, file.compressed_size),
            );
            if file.tier != Tier::Buffer {
                detail.push_str(&format!(" via {}", file.tier));
            }
            vec![
                format!("{} \u{2192} {}", file_name(input), file_name(&file.output)),
                detail,
            ]
        }
        ProcessEvent::Failed { input, error } => {
            vec![file_name(input), format!("{}Error: {}", indent(1), error)]
        }
    }
}

pub fn format_batch_summary(summary: &BatchSummary) -> String {
    let total = summary.succeeded + summary.failed;
    format!(
        "Compressed {} of {} file{}, {} \u{2192} {}",
        summary.succeeded,
        total,
        if total == 1 { "" } else { "s" },
        human_size(summary.bytes_in),
        human_size(summary.bytes_out),
    )
}

pub fn print_process_event(event: &ProcessEvent) {
    for line in format_process_event(event) {
        println!("{}", line);
    }
}

// ============================================================================
// probe
// ============================================================================

fn decode_line(label: &str, result: &Result<DecodeSummary, String>) -> String {
    match result {
        Ok(d) => {
            let mut line = format!(
                "{}{}: {}x{} {}",
                indent(1),
                label,
                d.width,
                d.height,
                d.format
            );
            if d.has_alpha {
                line.push_str(", alpha");
            }
            if d.orientation != 1 {
                line.push_str(&format!(", orientation {}", d.orientation));
            }
            line
        }
        Err(e) => format!("{}{}: failed: {}", indent(1), label, e),
    }
}

pub fn format_probe_report(report: &ProbeReport) -> Vec<String> {
    let detected = match &report.detected {
        Some(d) => format!("{} ({})", d.mime, d.ext),
        None => "unknown".to_string(),
    };
    vec![
        format!("{} ({})", file_name(&report.path), human_size(report.size)),
        format!("{}Detected: {}", indent(1), detected),
        decode_line("Buffer decode", &report.buffer),
        decode_line("Path decode", &report.path_decode),
        format!(
            "{}Converter: {}",
            indent(1),
            report.converter.unwrap_or("none")
        ),
    ]
}

pub fn print_probe_report(report: &ProbeReport) {
    for line in format_probe_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// formats
// ============================================================================

pub fn format_formats(inputs: &[&str], converter: Option<ConvertTool>) -> Vec<String> {
    let outputs: Vec<&str> = OutputFormat::ALL.iter().map(|f| f.extension()).collect();
    vec![
        "Input formats".to_string(),
        format!("{}{}", indent(1), inputs.join(", ")),
        "Output formats".to_string(),
        format!("{}{}", indent(1), outputs.join(", ")),
        "Converter".to_string(),
        format!(
            "{}{}",
            indent(1),
            converter.map_or("none (HEIC uploads will be rejected)", |t| t.binary())
        ),
    ]
}

pub fn print_formats(inputs: &[&str], converter: Option<ConvertTool>) {
    for line in format_formats(inputs, converter) {
        println!("{}", line);
    }
}
