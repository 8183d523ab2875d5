//! Multipart form parsing for `POST /api/compress`.
//!
//! The form carries one image plus optional text fields:
//!
//! | Field | Meaning |
//! |---|---|
//! | `file` / `files` / `upload` | the image (first name in this order wins) |
//! | `quality` | 1–100; missing, unparsable or 0 → configured default |
//! | `maxWidth`, `maxHeight` | pixels; missing, unparsable or ≤ 0 → unlimited |
//! | `format` | `auto`, `jpeg`, `webp`, `png`, `avif` |
//!
//! Numbers are read the lenient way browsers send them: leading integer
//! digits count, so `"12.5"` is 12 and `"80px"` is 80.

use crate::imaging::{Bounds, FormatChoice, Quality};
use axum::body::Bytes;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;

/// Accepted file field names, highest priority first.
pub const FILE_FIELDS: [&str; 3] = ["file", "files", "upload"];

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: &'static str,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    /// File name without extension, safe to put in a quoted header value.
    pub fn stem(&self) -> String {
        let stem = self
            .file_name
            .as_deref()
            .map(|name| name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name))
            .map(|name| match name.rsplit_once('.') {
                Some((stem, _)) if !stem.is_empty() => stem,
                _ => name,
            })
            .unwrap_or_default();

        let cleaned: String = stem
            .chars()
            .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
            .filter(|c| c.is_ascii())
            .collect();
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            "image".to_string()
        } else {
            cleaned.to_string()
        }
    }
}

/// Raw form contents before interpretation.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub quality: Option<String>,
    pub max_width: Option<String>,
    pub max_height: Option<String>,
    pub format: Option<String>,
}

impl UploadForm {
    /// Offer a file found under `name`; keeps the best-priority one seen so far.
    pub fn offer_file(&mut self, file: UploadedFile) {
        let rank = |f: &UploadedFile| FILE_FIELDS.iter().position(|n| *n == f.field);
        let better = match &self.file {
            None => true,
            Some(current) => rank(&file) < rank(current),
        };
        if better {
            self.file = Some(file);
        }
    }

    pub fn quality(&self, default: Quality) -> Quality {
        match self.quality.as_deref().and_then(parse_leading_int) {
            None | Some(0) => default,
            Some(n) => Quality::from_signed(n),
        }
    }

    pub fn bounds(&self) -> Bounds {
        let dim = |raw: &Option<String>| {
            raw.as_deref()
                .and_then(parse_leading_int)
                .filter(|n| *n > 0)
                .map_or(0, |n| n.min(u32::MAX as i64) as u32)
        };
        Bounds::new(dim(&self.max_width), dim(&self.max_height))
    }

    pub fn format(&self) -> FormatChoice {
        self.format
            .as_deref()
            .map(FormatChoice::parse)
            .unwrap_or_default()
    }
}

/// Drain a multipart stream into an [`UploadForm`].
pub async fn read_form(mut multipart: Multipart) -> Result<UploadForm, MultipartError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(&file_field) = FILE_FIELDS.iter().find(|n| **n == name) {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?;
            form.offer_file(UploadedFile {
                field: file_field,
                file_name,
                content_type,
                bytes,
            });
            continue;
        }

        let slot = match name.as_str() {
            "quality" => &mut form.quality,
            "maxWidth" => &mut form.max_width,
            "maxHeight" => &mut form.max_height,
            "format" => &mut form.format,
            _ => {
                tracing::trace!(field = %name, "ignoring form field");
                continue;
            }
        };
        let value = field.text().await?;
        // first value wins, as with repeated form fields elsewhere
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    Ok(form)
}

/// Parse a leading integer the way browsers' `parseInt(s, 10)` does.
///
/// Skips leading whitespace, accepts one sign, then reads digits until the
/// first non-digit. No digits → `None`. Values beyond `i64` saturate.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let digits: &str = &digits[..digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len())];
    if digits.is_empty() {
        return None;
    }

    let magnitude = digits
        .bytes()
        .try_fold(0i64, |acc, b| {
            acc.checked_mul(10)?.checked_add(i64::from(b - b'0'))
        })
        .unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(field: &'static str, name: &str) -> UploadedFile {
        UploadedFile {
            field,
            file_name: Some(name.to_string()),
            content_type: None,
            bytes: Bytes::from_static(b"x"),
        }
    }

    // =========================================================================
    // parse_leading_int
    // =========================================================================

    #[test]
    fn parses_plain_integers() {
        assert_eq!(parse_leading_int("70"), Some(70));
        assert_eq!(parse_leading_int("  85"), Some(85));
        assert_eq!(parse_leading_int("-5"), Some(-5));
        assert_eq!(parse_leading_int("+12"), Some(12));
    }

    #[test]
    fn stops_at_first_non_digit() {
        assert_eq!(parse_leading_int("12.5"), Some(12));
        assert_eq!(parse_leading_int("80px"), Some(80));
        assert_eq!(parse_leading_int("1e3"), Some(1));
    }

    #[test]
    fn rejects_non_numbers() {
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int("-"), None);
        assert_eq!(parse_leading_int(".5"), None);
        assert_eq!(parse_leading_int("x12"), None);
    }

    #[test]
    fn huge_values_saturate() {
        assert_eq!(parse_leading_int("99999999999999999999999"), Some(i64::MAX));
    }

    // =========================================================================
    // Field interpretation
    // =========================================================================

    #[test]
    fn quality_defaults_and_clamps() {
        let default = Quality::new(70);
        let with = |q: &str| UploadForm {
            quality: Some(q.to_string()),
            ..Default::default()
        };

        assert_eq!(UploadForm::default().quality(default).value(), 70);
        assert_eq!(with("0").quality(default).value(), 70);
        assert_eq!(with("abc").quality(default).value(), 70);
        assert_eq!(with("85").quality(default).value(), 85);
        assert_eq!(with("150").quality(default).value(), 100);
        assert_eq!(with("-5").quality(default).value(), 1);
        assert_eq!(with("55.9").quality(default).value(), 55);
    }

    #[test]
    fn bounds_ignore_non_positive() {
        let form = UploadForm {
            max_width: Some("1920".into()),
            max_height: Some("0".into()),
            ..Default::default()
        };
        assert_eq!(form.bounds(), Bounds::new(1920, 0));

        let form = UploadForm {
            max_width: Some("-10".into()),
            max_height: Some("wide".into()),
            ..Default::default()
        };
        assert!(form.bounds().is_unlimited());
    }

    #[test]
    fn format_field() {
        let with = |f: &str| UploadForm {
            format: Some(f.to_string()),
            ..Default::default()
        };
        assert_eq!(UploadForm::default().format(), FormatChoice::Auto);
        assert_eq!(
            with("webp").format(),
            FormatChoice::Explicit(crate::imaging::OutputFormat::WebP)
        );
        assert_eq!(with("bogus").format(), FormatChoice::Auto);
    }

    #[test]
    fn file_field_priority() {
        let mut form = UploadForm::default();
        form.offer_file(file("upload", "c.jpg"));
        form.offer_file(file("files", "b.jpg"));
        form.offer_file(file("file", "a.jpg"));
        form.offer_file(file("file", "a2.jpg"));
        form.offer_file(file("files", "b2.jpg"));

        let chosen = form.file.unwrap();
        assert_eq!(chosen.field, "file");
        assert_eq!(chosen.file_name.as_deref(), Some("a.jpg"));
    }

    #[test]
    fn stem_strips_extension_and_path() {
        assert_eq!(file("file", "IMG_0001.HEIC").stem(), "IMG_0001");
        assert_eq!(file("file", "C:\\photos\\beach.jpg").stem(), "beach");
        assert_eq!(file("file", "archive.tar.gz").stem(), "archive.tar");
        assert_eq!(file("file", ".hidden").stem(), ".hidden");
    }

    #[test]
    fn stem_sanitizes_header_breakers() {
        assert_eq!(file("file", "a\"b\r\n.png").stem(), "ab");
        assert_eq!(file("file", "\"\".png").stem(), "image");
        let nameless = UploadedFile {
            file_name: None,
            ..file("file", "")
        };
        assert_eq!(nameless.stem(), "image");
    }
}
