//! Intake validation: MIME allow-list and size ceiling.
//!
//! Rejected files are never tracked. Each rejection carries the
//! filename so the global notice can say which file was refused.

use serde::{Deserialize, Serialize};

/// Largest accepted file: 50 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// A MIME type pattern such as `image/*` or `application/pdf`.
///
/// A trailing `/*` matches any subtype. Matching is case-insensitive
/// and ignores parameters (`; charset=...`) on the candidate type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MimePattern(String);

impl MimePattern {
    /// Create a pattern from its textual form.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// The pattern as written, suitable for an `<input accept>` list.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `mime_type` falls under this pattern.
    #[must_use]
    pub fn matches(&self, mime_type: &str) -> bool {
        let essence = essence(mime_type);
        if essence.is_empty() {
            return false;
        }
        self.0.strip_suffix("/*").map_or_else(
            || self.0.eq_ignore_ascii_case(essence),
            |top| {
                essence
                    .split_once('/')
                    .is_some_and(|(ty, sub)| !sub.is_empty() && ty.eq_ignore_ascii_case(top))
            },
        )
    }
}

/// Strip parameters and surrounding whitespace from a MIME type.
fn essence(mime_type: &str) -> &str {
    mime_type
        .split_once(';')
        .map_or(mime_type, |(head, _)| head)
        .trim()
}

/// Type and size restrictions applied to every incoming file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    /// Maximum payload size in bytes (inclusive).
    pub max_bytes: u64,
    /// Accepted MIME patterns.
    pub allowed: Vec<MimePattern>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
            allowed: vec![
                MimePattern::new("image/*"),
                MimePattern::new("video/*"),
                MimePattern::new("application/pdf"),
            ],
        }
    }
}

impl UploadLimits {
    /// Whether the declared type is on the allow-list.
    #[must_use]
    pub fn allows_type(&self, mime_type: &str) -> bool {
        self.allowed.iter().any(|p| p.matches(mime_type))
    }

    /// Validate one file's metadata.
    ///
    /// The type check runs first, so a file that is both oversized and of
    /// a disallowed type reports the type problem.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnsupportedType`] if the type is not
    /// allowed, or [`ValidationError::TooLarge`] if `size` exceeds
    /// [`max_bytes`](Self::max_bytes).
    pub fn check(&self, filename: &str, mime_type: &str, size: u64) -> Result<(), ValidationError> {
        if !self.allows_type(mime_type) {
            return Err(ValidationError::UnsupportedType {
                filename: filename.to_owned(),
                mime_type: mime_type.to_owned(),
            });
        }
        if size > self.max_bytes {
            return Err(ValidationError::TooLarge {
                filename: filename.to_owned(),
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Comma-separated pattern list for the file picker's `accept`
    /// attribute.
    #[must_use]
    pub fn accept_attribute(&self) -> String {
        self.allowed
            .iter()
            .map(MimePattern::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Why an incoming file was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The declared MIME type is not on the allow-list.
    #[error("Unsupported file type: {filename} ({})", display_mime(mime_type))]
    UnsupportedType { filename: String, mime_type: String },

    /// The file exceeds the size ceiling.
    #[error(
        "File too large: {filename} ({} exceeds the {} limit)",
        format_size(*size),
        format_size(*limit)
    )]
    TooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },

    /// The browser could not read the file contents.
    #[error("Failed to read {filename}: {reason}")]
    Unreadable { filename: String, reason: String },
}

impl ValidationError {
    /// The name of the rejected file.
    #[must_use]
    pub fn filename(&self) -> &str {
        match self {
            Self::UnsupportedType { filename, .. }
            | Self::TooLarge { filename, .. }
            | Self::Unreadable { filename, .. } => filename,
        }
    }
}

fn display_mime(mime_type: &str) -> &str {
    if mime_type.trim().is_empty() {
        "unknown type"
    } else {
        mime_type
    }
}

/// Combine the rejections from one batch into a single notice.
///
/// Returns `None` when nothing was rejected.
#[must_use]
pub fn compose_notice(errors: &[ValidationError]) -> Option<String> {
    match errors {
        [] => None,
        [only] => Some(only.to_string()),
        many => Some(
            many.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        ),
    }
}

/// Format a byte count for display: `512 B`, `200.0 KB`, `12.5 MB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_patterns_match_any_subtype() {
        let image = MimePattern::new("image/*");
        assert!(image.matches("image/png"));
        assert!(image.matches("IMAGE/JPEG"));
        assert!(image.matches("image/svg+xml; charset=utf-8"));
        assert!(!image.matches("image/"));
        assert!(!image.matches("video/mp4"));
        assert!(!image.matches("imagery/png"));
    }

    #[test]
    fn exact_patterns_match_only_that_type() {
        let pdf = MimePattern::new("application/pdf");
        assert!(pdf.matches("application/pdf"));
        assert!(pdf.matches("Application/PDF"));
        assert!(!pdf.matches("application/pdfx"));
        assert!(!pdf.matches("application/zip"));
    }

    #[test]
    fn empty_type_is_never_allowed() {
        let limits = UploadLimits::default();
        assert!(!limits.allows_type(""));
        assert!(!limits.allows_type("   "));
    }

    #[test]
    fn default_limits_accept_images_video_and_pdf() {
        let limits = UploadLimits::default();
        assert!(limits.check("a.png", "image/png", 200 * 1024).is_ok());
        assert!(limits.check("b.mp4", "video/mp4", 10).is_ok());
        assert!(limits.check("c.pdf", "application/pdf", 10).is_ok());
    }

    #[test]
    fn disallowed_type_names_the_file() {
        let limits = UploadLimits::default();
        let err = limits
            .check("setup.exe", "application/exe", 1024 * 1024)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedType {
                filename: "setup.exe".into(),
                mime_type: "application/exe".into(),
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("Unsupported file type"), "{msg}");
        assert!(msg.contains("setup.exe"), "{msg}");
    }

    #[test]
    fn size_ceiling_is_inclusive() {
        let limits = UploadLimits::default();
        assert!(limits.check("a.png", "image/png", MAX_UPLOAD_BYTES).is_ok());
        let err = limits
            .check("a.png", "image/png", MAX_UPLOAD_BYTES + 1)
            .unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { .. }));
        assert!(err.to_string().contains("50.0 MB limit"), "{err}");
    }

    #[test]
    fn type_is_checked_before_size() {
        let limits = UploadLimits::default();
        let err = limits
            .check("huge.exe", "application/exe", MAX_UPLOAD_BYTES * 2)
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedType { .. }));
    }

    #[test]
    fn unknown_type_reads_naturally() {
        let err = ValidationError::UnsupportedType {
            filename: "blob".into(),
            mime_type: String::new(),
        };
        assert_eq!(err.to_string(), "Unsupported file type: blob (unknown type)");
    }

    #[test]
    fn notice_joins_every_rejection() {
        assert_eq!(compose_notice(&[]), None);

        let errors = vec![
            ValidationError::UnsupportedType {
                filename: "a.exe".into(),
                mime_type: "application/exe".into(),
            },
            ValidationError::TooLarge {
                filename: "b.mov".into(),
                size: MAX_UPLOAD_BYTES + 1,
                limit: MAX_UPLOAD_BYTES,
            },
        ];
        let notice = compose_notice(&errors).unwrap_or_default();
        assert!(notice.contains("a.exe"));
        assert!(notice.contains("b.mov"));
        assert_eq!(errors[1].filename(), "b.mov");
    }

    #[test]
    fn accept_attribute_lists_patterns() {
        assert_eq!(
            UploadLimits::default().accept_attribute(),
            "image/*,video/*,application/pdf"
        );
    }

    #[test]
    fn sizes_format_with_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(200 * 1024), "200.0 KB");
        assert_eq!(format_size(MAX_UPLOAD_BYTES), "50.0 MB");
    }
}
