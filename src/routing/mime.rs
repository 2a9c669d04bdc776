//! Known mimetypes and their short (extension) names.
//!
//! Routes declare what they can answer with short names (`json`, `html`)
//! and the negotiator compares those against canonical mimetypes sent by
//! the UA in `Accept`.

use serde::{Deserialize, Serialize};

/// Short name → canonical mimetype.
const KNOWN_MIMES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("xhtml", "application/xhtml+xml"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("pdf", "application/pdf"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("gif", "image/gif"),
    ("zip", "application/zip"),
    ("xls", "application/vnd.ms-excel"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
];

/// Look up the canonical mimetype for a short name.
pub fn canonical_for(short: &str) -> Option<&'static str> {
    let short = short.trim().to_ascii_lowercase();
    KNOWN_MIMES
        .iter()
        .find(|(s, _)| *s == short)
        .map(|(_, canonical)| *canonical)
}

/// Look up the short name for a canonical mimetype.
pub fn short_for(canonical: &str) -> Option<&'static str> {
    let canonical = canonical.trim().to_ascii_lowercase();
    KNOWN_MIMES
        .iter()
        .find(|(_, c)| *c == canonical)
        .map(|(short, _)| *short)
}

/// True for mimetypes that should carry a `charset` parameter.
pub fn is_textual(mimetype: &str) -> bool {
    mimetype.starts_with("text/")
        || matches!(
            mimetype,
            "application/json"
                | "application/xml"
                | "application/xhtml+xml"
                | "application/javascript"
                | "image/svg+xml"
        )
}

/// True when the short name denotes a document a browser renders as a page.
pub fn is_markup(mime: &str) -> bool {
    matches!(mime, "html" | "xhtml")
}

/// One mime a route can answer with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeEntry {
    /// Short name, e.g. `json`.
    pub mime: String,
    /// Canonical mimetype, e.g. `application/json`.
    pub mimetype: String,
}

impl MimeEntry {
    /// Build an entry from a known short name.
    pub fn known(short: &str) -> Option<Self> {
        canonical_for(short).map(|canonical| Self {
            mime: short.trim().to_ascii_lowercase(),
            mimetype: canonical.to_string(),
        })
    }

    /// The part before `/` of the canonical mimetype.
    pub fn top_level(&self) -> &str {
        self.mimetype.split('/').next().unwrap_or_default()
    }
}

/// Input form of an accepted mime: either a bare short name or an explicit
/// short → canonical pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MimeSpec {
    Short(String),
    Full { mime: String, mimetype: String },
}

impl From<&str> for MimeSpec {
    fn from(value: &str) -> Self {
        MimeSpec::Short(value.to_string())
    }
}

impl From<MimeEntry> for MimeSpec {
    fn from(entry: MimeEntry) -> Self {
        MimeSpec::Full {
            mime: entry.mime,
            mimetype: entry.mimetype,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_case_insensitive() {
        assert_eq!(canonical_for("JSON"), Some("application/json"));
        assert_eq!(short_for("Text/HTML"), Some("html"));
        assert_eq!(canonical_for("docx"), None);
    }

    #[test]
    fn textual_types_get_charset() {
        assert!(is_textual("text/csv"));
        assert!(is_textual("application/json"));
        assert!(!is_textual("image/png"));
    }

    #[test]
    fn spec_deserializes_both_forms() {
        let specs: Vec<MimeSpec> = serde_json::from_str(
            r#"["txt", {"mime": "md", "mimetype": "text/markdown"}]"#,
        )
        .unwrap();
        assert_eq!(specs[0], MimeSpec::Short("txt".into()));
        assert_eq!(
            specs[1],
            MimeSpec::Full {
                mime: "md".into(),
                mimetype: "text/markdown".into()
            }
        );
    }
}
