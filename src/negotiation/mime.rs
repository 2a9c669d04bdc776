//! Mimetype negotiation.

use serde::Serialize;

use crate::routing::mime::{canonical_for, MimeEntry};

/// Outcome of a mimetype negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MimeNegotiation {
    /// Whether the route can answer with the selected mime.
    pub valid: bool,
    /// Short name (extension) of the selected mime.
    pub mime: String,
    /// Canonical mimetype of the selected mime.
    pub mimetype: String,
}

impl MimeNegotiation {
    fn accepted(entry: &MimeEntry) -> Self {
        Self {
            valid: true,
            mime: entry.mime.clone(),
            mimetype: entry.mimetype.clone(),
        }
    }

    fn rejected() -> Self {
        Self {
            valid: false,
            mime: String::new(),
            mimetype: String::new(),
        }
    }
}

/// Choose the mimetype a route answers with.
///
/// `request_mimes` must already be ordered by preference (see
/// [`crate::negotiation::accept::preferred_values`]). `force_mime` is a short
/// name that wins over the request, even when the route cannot produce it;
/// in that case the result is marked invalid.
pub fn negotiate_mime_type(
    route_mimes: &[MimeEntry],
    is_use_xhtml: bool,
    request_mimes: Option<&[String]>,
    force_mime: Option<&str>,
) -> MimeNegotiation {
    if let Some(forced) = force_mime.map(|f| f.trim().to_ascii_lowercase()).filter(|f| !f.is_empty()) {
        return match route_mimes.iter().find(|e| e.mime == forced) {
            Some(entry) => MimeNegotiation::accepted(entry),
            None => MimeNegotiation {
                valid: false,
                mimetype: canonical_for(&forced).unwrap_or_default().to_string(),
                mime: forced,
            },
        };
    }

    let Some(first) = route_mimes.first() else {
        return MimeNegotiation::rejected();
    };

    let requested = request_mimes.unwrap_or_default();
    let selected = if requested.is_empty() {
        Some(first)
    } else {
        requested.iter().find_map(|wanted| select(route_mimes, wanted))
    };

    match selected {
        Some(entry) => {
            let entry = prefer_xhtml(route_mimes, is_use_xhtml, entry);
            MimeNegotiation::accepted(entry)
        }
        None => MimeNegotiation::rejected(),
    }
}

fn select<'a>(route_mimes: &'a [MimeEntry], wanted: &str) -> Option<&'a MimeEntry> {
    let wanted = wanted
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if wanted == "*/*" || wanted == "*" {
        return route_mimes.first();
    }
    if let Some(top) = wanted.strip_suffix("/*") {
        return route_mimes.iter().find(|e| e.top_level() == top);
    }
    route_mimes.iter().find(|e| e.mimetype == wanted)
}

fn prefer_xhtml<'a>(route_mimes: &'a [MimeEntry], is_use_xhtml: bool, entry: &'a MimeEntry) -> &'a MimeEntry {
    if is_use_xhtml && entry.mime == "html" {
        if let Some(xhtml) = route_mimes.iter().find(|e| e.mime == "xhtml") {
            return xhtml;
        }
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mimes(short: &[&str]) -> Vec<MimeEntry> {
        short.iter().map(|s| MimeEntry::known(s).unwrap()).collect()
    }

    fn request(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_request_takes_route_default() {
        let route = mimes(&["json", "html"]);
        let got = negotiate_mime_type(&route, false, None, None);
        assert!(got.valid);
        assert_eq!(got.mime, "json");
    }

    #[test]
    fn request_order_decides() {
        let route = mimes(&["json", "html"]);
        let req = request(&["text/html", "application/json"]);
        let got = negotiate_mime_type(&route, false, Some(&req), None);
        assert_eq!(got.mime, "html");
        assert_eq!(got.mimetype, "text/html");
    }

    #[test]
    fn wildcards_resolve_against_route() {
        let route = mimes(&["json", "txt", "csv"]);
        let req = request(&["text/*"]);
        assert_eq!(negotiate_mime_type(&route, false, Some(&req), None).mime, "txt");

        let req = request(&["image/png", "*/*"]);
        assert_eq!(negotiate_mime_type(&route, false, Some(&req), None).mime, "json");
    }

    #[test]
    fn xhtml_preferred_when_enabled() {
        let route = mimes(&["html", "xhtml"]);
        let req = request(&["text/html"]);
        assert_eq!(negotiate_mime_type(&route, true, Some(&req), None).mime, "xhtml");
        assert_eq!(negotiate_mime_type(&route, false, Some(&req), None).mime, "html");
    }

    #[test]
    fn unmatched_request_is_invalid() {
        let route = mimes(&["json"]);
        let req = request(&["text/html"]);
        let got = negotiate_mime_type(&route, false, Some(&req), None);
        assert!(!got.valid);
    }

    #[test]
    fn force_overrides_request() {
        let route = mimes(&["html", "json"]);
        let req = request(&["text/html"]);
        let got = negotiate_mime_type(&route, false, Some(&req), Some("json"));
        assert!(got.valid);
        assert_eq!(got.mime, "json");

        let got = negotiate_mime_type(&route, false, Some(&req), Some("pdf"));
        assert!(!got.valid);
        assert_eq!(got.mime, "pdf");
        assert_eq!(got.mimetype, "application/pdf");
    }
}
