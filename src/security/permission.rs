//! Profile permission entries.
//!
//! An entry reads `"<METHOD|*> <raw route|prefix/*|*>"`, for example
//! `"GET /site/users/{id}"`, `"* /site/admin/*"` or `"POST *"`. Routes are
//! raw: they start with the application name.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::routing::route::normalize_method;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid permission '{entry}': {reason}")]
pub struct PermissionError {
    pub entry: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Any,
    Exact(String),
    Prefix(String),
}

/// A parsed permission entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    method: Option<String>,
    target: Target,
}

impl Permission {
    /// Whether this entry grants `method` on the raw route pattern `raw_route`.
    pub fn matches(&self, method: &str, raw_route: &str) -> bool {
        if let Some(m) = &self.method {
            if !m.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        let raw_route = trim_route(raw_route);
        match &self.target {
            Target::Any => true,
            Target::Exact(route) => route.eq_ignore_ascii_case(raw_route),
            Target::Prefix(prefix) => {
                let lower = raw_route.to_ascii_lowercase();
                lower == *prefix
                    || lower
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

fn trim_route(route: &str) -> &str {
    match route.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

impl FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason| PermissionError {
            entry: s.to_string(),
            reason,
        };
        let mut parts = s.split_whitespace();
        let (Some(method), Some(route), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(fail("expected '<METHOD> <route>'"));
        };

        let method = if method == "*" {
            None
        } else {
            Some(normalize_method(method).map_err(|_| fail("unknown HTTP method"))?)
        };

        let target = if route == "*" {
            Target::Any
        } else if !route.starts_with('/') {
            return Err(fail("route must start with '/'"));
        } else if let Some(prefix) = route.strip_suffix("/*") {
            Target::Prefix(trim_route(prefix).to_ascii_lowercase())
        } else {
            Target::Exact(trim_route(route).to_string())
        };

        Ok(Self { method, target })
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = self.method.as_deref().unwrap_or("*");
        match &self.target {
            Target::Any => write!(f, "{method} *"),
            Target::Exact(route) => write!(f, "{method} {route}"),
            Target::Prefix(prefix) => write!(f, "{method} {prefix}/*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_entry_matches_method_and_route() {
        let p: Permission = "get /site/users/{id}".parse().unwrap();
        assert!(p.matches("GET", "/site/users/{id}"));
        assert!(p.matches("GET", "/site/users/{id}/"));
        assert!(!p.matches("POST", "/site/users/{id}"));
        assert!(!p.matches("GET", "/site/users"));
        assert_eq!(p.to_string(), "GET /site/users/{id}");
    }

    #[test]
    fn wildcards() {
        let all: Permission = "* *".parse().unwrap();
        assert!(all.matches("DELETE", "/site/anything"));

        let prefix: Permission = "* /site/admin/*".parse().unwrap();
        assert!(prefix.matches("POST", "/site/admin"));
        assert!(prefix.matches("GET", "/site/admin/users/{id}"));
        assert!(!prefix.matches("GET", "/site/administration"));
    }

    #[test]
    fn malformed_entries_are_rejected() {
        assert!("GET".parse::<Permission>().is_err());
        assert!("FETCH /site".parse::<Permission>().is_err());
        assert!("GET site/users".parse::<Permission>().is_err());
        assert!("GET /a /b".parse::<Permission>().is_err());
    }
}
