//! Route pattern matching logic.
//!
//! # Responsibilities
//! - Parse route patterns (`/users/{id}`, `/files/{*path}`)
//! - Match a request path and extract its parameters
//! - Rank overlapping patterns deterministically
//!
//! # Design Decisions
//! - Literal segments are case-sensitive
//! - All-literal patterns live in a map and are checked first
//! - Dynamic patterns are ranked: more literal segments, then fewer
//!   catch-alls, then more segments, then registration order
//! - No regex to guarantee O(n) matching

use std::collections::{BTreeMap, HashMap};

use crate::routing::route::RouteError;

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parse a pattern. The pattern must start with `/`; a catch-all may
    /// only appear as the last segment.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        if !raw.starts_with('/') {
            return Err(invalid(raw, "must start with `/`"));
        }

        let parts: Vec<&str> = split_path(raw).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if let Some(name) = inner.strip_prefix('*') {
                    if i != parts.len() - 1 {
                        return Err(invalid(raw, "a catch-all must be the last segment"));
                    }
                    Segment::CatchAll(param_name(raw, name)?)
                } else {
                    Segment::Param(param_name(raw, inner)?)
                }
            } else if part.contains('{') || part.contains('}') {
                return Err(invalid(raw, "parameters must span a whole segment"));
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        let mut seen: Vec<&str> = Vec::new();
        for segment in &segments {
            if let Segment::Param(name) | Segment::CatchAll(name) = segment {
                if seen.contains(&name.as_str()) {
                    return Err(invalid(raw, "parameter names must be unique"));
                }
                seen.push(name);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern has no parameters.
    pub fn is_static(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Pattern with parameter names erased; two patterns with the same shape
    /// can never be told apart.
    pub fn shape(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(l) => out.push_str(l),
                Segment::Param(_) => out.push_str("{}"),
                Segment::CatchAll(_) => out.push_str("{*}"),
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }

    /// Names of the parameters, in order.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(n) | Segment::CatchAll(n) => Some(n.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    fn catch_all_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::CatchAll(_)))
            .count()
    }

    /// Match path segments, returning the extracted parameters.
    fn captures(&self, parts: &[&str]) -> Option<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(expected) => {
                    if parts.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.insert(name.clone(), decode_segment(value));
                }
                Segment::CatchAll(name) => {
                    if parts.len() <= i {
                        return None;
                    }
                    let rest: Vec<String> = parts[i..].iter().map(|p| decode_segment(p)).collect();
                    params.insert(name.clone(), rest.join("/"));
                    return Some(params);
                }
            }
        }
        (parts.len() == self.segments.len()).then_some(params)
    }
}

impl std::fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Result of a successful match.
#[derive(Debug)]
pub struct Match<'a, T> {
    pub pattern: &'a RoutePattern,
    pub value: &'a T,
    pub params: BTreeMap<String, String>,
}

/// Errors raised while registering patterns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatcherError {
    #[error("pattern `{second}` conflicts with `{first}`")]
    Conflict { first: String, second: String },
}

/// Ordered collection of patterns mapped to values.
#[derive(Debug)]
pub struct RouteMatcher<T> {
    entries: Vec<(RoutePattern, T)>,
    exact: HashMap<String, usize>,
    shapes: HashMap<String, usize>,
    dynamic: Vec<usize>,
}

impl<T> Default for RouteMatcher<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            exact: HashMap::new(),
            shapes: HashMap::new(),
            dynamic: Vec::new(),
        }
    }
}

impl<T> RouteMatcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern. Fails when a pattern of the same shape exists.
    pub fn insert(&mut self, pattern: RoutePattern, value: T) -> Result<(), MatcherError> {
        let shape = pattern.shape();
        if let Some(&existing) = self.shapes.get(&shape) {
            return Err(MatcherError::Conflict {
                first: self.entries[existing].0.raw.clone(),
                second: pattern.raw,
            });
        }

        let index = self.entries.len();
        self.shapes.insert(shape.clone(), index);
        if pattern.is_static() {
            self.exact.insert(shape, index);
        } else {
            self.dynamic.push(index);
            let entries = &self.entries;
            let rank = |i: usize| {
                let p: &RoutePattern = if i == index { &pattern } else { &entries[i].0 };
                (
                    std::cmp::Reverse(p.literal_count()),
                    p.catch_all_count(),
                    std::cmp::Reverse(p.segments.len()),
                    i,
                )
            };
            self.dynamic.sort_by_key(|&i| rank(i));
        }
        self.entries.push((pattern, value));
        Ok(())
    }

    /// Find the best pattern for `path`.
    pub fn find(&self, path: &str) -> Option<Match<'_, T>> {
        let parts: Vec<&str> = split_path(path).collect();
        let key = if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", parts.join("/"))
        };

        if let Some(&i) = self.exact.get(&key) {
            let (pattern, value) = &self.entries[i];
            return Some(Match {
                pattern,
                value,
                params: BTreeMap::new(),
            });
        }

        self.dynamic.iter().find_map(|&i| {
            let (pattern, value) = &self.entries[i];
            pattern.captures(&parts).map(|params| Match {
                pattern,
                value,
                params,
            })
        })
    }

    /// Every registered pattern with its value, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&RoutePattern, &T)> {
        self.entries.iter().map(|(p, v)| (p, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty())
}

fn param_name(raw: &str, name: &str) -> Result<String, RouteError> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name.to_string())
    } else {
        Err(invalid(raw, "parameter names must be alphanumeric"))
    }
}

fn invalid(raw: &str, reason: &str) -> RouteError {
    RouteError::InvalidValue {
        field: "routes",
        reason: format!("`{raw}` {reason}"),
    }
}

/// Percent-decode a path segment. A literal `+` stays a `+`.
fn decode_segment(segment: &str) -> String {
    let escaped = segment.replace('+', "%2B").replace('&', "%26");
    url::form_urlencoded::parse(format!("v={escaped}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> RouteMatcher<usize> {
        let mut m = RouteMatcher::new();
        for (i, p) in patterns.iter().enumerate() {
            m.insert(RoutePattern::parse(p).unwrap(), i).unwrap();
        }
        m
    }

    #[test]
    fn static_match_ignores_trailing_slash() {
        let m = matcher(&["/site/users", "/site"]);
        assert_eq!(*m.find("/site/users/").unwrap().value, 0);
        assert_eq!(*m.find("/site").unwrap().value, 1);
        assert!(m.find("/site/Users").is_none());
    }

    #[test]
    fn root_matches_empty_path() {
        let m = matcher(&["/"]);
        assert!(m.find("").is_some());
        assert!(m.find("/").is_some());
    }

    #[test]
    fn params_are_extracted_and_decoded() {
        let m = matcher(&["/site/users/{id}/posts/{slug}"]);
        let found = m.find("/site/users/42/posts/hello%20world+x").unwrap();
        assert_eq!(found.params["id"], "42");
        assert_eq!(found.params["slug"], "hello world+x");
    }

    #[test]
    fn literal_beats_param_regardless_of_order() {
        let m = matcher(&["/site/users/{id}", "/site/users/new"]);
        assert_eq!(*m.find("/site/users/new").unwrap().value, 1);
        assert_eq!(*m.find("/site/users/7").unwrap().value, 0);
    }

    #[test]
    fn more_literals_win_among_dynamic_patterns() {
        let m = matcher(&["/site/{a}/{b}", "/site/{a}/edit"]);
        assert_eq!(*m.find("/site/x/edit").unwrap().value, 1);
        assert_eq!(*m.find("/site/x/y").unwrap().value, 0);
    }

    #[test]
    fn catch_all_is_last_resort() {
        let m = matcher(&["/site/files/{*path}", "/site/files/{name}"]);
        assert_eq!(*m.find("/site/files/a.txt").unwrap().value, 1);
        let deep = m.find("/site/files/docs/a.txt").unwrap();
        assert_eq!(*deep.value, 0);
        assert_eq!(deep.params["path"], "docs/a.txt");
        assert!(m.find("/site/files").is_none());
    }

    #[test]
    fn longer_pattern_wins_at_equal_literals_and_catch_alls() {
        let m = matcher(&["/s/{a}/{*r}", "/s/{a}/{b}/{*r}"]);
        let deep = m.find("/s/x/y/z").unwrap();
        assert_eq!(*deep.value, 1);
        assert_eq!(deep.params["b"], "y");
        assert_eq!(deep.params["r"], "z");

        let short = m.find("/s/x/y").unwrap();
        assert_eq!(*short.value, 0);
        assert_eq!(short.params["r"], "y");
    }

    #[test]
    fn registration_order_breaks_equal_ranks() {
        let m = matcher(&["/s/{a}/x", "/s/x/{b}"]);
        assert_eq!(*m.find("/s/x/x").unwrap().value, 0);

        let reversed = matcher(&["/s/x/{b}", "/s/{a}/x"]);
        assert_eq!(*reversed.find("/s/x/x").unwrap().value, 0);
        assert_eq!(reversed.find("/s/x/x").unwrap().params["b"], "x");
    }

    #[test]
    fn rebuilding_from_the_same_list_selects_the_same_routes() {
        let patterns = [
            "/s/{a}/x",
            "/s/x/{b}",
            "/s/{a}/{*r}",
            "/s/{a}/{b}/{*r}",
            "/s/x/x/y",
            "/s/{a}",
        ];
        let paths = ["/s/x/x", "/s/x/x/y", "/s/q/w/e/r", "/s/q", "/s/q/x", "/s/x/q"];
        let first: Vec<_> = {
            let m = matcher(&patterns);
            paths.iter().map(|p| m.find(p).map(|f| *f.value)).collect()
        };
        for _ in 0..5 {
            let m = matcher(&patterns);
            let again: Vec<_> = paths.iter().map(|p| m.find(p).map(|f| *f.value)).collect();
            assert_eq!(again, first);
        }
        assert_eq!(first, vec![Some(0), Some(4), Some(3), Some(5), Some(0), Some(1)]);
    }

    #[test]
    fn same_shape_conflicts() {
        let mut m = matcher(&["/site/users/{id}"]);
        let err = m
            .insert(RoutePattern::parse("/site/users/{name}").unwrap(), 9)
            .unwrap_err();
        assert!(matches!(err, MatcherError::Conflict { .. }));
    }

    #[test]
    fn query_and_fragment_are_ignored() {
        let m = matcher(&["/site/search"]);
        assert!(m.find("/site/search?q=1#top").is_some());
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(RoutePattern::parse("users").is_err());
        assert!(RoutePattern::parse("/a/{*rest}/b").is_err());
        assert!(RoutePattern::parse("/a/x{id}").is_err());
        assert!(RoutePattern::parse("/a/{id}/{id}").is_err());
        assert!(RoutePattern::parse("/a/{}").is_err());
    }
}
