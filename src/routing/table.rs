//! Compiled route table.
//!
//! # Responsibilities
//! - Group route records by raw route (application name + route) and method
//! - Compile the patterns into a [`RouteMatcher`]
//! - Convert to/from the JSON document persisted next to the application
//!
//! # Design Decisions
//! - Aliases share the records of their canonical route
//! - Declaration order is kept so that equal-rank patterns resolve the same
//!   way on every rebuild

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::routing::matcher::{RouteMatcher, RoutePattern};
use crate::routing::route::{RouteRecord, RouteValues};
use crate::routing::router::RouterError;

/// On-disk form of a compiled route table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledRouteFile {
    pub application: String,
    pub fingerprint: String,
    pub generated_at: DateTime<Utc>,
    pub routes: Vec<RouteValues>,
}

/// Every record registered under one raw route.
#[derive(Debug)]
pub struct RouteEntry {
    pattern: String,
    methods: BTreeMap<String, RouteRecord>,
}

impl RouteEntry {
    /// Raw route pattern, starting with the application name.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Records keyed by HTTP method.
    pub fn methods(&self) -> &BTreeMap<String, RouteRecord> {
        &self.methods
    }
}

/// A route chosen for a request target.
#[derive(Debug, Clone)]
pub struct RouteSelection {
    entry: Arc<RouteEntry>,
    params: BTreeMap<String, String>,
}

impl RouteSelection {
    /// Raw route pattern that matched.
    pub fn pattern(&self) -> &str {
        &self.entry.pattern
    }

    /// Every method configured for the matched route.
    pub fn routes(&self) -> &BTreeMap<String, RouteRecord> {
        &self.entry.methods
    }

    /// The record for `method`, if that method is configured.
    pub fn route_for(&self, method: &str) -> Option<&RouteRecord> {
        self.entry.methods.get(&method.to_ascii_uppercase())
    }

    /// Methods accepted on this route, sorted.
    pub fn allowed_methods(&self) -> Vec<String> {
        self.entry.methods.keys().cloned().collect()
    }

    /// Parameters extracted from the request target.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

/// Immutable, compiled set of routes of one application.
#[derive(Debug)]
pub struct RouteTable {
    application: String,
    fingerprint: String,
    generated_at: DateTime<Utc>,
    records: Vec<RouteRecord>,
    matcher: RouteMatcher<Arc<RouteEntry>>,
}

impl RouteTable {
    /// Table with no routes, used before the first build.
    pub fn empty(application: &str) -> Self {
        Self {
            application: application.to_string(),
            fingerprint: String::new(),
            generated_at: Utc::now(),
            records: Vec::new(),
            matcher: RouteMatcher::new(),
        }
    }

    /// Compile records into a table.
    pub fn compile(
        application: &str,
        records: Vec<RouteRecord>,
        fingerprint: String,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, RouterError> {
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, BTreeMap<String, RouteRecord>> = HashMap::new();

        for record in &records {
            for route in record.routes() {
                let raw = raw_route(application, route);
                let methods = grouped.entry(raw.clone()).or_insert_with(|| {
                    order.push(raw.clone());
                    BTreeMap::new()
                });
                if methods.contains_key(record.method()) {
                    return Err(RouterError::DuplicateRoute {
                        pattern: raw,
                        method: record.method().to_string(),
                    });
                }
                methods.insert(record.method().to_string(), record.clone());
            }
        }

        let mut matcher = RouteMatcher::new();
        for raw in order {
            let methods = grouped.remove(&raw).unwrap_or_default();
            let pattern = RoutePattern::parse(&raw)?;
            let entry = Arc::new(RouteEntry {
                pattern: raw,
                methods,
            });
            matcher.insert(pattern, entry)?;
        }

        Ok(Self {
            application: application.to_string(),
            fingerprint,
            generated_at,
            records,
            matcher,
        })
    }

    /// Rebuild a table from its persisted form.
    pub fn from_file(file: CompiledRouteFile) -> Result<Self, RouterError> {
        let records = file
            .routes
            .iter()
            .map(RouteRecord::from_values)
            .collect::<Result<Vec<_>, _>>()?;
        Self::compile(&file.application, records, file.fingerprint, file.generated_at)
    }

    /// Persisted form of this table.
    pub fn to_file(&self) -> CompiledRouteFile {
        CompiledRouteFile {
            application: self.application.clone(),
            fingerprint: self.fingerprint.clone(),
            generated_at: self.generated_at,
            routes: self.records.iter().map(RouteRecord::to_values).collect(),
        }
    }

    /// Match a raw route target (application name first, no query string).
    pub fn find(&self, target: &str) -> Option<RouteSelection> {
        self.matcher.find(target).map(|m| RouteSelection {
            entry: Arc::clone(m.value),
            params: m.params,
        })
    }

    /// Registered entries in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.matcher.iter().map(|(_, entry)| entry.as_ref())
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn len(&self) -> usize {
        self.matcher.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.is_empty()
    }
}

/// Prefix an application-relative route with the application name.
pub fn raw_route(application: &str, route: &str) -> String {
    let route = route.trim_end_matches('/');
    format!("/{application}{route}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(decl: &str, method: &str) -> RouteRecord {
        let mut values: RouteValues = decl.parse().unwrap();
        values.method = Some(method.to_string());
        values.application = Some("site".into());
        RouteRecord::from_values(&values).unwrap()
    }

    #[test]
    fn raw_route_joins_application() {
        assert_eq!(raw_route("site", "/"), "/site");
        assert_eq!(raw_route("site", "/users/"), "/site/users");
    }

    #[test]
    fn aliases_and_methods_share_an_entry() {
        let records = vec![
            record("GET,HEAD /users /people users:list", "GET"),
            record("GET,HEAD /users /people users:list", "HEAD"),
            record("POST /users users:create", "POST"),
        ];
        let table = RouteTable::compile("site", records, "fp".into(), Utc::now()).unwrap();
        assert_eq!(table.len(), 2);

        let selection = table.find("/site/users").unwrap();
        assert_eq!(selection.allowed_methods(), vec!["GET", "HEAD", "POST"]);
        assert_eq!(selection.route_for("post").unwrap().action(), "create");

        let alias = table.find("/site/people").unwrap();
        assert_eq!(alias.allowed_methods(), vec!["GET", "HEAD"]);
    }

    #[test]
    fn duplicate_method_is_rejected() {
        let records = vec![
            record("GET /users users:list", "GET"),
            record("GET /users admin:list", "GET"),
        ];
        let err = RouteTable::compile("site", records, "fp".into(), Utc::now()).unwrap_err();
        assert!(matches!(err, RouterError::DuplicateRoute { .. }));
    }

    #[test]
    fn persisted_form_rebuilds_same_table() {
        let records = vec![record("GET /users/{id} users:show", "GET")];
        let table = RouteTable::compile("site", records, "abc".into(), Utc::now()).unwrap();
        let file = table.to_file();
        let json = serde_json::to_string(&file).unwrap();
        let rebuilt = RouteTable::from_file(serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(rebuilt.fingerprint(), "abc");
        let selection = rebuilt.find("/site/users/9").unwrap();
        assert_eq!(selection.params()["id"], "9");
    }
}
