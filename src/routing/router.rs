//! Route lookup and route table maintenance.
//!
//! # Responsibilities
//! - Merge application defaults, controller defaults and route declarations
//! - Compile, persist and reload the application's route table
//! - Decide when the persisted table is stale
//! - Look up the route for a request target
//!
//! # Design Decisions
//! - The live table is swapped atomically; lookups never block
//! - Staleness is detected with a SHA-256 fingerprint of every declaration
//!   instead of file modification times
//! - Explicit no-match (`None`) rather than a silent default

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::observability::metrics;
use crate::routing::matcher::MatcherError;
use crate::routing::mime::MimeSpec;
use crate::routing::route::{RouteError, RouteRecord, RouteValues};
use crate::routing::table::{CompiledRouteFile, RouteSelection, RouteTable};

/// Errors raised while building or loading a route table.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("route table update is not allowed: routes are up to date and updates are disabled")]
    UpdateNotAllowed,

    #[error("route table I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("route table format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("invalid route `{route}`: {source}")]
    InvalidRoute { route: String, source: RouteError },

    #[error(transparent)]
    Conflict(#[from] MatcherError),

    #[error("route `{pattern}` declares method {method} more than once")]
    DuplicateRoute { pattern: String, method: String },

    #[error("route `{route}` uses unknown middleware `{name}`")]
    UnknownMiddleware { route: String, name: String },

    #[error("route table belongs to application `{found}`, expected `{expected}`")]
    ForeignTable { expected: String, found: String },
}

/// Route declarations of one controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerRoutes {
    pub controller: String,
    pub defaults: RouteValues,
    pub routes: Vec<RouteValues>,
}

/// Everything a router needs to know about its application.
#[derive(Debug, Clone, Default)]
pub struct RouterSettings {
    pub application: String,
    pub controllers_namespace: String,
    pub table_path: PathBuf,
    pub declarations: Vec<ControllerRoutes>,
    pub known_middlewares: BTreeSet<String>,
}

/// Routes URLs of one application to its controllers and actions.
#[derive(Debug)]
pub struct Router {
    settings: RouterSettings,
    defaults: ArcSwap<RouteValues>,
    is_update_routes: AtomicBool,
    table: ArcSwap<RouteTable>,
    generation: AtomicU64,
}

impl Router {
    /// Create a router with an empty table. Call [`Router::load_or_build`]
    /// before serving.
    pub fn new(settings: RouterSettings) -> Self {
        let table = RouteTable::empty(&settings.application);
        Self {
            settings,
            defaults: ArcSwap::from_pointee(RouteValues::default()),
            is_update_routes: AtomicBool::new(false),
            table: ArcSwap::from_pointee(table),
            generation: AtomicU64::new(0),
        }
    }

    /// Default values applied to every route of the application.
    pub fn set_default_route_config(&self, defaults: RouteValues) {
        self.defaults.store(Arc::new(defaults));
    }

    /// Allow rebuilding the route table even when it looks up to date.
    pub fn set_is_update_routes(&self, value: bool) {
        self.is_update_routes.store(value, Ordering::Relaxed);
    }

    /// Delete the persisted route table so that the next check rebuilds it.
    pub fn force_update_routes(&self) -> Result<(), RouterError> {
        match std::fs::remove_file(&self.settings.table_path) {
            Ok(()) => {
                tracing::info!(
                    application = %self.settings.application,
                    path = ?self.settings.table_path,
                    "Route table removed"
                );
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// True when the route table must be rebuilt: updates are enabled, the
    /// persisted table is missing or unreadable, or the declarations changed
    /// since it was written.
    pub fn check_for_update_application_routes(&self) -> bool {
        if self.is_update_routes.load(Ordering::Relaxed) {
            return true;
        }
        match self.read_table_file() {
            Ok(file) => file.fingerprint != self.fingerprint(),
            Err(_) => true,
        }
    }

    /// Rebuild, persist and activate the route table.
    ///
    /// Only allowed when [`Router::check_for_update_application_routes`]
    /// returns `true`.
    pub fn update_application_routes(&self) -> Result<(), RouterError> {
        if !self.check_for_update_application_routes() {
            return Err(RouterError::UpdateNotAllowed);
        }

        let records = self.build_records()?;
        let table = RouteTable::compile(
            &self.settings.application,
            records,
            self.fingerprint(),
            Utc::now(),
        )?;
        self.write_table_file(&table.to_file())?;

        tracing::info!(
            application = %self.settings.application,
            routes = table.len(),
            path = ?self.settings.table_path,
            "Route table rebuilt"
        );
        metrics::record_route_rebuild(&self.settings.application);
        self.activate(table);
        Ok(())
    }

    /// Load the persisted table when it is fresh, rebuild it otherwise.
    pub fn load_or_build(&self) -> Result<(), RouterError> {
        if self.check_for_update_application_routes() {
            return self.update_application_routes();
        }

        let file = self.read_table_file()?;
        if file.application != self.settings.application {
            return Err(RouterError::ForeignTable {
                expected: self.settings.application.clone(),
                found: file.application,
            });
        }
        let table = RouteTable::from_file(file)?;
        tracing::debug!(
            application = %self.settings.application,
            routes = table.len(),
            "Route table loaded from disk"
        );
        self.activate(table);
        Ok(())
    }

    /// Drop the persisted table and rebuild it.
    pub fn rebuild(&self) -> Result<(), RouterError> {
        self.force_update_routes()?;
        self.update_application_routes()
    }

    /// Find the route for a raw target such as `/site/users/42`.
    ///
    /// The target must start with the application name and carry no query
    /// string or fragment.
    pub fn select_target_raw_route(&self, target: &str) -> Option<RouteSelection> {
        self.table.load().find(target)
    }

    /// Currently active table.
    pub fn table(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    /// Incremented on every table swap.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn application(&self) -> &str {
        &self.settings.application
    }

    pub fn table_path(&self) -> &Path {
        &self.settings.table_path
    }

    /// SHA-256 over the defaults and every controller declaration.
    pub fn fingerprint(&self) -> String {
        let defaults = self.defaults.load();
        let mut hasher = Sha256::new();
        hasher.update(self.settings.application.as_bytes());
        hasher.update(self.settings.controllers_namespace.as_bytes());
        if let Ok(bytes) = serde_json::to_vec(&**defaults) {
            hasher.update(&bytes);
        }
        if let Ok(bytes) = serde_json::to_vec(&self.settings.declarations) {
            hasher.update(&bytes);
        }
        for name in &self.settings.known_middlewares {
            hasher.update(name.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    fn activate(&self, table: RouteTable) {
        self.table.store(Arc::new(table));
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn build_records(&self) -> Result<Vec<RouteRecord>, RouterError> {
        let defaults = self.defaults.load();
        let application = &self.settings.application;
        let mut records = Vec::new();

        for declaration in &self.settings.declarations {
            let controller_base = declaration.defaults.layered_over(&defaults);

            for route in &declaration.routes {
                let mut values = route.layered_over(&controller_base);
                values.application = Some(application.clone());
                let controller = values
                    .controller
                    .get_or_insert_with(|| declaration.controller.clone())
                    .clone();
                if values.namespace.is_none() {
                    values.namespace = Some(if self.settings.controllers_namespace.is_empty() {
                        controller.clone()
                    } else {
                        format!("{}::{}", self.settings.controllers_namespace, controller)
                    });
                }
                if values.accept_mimes.is_none() {
                    values.accept_mimes = Some(vec![MimeSpec::from("html")]);
                }

                let mut methods = values.effective_methods();
                if methods.is_empty() {
                    methods.push("GET".to_string());
                }
                let label = format!(
                    "{}:{} {}",
                    controller,
                    values.action.as_deref().unwrap_or("?"),
                    values
                        .routes
                        .as_ref()
                        .and_then(|r| r.first())
                        .map(String::as_str)
                        .unwrap_or("?"),
                );

                for method in &methods {
                    let mut per_method = values.clone();
                    per_method.method = Some(method.clone());
                    per_method.allowed_methods = Some(methods.clone());
                    let record = RouteRecord::from_values(&per_method).map_err(|source| {
                        RouterError::InvalidRoute {
                            route: label.clone(),
                            source,
                        }
                    })?;
                    if record.action().is_empty() || record.routes().is_empty() {
                        return Err(RouterError::InvalidRoute {
                            route: label,
                            source: RouteError::InvalidValue {
                                field: "action",
                                reason: "every route needs an action and a path".into(),
                            },
                        });
                    }
                    if let Some(unknown) = record
                        .middlewares()
                        .iter()
                        .find(|m| !self.settings.known_middlewares.contains(*m))
                    {
                        return Err(RouterError::UnknownMiddleware {
                            route: label,
                            name: unknown.clone(),
                        });
                    }
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    fn read_table_file(&self) -> Result<CompiledRouteFile, RouterError> {
        let content = std::fs::read(&self.settings.table_path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    fn write_table_file(&self, file: &CompiledRouteFile) -> Result<(), RouterError> {
        let path = &self.settings.table_path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(file)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declarations() -> Vec<ControllerRoutes> {
        vec![ControllerRoutes {
            controller: "users".into(),
            defaults: RouteValues {
                accept_mimes: Some(vec![MimeSpec::from("json")]),
                ..RouteValues::default()
            },
            routes: vec![
                "GET /users users:list".parse().unwrap(),
                "GET,HEAD /users/{id} users:show".parse().unwrap(),
            ],
        }]
    }

    fn router(dir: &Path) -> Router {
        Router::new(RouterSettings {
            application: "site".into(),
            controllers_namespace: "site::controllers".into(),
            table_path: dir.join("AppRoutes.json"),
            declarations: declarations(),
            known_middlewares: BTreeSet::from(["audit".to_string()]),
        })
    }

    #[test]
    fn missing_table_triggers_build() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());
        assert!(router.check_for_update_application_routes());

        router.load_or_build().unwrap();
        assert!(router.table_path().exists());
        assert!(!router.check_for_update_application_routes());
        assert_eq!(router.generation(), 1);

        let selection = router.select_target_raw_route("/site/users/5").unwrap();
        assert_eq!(selection.params()["id"], "5");
        let show = selection.route_for("GET").unwrap();
        assert_eq!(show.namespace(), "site::controllers::users");
        assert_eq!(show.accept_mimes()[0].mime, "json");
    }

    #[test]
    fn update_refused_when_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());
        router.update_application_routes().unwrap();
        assert!(matches!(
            router.update_application_routes(),
            Err(RouterError::UpdateNotAllowed)
        ));

        router.set_is_update_routes(true);
        assert!(router.update_application_routes().is_ok());
    }

    #[test]
    fn force_update_deletes_table() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());
        router.update_application_routes().unwrap();
        router.force_update_routes().unwrap();
        assert!(!router.table_path().exists());
        assert!(router.check_for_update_application_routes());
        // deleting twice is not an error
        router.force_update_routes().unwrap();
    }

    #[test]
    fn changed_defaults_make_table_stale() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());
        router.load_or_build().unwrap();

        router.set_default_route_config(RouteValues {
            is_secure: Some(true),
            ..RouteValues::default()
        });
        assert!(router.check_for_update_application_routes());
        router.load_or_build().unwrap();
        let selection = router.select_target_raw_route("/site/users").unwrap();
        assert!(selection.route_for("GET").unwrap().is_secure());
    }

    #[test]
    fn fresh_table_is_loaded_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        router(dir.path()).load_or_build().unwrap();

        let second = router(dir.path());
        assert!(!second.check_for_update_application_routes());
        second.load_or_build().unwrap();
        assert!(second.select_target_raw_route("/site/users").is_some());
    }

    #[test]
    fn unknown_middleware_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let mut decls = declarations();
        decls[0].routes[0].middlewares = Some(vec!["missing".into()]);
        let router = Router::new(RouterSettings {
            application: "site".into(),
            table_path: dir.path().join("AppRoutes.json"),
            declarations: decls,
            ..RouterSettings::default()
        });
        assert!(matches!(
            router.update_application_routes(),
            Err(RouterError::UnknownMiddleware { .. })
        ));
    }
}
