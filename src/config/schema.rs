//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a domain.
//! All types derive Serde traits for deserialization from config files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::routing::RouteValues;

/// Root configuration of an EnGarde domain.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngardeConfig {
    /// Listener configuration (bind address, connection limits).
    pub listener: ListenerConfig,

    /// Domain-wide settings.
    pub domain: DomainConfig,

    /// One entry per hosted application.
    pub applications: Vec<ApplicationConfig>,

    /// How request metadata is read from the connection.
    pub server: ServerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

impl EngardeConfig {
    /// Look up an application by name (case-insensitive).
    pub fn application(&self, name: &str) -> Option<&ApplicationConfig> {
        self.applications
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Resolve relative paths: the domain root against `base`, every
    /// application root against the domain root.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.domain.root_path.is_relative() {
            self.domain.root_path = base.join(&self.domain.root_path);
        }
        for app in &mut self.applications {
            if app.root_path.as_os_str().is_empty() {
                app.root_path = self.domain.root_path.join(&app.name);
            } else if app.root_path.is_relative() {
                app.root_path = self.domain.root_path.join(&app.root_path);
            }
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent requests in flight (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Kind of environment the domain runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    #[default]
    Production,
    Development,
    Local,
    Test,
    TestView,
    LocalTest,
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Production => "production",
            EnvironmentType::Development => "development",
            EnvironmentType::Local => "local",
            EnvironmentType::Test => "test",
            EnvironmentType::TestView => "testview",
            EnvironmentType::LocalTest => "localtest",
        }
    }

    /// Environments where server variables may be overridden.
    pub fn is_test(&self) -> bool {
        matches!(
            self,
            EnvironmentType::Test | EnvironmentType::TestView | EnvironmentType::LocalTest
        )
    }
}

/// Domain settings. Fixed once the domain is built.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Framework version reported by the admin API.
    pub version: String,

    pub environment_type: EnvironmentType,

    pub is_debug_mode: bool,

    /// Force every application to rebuild its route table at startup.
    pub is_update_routes: bool,

    /// Root directory of the domain; application roots are relative to it.
    pub root_path: PathBuf,

    /// Names of the applications installed in the domain.
    pub hosted_apps: Vec<String>,

    /// Application answering when the URL omits the application name.
    /// Empty means the first hosted application.
    pub default_app: String,

    /// IANA timezone name used for local timestamps.
    pub date_time_local: String,

    /// Maximum time (seconds) a request may run.
    pub time_out: u64,

    /// Maximum upload size in MB.
    pub max_file_size: u64,

    /// Maximum request body size in MB.
    pub max_post_size: u64,

    /// Error view, relative to the domain root.
    pub path_to_error_view: String,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment_type: EnvironmentType::Production,
            is_debug_mode: false,
            is_update_routes: false,
            root_path: PathBuf::from("."),
            hosted_apps: vec!["site".to_string()],
            default_app: String::new(),
            date_time_local: "UTC".to_string(),
            time_out: 30,
            max_file_size: 10,
            max_post_size: 10,
            path_to_error_view: String::new(),
        }
    }
}

impl DomainConfig {
    /// The default application, falling back to the first hosted one.
    pub fn default_app(&self) -> &str {
        if self.default_app.is_empty() {
            self.hosted_apps.first().map(String::as_str).unwrap_or_default()
        } else {
            &self.default_app
        }
    }

    /// Full path to the domain error view.
    pub fn full_path_to_error_view(&self) -> PathBuf {
        self.root_path.join(&self.path_to_error_view)
    }

    /// Body limit in bytes derived from `max_post_size`.
    pub fn max_body_bytes(&self) -> usize {
        let mb = self.max_post_size.max(self.max_file_size);
        usize::try_from(mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

/// One route declared in configuration: either the structured string form
/// or a full table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RouteDeclaration {
    Compact(String),
    Full(RouteValues),
}

/// Application settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,

    /// Root directory of the application. Relative paths below start here.
    pub root_path: PathBuf,

    pub path_to_app_routes: String,
    pub path_to_controllers: String,
    pub path_to_views: String,
    pub path_to_views_resources: String,
    pub path_to_locales: String,
    pub path_to_cache_files: String,
    pub path_to_error_view: String,

    /// Directory (relative to the root) for locally stored session data.
    pub path_to_local_data: String,

    /// Route the UA lands on when only the application name is given.
    pub start_route: String,

    pub controllers_namespace: String,

    pub locales: Vec<String>,
    pub default_locale: String,
    pub is_use_labels: bool,

    /// Defaults for every route of the application.
    pub default_route_config: RouteValues,

    /// Routes declared in configuration in addition to controller routes.
    pub routes: Vec<RouteDeclaration>,

    pub security: SecurityConfig,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "site".to_string(),
            root_path: PathBuf::new(),
            path_to_app_routes: "AppRoutes.json".to_string(),
            path_to_controllers: "controllers".to_string(),
            path_to_views: "views".to_string(),
            path_to_views_resources: "resources".to_string(),
            path_to_locales: "locales".to_string(),
            path_to_cache_files: "cache".to_string(),
            path_to_error_view: String::new(),
            path_to_local_data: "data".to_string(),
            start_route: "/".to_string(),
            controllers_namespace: String::new(),
            locales: vec!["en-US".to_string()],
            default_locale: "en-US".to_string(),
            is_use_labels: false,
            default_route_config: RouteValues::default(),
            routes: Vec::new(),
            security: SecurityConfig::default(),
        }
    }
}

impl ApplicationConfig {
    pub fn app_root_path(&self) -> &Path {
        &self.root_path
    }

    fn path(&self, relative: &str, full_path: bool) -> PathBuf {
        if full_path {
            self.root_path.join(relative)
        } else {
            PathBuf::from(relative)
        }
    }

    pub fn path_to_app_routes(&self, full_path: bool) -> PathBuf {
        self.path(&self.path_to_app_routes, full_path)
    }

    pub fn path_to_controllers(&self, full_path: bool) -> PathBuf {
        self.path(&self.path_to_controllers, full_path)
    }

    pub fn path_to_views(&self, full_path: bool) -> PathBuf {
        self.path(&self.path_to_views, full_path)
    }

    pub fn path_to_views_resources(&self, full_path: bool) -> PathBuf {
        self.path(&self.path_to_views_resources, full_path)
    }

    pub fn path_to_locales(&self, full_path: bool) -> PathBuf {
        self.path(&self.path_to_locales, full_path)
    }

    pub fn path_to_cache_files(&self, full_path: bool) -> PathBuf {
        self.path(&self.path_to_cache_files, full_path)
    }

    pub fn path_to_error_view(&self, full_path: bool) -> PathBuf {
        self.path(&self.path_to_error_view, full_path)
    }

    pub fn path_to_local_data(&self, full_path: bool) -> PathBuf {
        self.path(&self.path_to_local_data, full_path)
    }

    /// Default locale, falling back to the first supported locale.
    pub fn default_locale(&self) -> &str {
        if self.default_locale.is_empty() {
            self.locales.first().map(String::as_str).unwrap_or_default()
        } else {
            &self.default_locale
        }
    }
}

/// Where authenticated sessions are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    #[default]
    Local,
    Database,
}

/// An account allowed to log into an application.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UserConfig {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub name: String,
    /// SHA-256 hex digest of the password.
    pub password_hash: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Security profiles the user may use.
    pub profiles: Vec<String>,
    /// Profile selected at login; the first profile when empty.
    #[serde(default)]
    pub default_profile: String,
}

/// A named set of route permissions.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProfileConfig {
    pub name: String,
    /// Application the profile belongs to; empty means every application.
    #[serde(default)]
    pub application: String,
    /// `"<METHOD|*> <raw route|prefix/*|*>"` entries.
    pub permissions: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Security settings of an application. Fixed once built.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// When false the application is public.
    pub is_active: bool,
    pub data_cookie_name: String,
    pub security_cookie_name: String,
    pub route_to_login: String,
    pub route_to_start: String,
    pub route_to_reset_password: String,
    pub anonymous_id: i64,
    pub session_type: SessionType,
    /// Extend the session on every request.
    pub is_session_renew: bool,
    /// Minutes of inactivity a session survives.
    pub session_timeout: u64,
    /// Login failures tolerated per IP before it is blocked.
    pub allowed_fault_by_ip: u32,
    /// Minutes an IP stays blocked.
    pub ip_block_timeout: u64,
    /// Password failures tolerated per login before it is blocked.
    pub allowed_fault_by_login: u32,
    /// Minutes a login stays blocked.
    pub login_block_timeout: u64,
    /// Only these addresses/networks may connect when non-empty.
    pub allow_ips: Vec<String>,
    /// These addresses/networks are always refused.
    pub deny_ips: Vec<String>,
    pub users: Vec<UserConfig>,
    pub profiles: Vec<ProfileConfig>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            is_active: false,
            data_cookie_name: "engarde_data".to_string(),
            security_cookie_name: "engarde_session".to_string(),
            route_to_login: "/login".to_string(),
            route_to_start: "/".to_string(),
            route_to_reset_password: "/reset-password".to_string(),
            anonymous_id: 1,
            session_type: SessionType::Local,
            is_session_renew: true,
            session_timeout: 40,
            allowed_fault_by_ip: 50,
            ip_block_timeout: 50,
            allowed_fault_by_login: 5,
            login_block_timeout: 20,
            allow_ips: Vec::new(),
            deny_ips: Vec::new(),
            users: Vec::new(),
            profiles: Vec::new(),
        }
    }
}

/// Request metadata settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Take the client IP from `X-Forwarded-For` (only behind a trusted proxy).
    pub trust_forwarded_for: bool,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Grace period for in-flight requests on shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            shutdown_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: EngardeConfig = toml::from_str(
            r#"
            [domain]
            hosted_apps = ["site", "admin"]

            [[applications]]
            name = "site"
            routes = ["GET / home:index"]

            [[applications]]
            name = "admin"
            start_route = "/dashboard"
            [applications.security]
            is_active = true
            "#,
        )
        .unwrap();

        assert_eq!(config.domain.default_app(), "site");
        assert_eq!(config.domain.environment_type, EnvironmentType::Production);
        let admin = config.application("ADMIN").unwrap();
        assert!(admin.security.is_active);
        assert_eq!(admin.security.session_timeout, 40);
        assert_eq!(admin.security.allowed_fault_by_login, 5);
        assert!(matches!(
            config.applications[0].routes[0],
            RouteDeclaration::Compact(_)
        ));
    }

    #[test]
    fn full_route_declaration_parses() {
        let config: EngardeConfig = toml::from_str(
            r#"
            [[applications]]
            name = "site"
            [[applications.routes]]
            controller = "users"
            action = "list"
            method = "GET"
            routes = ["/users"]
            accept_mimes = ["json", { mime = "md", mimetype = "text/markdown" }]
            "#,
        )
        .unwrap();
        match &config.applications[0].routes[0] {
            RouteDeclaration::Full(values) => {
                assert_eq!(values.action.as_deref(), Some("list"));
                assert_eq!(values.accept_mimes.as_ref().unwrap().len(), 2);
            }
            other => panic!("unexpected declaration {other:?}"),
        }
    }

    #[test]
    fn paths_resolve_against_roots() {
        let mut config = EngardeConfig::default();
        config.domain.root_path = PathBuf::from("www");
        config.applications.push(ApplicationConfig::default());
        config.resolve_paths(Path::new("/srv"));

        let app = &config.applications[0];
        assert_eq!(app.app_root_path(), Path::new("/srv/www/site"));
        assert_eq!(app.path_to_app_routes(false), PathBuf::from("AppRoutes.json"));
        assert_eq!(
            app.path_to_app_routes(true),
            PathBuf::from("/srv/www/site/AppRoutes.json")
        );
    }
}
