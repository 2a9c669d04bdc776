//! Route configuration record.
//!
//! # Responsibilities
//! - Hold every property of one route (identity, content, security, cache)
//! - Enforce write rules: identity fields are set once, most fields are
//!   frozen by [`RouteRecord::lock_properties`], view-related fields stay
//!   writable for the action
//! - Convert from/to [`RouteValues`], the serde form used by config files
//!   and the compiled route table
//!
//! # Design Decisions
//! - Locking is one-way; there is no unlock
//! - Header and metadata keys are stored lowercased (case-insensitive)
//! - Cache is only honoured for non-secure `GET`/`HEAD` routes with a
//!   positive timeout

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::negotiation::locale::negotiate_locale;
use crate::negotiation::mime::{negotiate_mime_type, MimeNegotiation};
use crate::routing::matcher::RoutePattern;
use crate::routing::mime::{MimeEntry, MimeSpec};

/// HTTP verbs a route may be bound to.
pub const HTTP_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "TRACE", "CONNECT",
];

/// Default name of the method that resolves a route.
pub const DEFAULT_RUN_METHOD: &str = "run";

/// Errors raised while configuring a route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("`{0}` is already defined and cannot be overwritten")]
    AlreadyDefined(&'static str),

    #[error("`{0}` cannot be changed after the route is locked")]
    Locked(&'static str),

    #[error("malformed route declaration `{0}`")]
    Parse(String),
}

impl RouteError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        RouteError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Serializable, partially-filled route configuration.
///
/// Used for application defaults, controller defaults, route declarations
/// and the compiled route table. `None` means "not configured here".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteValues {
    pub application: Option<String>,
    pub namespace: Option<String>,
    pub controller: Option<String>,
    pub action: Option<String>,
    pub method: Option<String>,
    pub allowed_methods: Option<Vec<String>>,
    pub routes: Option<Vec<String>>,
    pub accept_mimes: Option<Vec<MimeSpec>>,
    pub is_use_xhtml: Option<bool>,
    pub middlewares: Option<Vec<String>>,
    pub relationed_routes: Option<Vec<String>>,
    pub description: Option<String>,
    pub dev_description: Option<String>,
    pub is_secure: Option<bool>,
    pub is_use_cache: Option<bool>,
    pub cache_timeout: Option<i64>,
    pub response_headers: Option<BTreeMap<String, String>>,
    pub response_mime: Option<String>,
    pub response_mime_type: Option<String>,
    pub response_locale: Option<String>,
    pub response_is_pretty_print: Option<bool>,
    pub response_is_download: Option<bool>,
    pub response_download_file_name: Option<String>,
    pub master_page: Option<String>,
    pub view: Option<String>,
    pub form: Option<String>,
    pub style_sheets: Option<Vec<String>>,
    pub java_scripts: Option<Vec<String>>,
    pub locale_dictionary: Option<String>,
    pub meta_data: Option<BTreeMap<String, String>>,
    pub run_method_name: Option<String>,
    pub custom_properties: Option<BTreeMap<String, Value>>,
}

impl RouteValues {
    /// Layer `self` on top of `base`.
    ///
    /// Scalars in `self` replace those of `base`. Middlewares, style sheets
    /// and scripts are appended after the base entries; header, metadata and
    /// custom property maps are merged key by key.
    pub fn layered_over(&self, base: &RouteValues) -> RouteValues {
        fn pick<T: Clone>(top: &Option<T>, base: &Option<T>) -> Option<T> {
            top.clone().or_else(|| base.clone())
        }
        fn append(top: &Option<Vec<String>>, base: &Option<Vec<String>>) -> Option<Vec<String>> {
            match (base, top) {
                (None, None) => None,
                (b, t) => {
                    let mut out: Vec<String> = Vec::new();
                    for item in b.iter().flatten().chain(t.iter().flatten()) {
                        if !out.contains(item) {
                            out.push(item.clone());
                        }
                    }
                    Some(out)
                }
            }
        }
        fn merge<V: Clone>(
            top: &Option<BTreeMap<String, V>>,
            base: &Option<BTreeMap<String, V>>,
        ) -> Option<BTreeMap<String, V>> {
            match (base, top) {
                (None, None) => None,
                (b, t) => {
                    let mut out = b.clone().unwrap_or_default();
                    out.extend(t.clone().unwrap_or_default());
                    Some(out)
                }
            }
        }

        RouteValues {
            application: pick(&self.application, &base.application),
            namespace: pick(&self.namespace, &base.namespace),
            controller: pick(&self.controller, &base.controller),
            action: pick(&self.action, &base.action),
            method: pick(&self.method, &base.method),
            allowed_methods: pick(&self.allowed_methods, &base.allowed_methods),
            routes: pick(&self.routes, &base.routes),
            accept_mimes: pick(&self.accept_mimes, &base.accept_mimes),
            is_use_xhtml: pick(&self.is_use_xhtml, &base.is_use_xhtml),
            middlewares: append(&self.middlewares, &base.middlewares),
            relationed_routes: pick(&self.relationed_routes, &base.relationed_routes),
            description: pick(&self.description, &base.description),
            dev_description: pick(&self.dev_description, &base.dev_description),
            is_secure: pick(&self.is_secure, &base.is_secure),
            is_use_cache: pick(&self.is_use_cache, &base.is_use_cache),
            cache_timeout: pick(&self.cache_timeout, &base.cache_timeout),
            response_headers: merge(&self.response_headers, &base.response_headers),
            response_mime: pick(&self.response_mime, &base.response_mime),
            response_mime_type: pick(&self.response_mime_type, &base.response_mime_type),
            response_locale: pick(&self.response_locale, &base.response_locale),
            response_is_pretty_print: pick(
                &self.response_is_pretty_print,
                &base.response_is_pretty_print,
            ),
            response_is_download: pick(&self.response_is_download, &base.response_is_download),
            response_download_file_name: pick(
                &self.response_download_file_name,
                &base.response_download_file_name,
            ),
            master_page: pick(&self.master_page, &base.master_page),
            view: pick(&self.view, &base.view),
            form: pick(&self.form, &base.form),
            style_sheets: append(&self.style_sheets, &base.style_sheets),
            java_scripts: append(&self.java_scripts, &base.java_scripts),
            locale_dictionary: pick(&self.locale_dictionary, &base.locale_dictionary),
            meta_data: merge(&self.meta_data, &base.meta_data),
            run_method_name: pick(&self.run_method_name, &base.run_method_name),
            custom_properties: merge(&self.custom_properties, &base.custom_properties),
        }
    }

    /// The methods this declaration answers to: `allowed_methods`, or the
    /// single `method` when no list is given.
    pub fn effective_methods(&self) -> Vec<String> {
        match (&self.allowed_methods, &self.method) {
            (Some(list), _) if !list.is_empty() => list.clone(),
            (_, Some(method)) => vec![method.clone()],
            _ => Vec::new(),
        }
    }
}

/// Structured string form: `"<METHODS> <route> [<alias>...] <controller>:<action>"`.
///
/// ```text
/// GET,HEAD /users/{id} /u/{id} users:show
/// ```
impl FromStr for RouteValues {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(RouteError::Parse(s.to_string()));
        }

        let methods: Vec<String> = tokens[0]
            .split(',')
            .filter(|m| !m.is_empty())
            .map(normalize_method)
            .collect::<Result<_, _>>()?;
        let (controller, action) = tokens[tokens.len() - 1]
            .split_once(':')
            .filter(|(c, a)| !c.is_empty() && !a.is_empty())
            .ok_or_else(|| RouteError::Parse(s.to_string()))?;
        let routes: Vec<String> = tokens[1..tokens.len() - 1]
            .iter()
            .map(|r| r.to_string())
            .collect();

        if methods.is_empty() || routes.iter().any(|r| !r.starts_with('/')) {
            return Err(RouteError::Parse(s.to_string()));
        }

        Ok(RouteValues {
            method: methods.first().cloned(),
            allowed_methods: Some(methods),
            routes: Some(routes),
            controller: Some(controller.to_string()),
            action: Some(action.to_string()),
            ..RouteValues::default()
        })
    }
}

/// Properties that drive view construction, handed to the view layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionAttributes {
    pub master_page: String,
    pub view: String,
    pub form: String,
    pub style_sheets: Vec<String>,
    pub java_scripts: Vec<String>,
    pub locale_dictionary: String,
    pub meta_data: BTreeMap<String, String>,
    pub response_mime: String,
    pub response_mime_type: String,
    pub response_locale: String,
    pub response_is_pretty_print: bool,
    pub response_is_download: bool,
    pub response_download_file_name: String,
}

/// Configuration of one route being served.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRecord {
    application: Option<String>,
    namespace: Option<String>,
    controller: Option<String>,
    action: Option<String>,
    method: Option<String>,
    allowed_methods: Option<Vec<String>>,
    routes: Option<Vec<String>>,
    accept_mimes: Option<Vec<MimeEntry>>,
    is_use_xhtml: bool,
    middlewares: Vec<String>,
    relationed_routes: Vec<String>,
    description: String,
    dev_description: String,
    is_secure: bool,
    is_use_cache: bool,
    cache_timeout: i64,
    response_headers: BTreeMap<String, String>,
    response_mime: String,
    response_mime_type: String,
    response_locale: String,
    response_is_pretty_print: bool,
    response_is_download: bool,
    response_download_file_name: String,
    master_page: String,
    view: String,
    form: String,
    style_sheets: Vec<String>,
    java_scripts: Vec<String>,
    locale_dictionary: String,
    meta_data: BTreeMap<String, String>,
    run_method_name: String,
    custom_properties: BTreeMap<String, Value>,
    locked: bool,
}

impl Default for RouteRecord {
    fn default() -> Self {
        Self {
            application: None,
            namespace: None,
            controller: None,
            action: None,
            method: None,
            allowed_methods: None,
            routes: None,
            accept_mimes: None,
            is_use_xhtml: false,
            middlewares: Vec::new(),
            relationed_routes: Vec::new(),
            description: String::new(),
            dev_description: String::new(),
            is_secure: false,
            is_use_cache: false,
            cache_timeout: 0,
            response_headers: BTreeMap::new(),
            response_mime: String::new(),
            response_mime_type: String::new(),
            response_locale: String::new(),
            response_is_pretty_print: false,
            response_is_download: false,
            response_download_file_name: String::new(),
            master_page: String::new(),
            view: String::new(),
            form: String::new(),
            style_sheets: Vec::new(),
            java_scripts: Vec::new(),
            locale_dictionary: String::new(),
            meta_data: BTreeMap::new(),
            run_method_name: DEFAULT_RUN_METHOD.to_string(),
            custom_properties: BTreeMap::new(),
            locked: false,
        }
    }
}

impl RouteRecord {
    /// Create an empty, unlocked route.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a route from configuration values.
    pub fn from_values(values: &RouteValues) -> Result<Self, RouteError> {
        let mut route = Self::new();
        route.set_values(values)?;
        Ok(route)
    }

    /// Build a route from its structured string form.
    pub fn parse(declaration: &str) -> Result<Self, RouteError> {
        Self::from_values(&declaration.parse()?)
    }

    // ----- identity (set once) -----

    pub fn application(&self) -> &str {
        self.application.as_deref().unwrap_or_default()
    }

    pub fn set_application(&mut self, application: &str) -> Result<(), RouteError> {
        let value = identifier("application", application)?;
        self.set_once("application", |r| &mut r.application, value)
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }

    pub fn set_namespace(&mut self, namespace: &str) -> Result<(), RouteError> {
        let namespace = namespace.trim();
        if namespace.is_empty() || namespace.chars().any(char::is_whitespace) {
            return Err(RouteError::invalid("namespace", "must be a non-empty path"));
        }
        self.set_once("namespace", |r| &mut r.namespace, namespace.to_string())
    }

    pub fn controller(&self) -> &str {
        self.controller.as_deref().unwrap_or_default()
    }

    pub fn set_controller(&mut self, controller: &str) -> Result<(), RouteError> {
        let value = identifier("controller", controller)?;
        self.set_once("controller", |r| &mut r.controller, value)
    }

    pub fn action(&self) -> &str {
        self.action.as_deref().unwrap_or_default()
    }

    pub fn set_action(&mut self, action: &str) -> Result<(), RouteError> {
        let value = identifier("action", action)?;
        self.set_once("action", |r| &mut r.action, value)
    }

    /// The HTTP method this record was registered for.
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or_default()
    }

    pub fn set_method(&mut self, method: &str) -> Result<(), RouteError> {
        let value = normalize_method(method)?;
        self.set_once("method", |r| &mut r.method, value)
    }

    /// Every method that may be used for this same route. Falls back to
    /// [`RouteRecord::method`] when no list was configured.
    pub fn allowed_methods(&self) -> Vec<String> {
        match (&self.allowed_methods, &self.method) {
            (Some(list), _) => list.clone(),
            (None, Some(m)) => vec![m.clone()],
            (None, None) => Vec::new(),
        }
    }

    pub fn set_allowed_methods(&mut self, methods: &[String]) -> Result<(), RouteError> {
        if methods.is_empty() {
            return Err(RouteError::invalid("allowed_methods", "must not be empty"));
        }
        let mut normalized: Vec<String> = Vec::with_capacity(methods.len());
        for method in methods {
            let method = normalize_method(method)?;
            if !normalized.contains(&method) {
                normalized.push(method);
            }
        }
        self.set_once("allowed_methods", |r| &mut r.allowed_methods, normalized)
    }

    /// Route and its aliases; the first entry is the canonical route.
    pub fn routes(&self) -> &[String] {
        self.routes.as_deref().unwrap_or_default()
    }

    /// The canonical route (first of [`RouteRecord::routes`]).
    pub fn main_route(&self) -> &str {
        self.routes().first().map(String::as_str).unwrap_or("/")
    }

    pub fn set_routes(&mut self, routes: &[String]) -> Result<(), RouteError> {
        if routes.is_empty() {
            return Err(RouteError::invalid("routes", "at least one route is required"));
        }
        for route in routes {
            if !route.starts_with('/') {
                return Err(RouteError::invalid(
                    "routes",
                    format!("`{route}` must be relative to the root and start with `/`"),
                ));
            }
            RoutePattern::parse(route)?;
        }
        self.set_once("routes", |r| &mut r.routes, routes.to_vec())
    }

    /// Mimes this route can answer with, in preference order.
    pub fn accept_mimes(&self) -> &[MimeEntry] {
        self.accept_mimes.as_deref().unwrap_or_default()
    }

    pub fn set_accept_mimes(&mut self, mimes: &[MimeSpec]) -> Result<(), RouteError> {
        if mimes.is_empty() {
            return Err(RouteError::invalid("accept_mimes", "must not be empty"));
        }
        let mut entries: Vec<MimeEntry> = Vec::with_capacity(mimes.len());
        for spec in mimes {
            let entry = match spec {
                MimeSpec::Short(short) => MimeEntry::known(short).ok_or_else(|| {
                    RouteError::invalid("accept_mimes", format!("unknown mime `{short}`"))
                })?,
                MimeSpec::Full { mime, mimetype } => {
                    let mime = mime.trim().to_ascii_lowercase();
                    let mimetype = mimetype.trim().to_ascii_lowercase();
                    if mime.is_empty() || !mimetype.contains('/') {
                        return Err(RouteError::invalid(
                            "accept_mimes",
                            format!("`{mime}` => `{mimetype}` is not a valid mimetype"),
                        ));
                    }
                    MimeEntry { mime, mimetype }
                }
            };
            if !entries.iter().any(|e| e.mime == entry.mime) {
                entries.push(entry);
            }
        }
        self.set_once("accept_mimes", |r| &mut r.accept_mimes, entries)
    }

    // ----- settable until locked -----

    pub fn is_use_xhtml(&self) -> bool {
        self.is_use_xhtml
    }

    pub fn set_is_use_xhtml(&mut self, value: bool) -> Result<(), RouteError> {
        self.ensure_unlocked("is_use_xhtml")?;
        self.is_use_xhtml = value;
        Ok(())
    }

    /// Names of the middlewares to run, in order.
    pub fn middlewares(&self) -> &[String] {
        &self.middlewares
    }

    pub fn set_middlewares(&mut self, middlewares: &[String]) -> Result<(), RouteError> {
        self.ensure_unlocked("middlewares")?;
        let validated = validate_middlewares(middlewares)?;
        self.middlewares = validated;
        Ok(())
    }

    pub fn add_middlewares(&mut self, middlewares: &[String]) -> Result<(), RouteError> {
        self.ensure_unlocked("middlewares")?;
        let validated = validate_middlewares(middlewares)?;
        self.middlewares.extend(validated);
        Ok(())
    }

    pub fn relationed_routes(&self) -> &[String] {
        &self.relationed_routes
    }

    pub fn set_relationed_routes(&mut self, routes: &[String]) -> Result<(), RouteError> {
        self.ensure_unlocked("relationed_routes")?;
        self.relationed_routes = routes.to_vec();
        Ok(())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: &str) -> Result<(), RouteError> {
        self.ensure_unlocked("description")?;
        self.description = description.to_string();
        Ok(())
    }

    /// Technical description; may contain Markdown.
    pub fn dev_description(&self) -> &str {
        &self.dev_description
    }

    pub fn set_dev_description(&mut self, description: &str) -> Result<(), RouteError> {
        self.ensure_unlocked("dev_description")?;
        self.dev_description = description.to_string();
        Ok(())
    }

    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    pub fn set_is_secure(&mut self, value: bool) -> Result<(), RouteError> {
        self.ensure_unlocked("is_secure")?;
        self.is_secure = value;
        Ok(())
    }

    /// Whether responses of this route may be cached.
    ///
    /// Secure routes, routes with a non-positive timeout and methods other
    /// than `GET`/`HEAD` never cache, whatever was configured.
    pub fn is_use_cache(&self) -> bool {
        self.is_use_cache
            && !self.is_secure
            && self.cache_timeout > 0
            && matches!(self.method(), "GET" | "HEAD")
    }

    pub fn set_is_use_cache(&mut self, value: bool) -> Result<(), RouteError> {
        self.ensure_unlocked("is_use_cache")?;
        self.is_use_cache = value;
        Ok(())
    }

    /// Cache lifetime in seconds.
    pub fn cache_timeout(&self) -> i64 {
        self.cache_timeout
    }

    pub fn set_cache_timeout(&mut self, seconds: i64) -> Result<(), RouteError> {
        self.ensure_unlocked("cache_timeout")?;
        self.cache_timeout = seconds;
        Ok(())
    }

    pub fn response_mime(&self) -> &str {
        &self.response_mime
    }

    pub fn set_response_mime(&mut self, mime: &str) -> Result<(), RouteError> {
        self.ensure_unlocked("response_mime")?;
        self.response_mime = mime.trim().to_ascii_lowercase();
        Ok(())
    }

    pub fn response_mime_type(&self) -> &str {
        &self.response_mime_type
    }

    pub fn set_response_mime_type(&mut self, mimetype: &str) -> Result<(), RouteError> {
        self.ensure_unlocked("response_mime_type")?;
        self.response_mime_type = mimetype.trim().to_ascii_lowercase();
        Ok(())
    }

    pub fn response_locale(&self) -> &str {
        &self.response_locale
    }

    pub fn set_response_locale(&mut self, locale: &str) -> Result<(), RouteError> {
        self.ensure_unlocked("response_locale")?;
        self.response_locale = locale.trim().to_string();
        Ok(())
    }

    pub fn response_is_pretty_print(&self) -> bool {
        self.response_is_pretty_print
    }

    pub fn set_response_is_pretty_print(&mut self, value: bool) -> Result<(), RouteError> {
        self.ensure_unlocked("response_is_pretty_print")?;
        self.response_is_pretty_print = value;
        Ok(())
    }

    pub fn response_is_download(&self) -> bool {
        self.response_is_download
    }

    pub fn set_response_is_download(&mut self, value: bool) -> Result<(), RouteError> {
        self.ensure_unlocked("response_is_download")?;
        self.response_is_download = value;
        Ok(())
    }

    /// Path of the form definition used by the route.
    pub fn form(&self) -> &str {
        &self.form
    }

    pub fn set_form(&mut self, form: &str) -> Result<(), RouteError> {
        self.ensure_unlocked("form")?;
        self.form = relative_path("form", form)?;
        Ok(())
    }

    /// Name of the method the application runs to resolve this route.
    pub fn run_method_name(&self) -> &str {
        &self.run_method_name
    }

    pub fn set_run_method_name(&mut self, name: &str) -> Result<(), RouteError> {
        self.ensure_unlocked("run_method_name")?;
        self.run_method_name = if name.trim().is_empty() {
            DEFAULT_RUN_METHOD.to_string()
        } else {
            identifier("run_method_name", name)?
        };
        Ok(())
    }

    pub fn custom_properties(&self) -> &BTreeMap<String, Value> {
        &self.custom_properties
    }

    pub fn set_custom_properties(
        &mut self,
        properties: BTreeMap<String, Value>,
    ) -> Result<(), RouteError> {
        self.ensure_unlocked("custom_properties")?;
        self.custom_properties = properties;
        Ok(())
    }

    // ----- writable during the action -----

    /// Headers sent to the UA; keys are lowercase.
    pub fn response_headers(&self) -> &BTreeMap<String, String> {
        &self.response_headers
    }

    pub fn set_response_headers(&mut self, headers: &BTreeMap<String, String>) {
        self.response_headers = lowercase_keys(headers);
    }

    pub fn add_response_headers(&mut self, headers: &BTreeMap<String, String>) {
        self.response_headers.extend(lowercase_keys(headers));
    }

    /// File name offered to the UA for downloads.
    ///
    /// Derived from the canonical route when none was set:
    /// `/users/{id}/card` answering `pdf` becomes `users-id-card.pdf`.
    pub fn response_download_file_name(&self) -> String {
        if !self.response_download_file_name.is_empty() {
            return self.response_download_file_name.clone();
        }
        let stem: String = self
            .main_route()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_matches(|c| c == '{' || c == '}' || c == '*'))
            .collect::<Vec<_>>()
            .join("-");
        let stem = if stem.is_empty() { "index".to_string() } else { stem };
        if self.response_mime.is_empty() {
            stem
        } else {
            format!("{stem}.{}", self.response_mime)
        }
    }

    pub fn set_response_download_file_name(&mut self, name: &str) {
        self.response_download_file_name = name.trim().to_string();
    }

    pub fn master_page(&self) -> &str {
        &self.master_page
    }

    pub fn set_master_page(&mut self, path: &str) {
        self.master_page = path.to_string();
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn set_view(&mut self, path: &str) {
        self.view = path.to_string();
    }

    pub fn style_sheets(&self) -> &[String] {
        &self.style_sheets
    }

    pub fn set_style_sheets(&mut self, sheets: &[String]) {
        self.style_sheets = sheets.to_vec();
    }

    pub fn add_style_sheets(&mut self, sheets: &[String]) {
        self.style_sheets.extend_from_slice(sheets);
    }

    pub fn java_scripts(&self) -> &[String] {
        &self.java_scripts
    }

    pub fn set_java_scripts(&mut self, scripts: &[String]) {
        self.java_scripts = scripts.to_vec();
    }

    pub fn add_java_scripts(&mut self, scripts: &[String]) {
        self.java_scripts.extend_from_slice(scripts);
    }

    pub fn locale_dictionary(&self) -> &str {
        &self.locale_dictionary
    }

    pub fn set_locale_dictionary(&mut self, path: &str) -> Result<(), RouteError> {
        self.locale_dictionary = relative_path("locale_dictionary", path)?;
        Ok(())
    }

    /// `<meta>` entries for X/HTML views; keys are lowercase.
    pub fn meta_data(&self) -> &BTreeMap<String, String> {
        &self.meta_data
    }

    pub fn set_meta_data(&mut self, meta: &BTreeMap<String, String>) {
        self.meta_data = lowercase_keys(meta);
    }

    pub fn add_meta_data(&mut self, meta: &BTreeMap<String, String>) {
        self.meta_data.extend(lowercase_keys(meta));
    }

    // ----- negotiation -----

    /// Pick the locale for this route; see [`negotiate_locale`].
    pub fn negotiate_locale(
        &self,
        request_locales: Option<&[String]>,
        request_languages: Option<&[String]>,
        application_locales: Option<&[String]>,
        default_locale: Option<&str>,
        force_locale: Option<&str>,
    ) -> String {
        negotiate_locale(
            request_locales,
            request_languages,
            application_locales,
            default_locale,
            force_locale,
        )
    }

    /// Pick the mimetype for this route among its accepted mimes.
    pub fn negotiate_mime_type(
        &self,
        request_mimes: Option<&[String]>,
        force_mime: Option<&str>,
    ) -> MimeNegotiation {
        negotiate_mime_type(self.accept_mimes(), self.is_use_xhtml, request_mimes, force_mime)
    }

    // ----- bulk -----

    /// Apply every configured value. Identity fields already set cause
    /// [`RouteError::AlreadyDefined`].
    pub fn set_values(&mut self, values: &RouteValues) -> Result<(), RouteError> {
        if let Some(v) = &values.application {
            self.set_application(v)?;
        }
        if let Some(v) = &values.namespace {
            self.set_namespace(v)?;
        }
        if let Some(v) = &values.controller {
            self.set_controller(v)?;
        }
        if let Some(v) = &values.action {
            self.set_action(v)?;
        }
        if let Some(v) = &values.method {
            self.set_method(v)?;
        }
        if let Some(v) = &values.allowed_methods {
            self.set_allowed_methods(v)?;
        }
        if let Some(v) = &values.routes {
            self.set_routes(v)?;
        }
        if let Some(v) = &values.accept_mimes {
            self.set_accept_mimes(v)?;
        }
        if let Some(v) = values.is_use_xhtml {
            self.set_is_use_xhtml(v)?;
        }
        if let Some(v) = &values.middlewares {
            self.set_middlewares(v)?;
        }
        if let Some(v) = &values.relationed_routes {
            self.set_relationed_routes(v)?;
        }
        if let Some(v) = &values.description {
            self.set_description(v)?;
        }
        if let Some(v) = &values.dev_description {
            self.set_dev_description(v)?;
        }
        if let Some(v) = values.is_secure {
            self.set_is_secure(v)?;
        }
        if let Some(v) = values.is_use_cache {
            self.set_is_use_cache(v)?;
        }
        if let Some(v) = values.cache_timeout {
            self.set_cache_timeout(v)?;
        }
        if let Some(v) = &values.response_headers {
            self.set_response_headers(v);
        }
        if let Some(v) = &values.response_mime {
            self.set_response_mime(v)?;
        }
        if let Some(v) = &values.response_mime_type {
            self.set_response_mime_type(v)?;
        }
        if let Some(v) = &values.response_locale {
            self.set_response_locale(v)?;
        }
        if let Some(v) = values.response_is_pretty_print {
            self.set_response_is_pretty_print(v)?;
        }
        if let Some(v) = values.response_is_download {
            self.set_response_is_download(v)?;
        }
        if let Some(v) = &values.response_download_file_name {
            self.set_response_download_file_name(v);
        }
        if let Some(v) = &values.master_page {
            self.set_master_page(v);
        }
        if let Some(v) = &values.view {
            self.set_view(v);
        }
        if let Some(v) = &values.form {
            self.set_form(v)?;
        }
        if let Some(v) = &values.style_sheets {
            self.set_style_sheets(v);
        }
        if let Some(v) = &values.java_scripts {
            self.set_java_scripts(v);
        }
        if let Some(v) = &values.locale_dictionary {
            self.set_locale_dictionary(v)?;
        }
        if let Some(v) = &values.meta_data {
            self.set_meta_data(v);
        }
        if let Some(v) = &values.run_method_name {
            self.set_run_method_name(v)?;
        }
        if let Some(v) = &values.custom_properties {
            self.set_custom_properties(v.clone())?;
        }
        Ok(())
    }

    /// Export every property.
    pub fn to_values(&self) -> RouteValues {
        RouteValues {
            application: self.application.clone(),
            namespace: self.namespace.clone(),
            controller: self.controller.clone(),
            action: self.action.clone(),
            method: self.method.clone(),
            allowed_methods: self.allowed_methods.clone(),
            routes: self.routes.clone(),
            accept_mimes: self
                .accept_mimes
                .as_ref()
                .map(|m| m.iter().cloned().map(MimeSpec::from).collect()),
            is_use_xhtml: Some(self.is_use_xhtml),
            middlewares: Some(self.middlewares.clone()),
            relationed_routes: Some(self.relationed_routes.clone()),
            description: Some(self.description.clone()),
            dev_description: Some(self.dev_description.clone()),
            is_secure: Some(self.is_secure),
            is_use_cache: Some(self.is_use_cache),
            cache_timeout: Some(self.cache_timeout),
            response_headers: Some(self.response_headers.clone()),
            response_mime: Some(self.response_mime.clone()),
            response_mime_type: Some(self.response_mime_type.clone()),
            response_locale: Some(self.response_locale.clone()),
            response_is_pretty_print: Some(self.response_is_pretty_print),
            response_is_download: Some(self.response_is_download),
            response_download_file_name: Some(self.response_download_file_name.clone()),
            master_page: Some(self.master_page.clone()),
            view: Some(self.view.clone()),
            form: Some(self.form.clone()),
            style_sheets: Some(self.style_sheets.clone()),
            java_scripts: Some(self.java_scripts.clone()),
            locale_dictionary: Some(self.locale_dictionary.clone()),
            meta_data: Some(self.meta_data.clone()),
            run_method_name: Some(self.run_method_name.clone()),
            custom_properties: Some(self.custom_properties.clone()),
        }
    }

    /// View-related subset of the route.
    pub fn action_attributes(&self) -> ActionAttributes {
        ActionAttributes {
            master_page: self.master_page.clone(),
            view: self.view.clone(),
            form: self.form.clone(),
            style_sheets: self.style_sheets.clone(),
            java_scripts: self.java_scripts.clone(),
            locale_dictionary: self.locale_dictionary.clone(),
            meta_data: self.meta_data.clone(),
            response_mime: self.response_mime.clone(),
            response_mime_type: self.response_mime_type.clone(),
            response_locale: self.response_locale.clone(),
            response_is_pretty_print: self.response_is_pretty_print,
            response_is_download: self.response_is_download,
            response_download_file_name: self.response_download_file_name(),
        }
    }

    /// Freeze everything except the action-writable properties. Irreversible.
    pub fn lock_properties(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    fn ensure_unlocked(&self, field: &'static str) -> Result<(), RouteError> {
        if self.locked {
            Err(RouteError::Locked(field))
        } else {
            Ok(())
        }
    }

    fn set_once<T>(
        &mut self,
        field: &'static str,
        slot: impl FnOnce(&mut Self) -> &mut Option<T>,
        value: T,
    ) -> Result<(), RouteError> {
        self.ensure_unlocked(field)?;
        let slot = slot(self);
        if slot.is_some() {
            return Err(RouteError::AlreadyDefined(field));
        }
        *slot = Some(value);
        Ok(())
    }
}

/// Uppercase and check an HTTP method name.
pub fn normalize_method(method: &str) -> Result<String, RouteError> {
    let upper = method.trim().to_ascii_uppercase();
    if HTTP_METHODS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(RouteError::invalid("method", format!("`{method}` is not an HTTP method")))
    }
}

fn identifier(field: &'static str, value: &str) -> Result<String, RouteError> {
    let value = value.trim();
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(value.to_string())
    } else {
        Err(RouteError::invalid(
            field,
            format!("`{value}` must be a non-empty identifier"),
        ))
    }
}

fn validate_middlewares(names: &[String]) -> Result<Vec<String>, RouteError> {
    names
        .iter()
        .map(|name| identifier("middlewares", name))
        .collect()
}

fn relative_path(field: &'static str, path: &str) -> Result<String, RouteError> {
    let path = path.trim();
    if path.starts_with('/') || path.split(['/', '\\']).any(|part| part == "..") {
        return Err(RouteError::invalid(
            field,
            format!("`{path}` must be relative to the application root"),
        ));
    }
    Ok(path.to_string())
}

fn lowercase_keys(map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RouteRecord {
        RouteRecord::parse("GET,HEAD /users/{id} /u/{id} users:show").unwrap()
    }

    #[test]
    fn parses_structured_declaration() {
        let route = sample();
        assert_eq!(route.method(), "GET");
        assert_eq!(route.allowed_methods(), vec!["GET", "HEAD"]);
        assert_eq!(route.routes(), ["/users/{id}", "/u/{id}"]);
        assert_eq!(route.main_route(), "/users/{id}");
        assert_eq!(route.controller(), "users");
        assert_eq!(route.action(), "show");
        assert_eq!(route.run_method_name(), "run");
    }

    #[test]
    fn rejects_malformed_declarations() {
        assert!(RouteRecord::parse("GET users:show").is_err());
        assert!(RouteRecord::parse("FETCH /a users:show").is_err());
        assert!(RouteRecord::parse("GET a users:show").is_err());
        assert!(RouteRecord::parse("GET /a users").is_err());
    }

    #[test]
    fn identity_fields_are_set_once() {
        let mut route = sample();
        assert_eq!(
            route.set_controller("other"),
            Err(RouteError::AlreadyDefined("controller"))
        );
        route.set_application("site").unwrap();
        assert_eq!(
            route.set_application("admin"),
            Err(RouteError::AlreadyDefined("application"))
        );
    }

    #[test]
    fn lock_freezes_pre_action_fields_only() {
        let mut route = sample();
        route.set_is_secure(true).unwrap();
        route.lock_properties();

        assert_eq!(route.set_is_secure(false), Err(RouteError::Locked("is_secure")));
        assert_eq!(
            route.set_response_mime("json"),
            Err(RouteError::Locked("response_mime"))
        );
        assert!(route.add_middlewares(&["auth".into()]).is_err());

        route.set_view("users/show.html");
        route.add_style_sheets(&["main.css".into()]);
        route.set_response_download_file_name("me.json");
        route.set_locale_dictionary("locales/en.json").unwrap();
        assert_eq!(route.view(), "users/show.html");
        assert_eq!(route.style_sheets(), ["main.css"]);
        assert!(route.is_locked());
    }

    #[test]
    fn secure_routes_never_cache() {
        let mut route = sample();
        route.set_is_use_cache(true).unwrap();
        route.set_cache_timeout(60).unwrap();
        assert!(route.is_use_cache());

        route.set_is_secure(true).unwrap();
        assert!(!route.is_use_cache());
    }

    #[test]
    fn cache_requires_positive_timeout_and_safe_method() {
        let mut route = RouteRecord::parse("POST /users users:create").unwrap();
        route.set_is_use_cache(true).unwrap();
        route.set_cache_timeout(60).unwrap();
        assert!(!route.is_use_cache());

        let mut route = sample();
        route.set_is_use_cache(true).unwrap();
        route.set_cache_timeout(0).unwrap();
        assert!(!route.is_use_cache());
    }

    #[test]
    fn header_keys_are_case_insensitive() {
        let mut route = sample();
        let mut headers = BTreeMap::new();
        headers.insert("X-Custom".to_string(), "a".to_string());
        route.set_response_headers(&headers);
        let mut more = BTreeMap::new();
        more.insert("x-custom".to_string(), "b".to_string());
        route.add_response_headers(&more);

        assert_eq!(route.response_headers().len(), 1);
        assert_eq!(route.response_headers()["x-custom"], "b");
    }

    #[test]
    fn download_name_derives_from_main_route() {
        let mut route = sample();
        route.set_response_mime("json").unwrap();
        assert_eq!(route.response_download_file_name(), "users-id.json");

        let root = RouteRecord::parse("GET / home:index").unwrap();
        assert_eq!(root.response_download_file_name(), "index");

        route.set_response_download_file_name("profile.json");
        assert_eq!(route.response_download_file_name(), "profile.json");
    }

    #[test]
    fn accept_mimes_accept_short_and_full_forms() {
        let mut route = sample();
        route
            .set_accept_mimes(&[
                MimeSpec::from("json"),
                MimeSpec::Full {
                    mime: "md".into(),
                    mimetype: "text/markdown".into(),
                },
            ])
            .unwrap();
        assert_eq!(route.accept_mimes()[0].mimetype, "application/json");
        assert_eq!(route.accept_mimes()[1].mime, "md");

        let mut other = sample();
        assert!(other.set_accept_mimes(&[MimeSpec::from("docx")]).is_err());
    }

    #[test]
    fn values_survive_export() {
        let mut route = sample();
        route.set_accept_mimes(&[MimeSpec::from("html")]).unwrap();
        route.set_description("Shows a user").unwrap();
        route.add_middlewares(&["audit".into()]).unwrap();

        let rebuilt = RouteRecord::from_values(&route.to_values()).unwrap();
        assert_eq!(rebuilt, route);
    }

    #[test]
    fn layering_appends_middlewares_and_merges_maps() {
        let base = RouteValues {
            middlewares: Some(vec!["session".into()]),
            is_secure: Some(true),
            meta_data: Some(BTreeMap::from([("author".into(), "base".into())])),
            ..RouteValues::default()
        };
        let top = RouteValues {
            middlewares: Some(vec!["audit".into(), "session".into()]),
            meta_data: Some(BTreeMap::from([("robots".into(), "noindex".into())])),
            ..RouteValues::default()
        };

        let merged = top.layered_over(&base);
        assert_eq!(merged.middlewares.unwrap(), vec!["session", "audit"]);
        assert_eq!(merged.is_secure, Some(true));
        assert_eq!(merged.meta_data.unwrap().len(), 2);
    }

    #[test]
    fn relative_paths_are_enforced() {
        let mut route = sample();
        assert!(route.set_locale_dictionary("/etc/passwd").is_err());
        assert!(route.set_form("../forms/user.json").is_err());
        assert!(route.set_form("forms/user.json").is_ok());
    }
}
