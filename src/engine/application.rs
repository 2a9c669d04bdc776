//! Application: routes, controllers and the request pipeline.
//!
//! # Responsibilities
//! - Assemble an application from its configuration and setup
//!   (controllers, middlewares, route defaults)
//! - Keep the route table, security gate and response cache together
//! - Run one request through the pipeline
//!
//! # Design Decisions
//! - Each request works on its own copy of the matched RouteRecord;
//!   negotiation results are written into it before it is locked
//! - The security gate runs before a 406 is reported so that protected
//!   routes do not reveal which representations they offer

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::{ApplicationConfig, DomainConfig, RouteDeclaration};
use crate::domain::TargetApplication;
use crate::engine::builtin::{SecurityController, WelcomeController};
use crate::engine::cache::{CacheKey, ResponseCache};
use crate::engine::context::ActionContext;
use crate::engine::controller::Controller;
use crate::engine::middleware::{Next, RouteMiddleware};
use crate::error::EngineError;
use crate::http::request::RequestContext;
use crate::http::response::{append_cookies, redirect, render};
use crate::negotiation::{preferred_values, split_language_tags};
use crate::observability::metrics;
use crate::routing::{ControllerRoutes, Router, RouterSettings, RouteRecord, RouteValues};
use crate::security::{GateDecision, LocalSessionStore, SecurityGate, Session};

/// Hook that configures an application by name.
pub trait ApplicationSetup: Send + Sync {
    fn configure_application(&self, builder: ApplicationBuilder) -> ApplicationBuilder;
}

/// Setup used for hosted applications nobody registered a setup for.
#[derive(Debug, Default)]
pub struct WelcomeSetup;

impl ApplicationSetup for WelcomeSetup {
    fn configure_application(&self, builder: ApplicationBuilder) -> ApplicationBuilder {
        builder.controller(WelcomeController)
    }
}

/// Collects the parts of an application before its routes are compiled.
pub struct ApplicationBuilder {
    config: ApplicationConfig,
    domain: DomainConfig,
    controllers: Vec<Arc<dyn Controller>>,
    middlewares: HashMap<String, Arc<dyn RouteMiddleware>>,
    default_route_config: RouteValues,
}

impl ApplicationBuilder {
    pub fn new(config: ApplicationConfig, domain: DomainConfig) -> Self {
        let default_route_config = config.default_route_config.clone();
        Self {
            config,
            domain,
            controllers: Vec::new(),
            middlewares: HashMap::new(),
            default_route_config,
        }
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// Register a controller; a later controller with the same name wins.
    pub fn controller<C: Controller + 'static>(self, controller: C) -> Self {
        self.shared_controller(Arc::new(controller))
    }

    pub fn shared_controller(mut self, controller: Arc<dyn Controller>) -> Self {
        self.controllers
            .retain(|c| !c.name().eq_ignore_ascii_case(controller.name()));
        self.controllers.push(controller);
        self
    }

    /// Register a middleware under the name routes refer to it by.
    pub fn middleware<M: RouteMiddleware + 'static>(mut self, name: &str, middleware: M) -> Self {
        self.middlewares.insert(name.to_string(), Arc::new(middleware));
        self
    }

    /// Layer extra defaults over the configured `default_route_config`.
    pub fn default_route_config(mut self, values: RouteValues) -> Self {
        self.default_route_config = values.layered_over(&self.default_route_config);
        self
    }

    /// Compile routes and build the application.
    pub fn build(mut self) -> Result<Application, EngineError> {
        let name = self.config.name.clone();
        let security = self.config.security.clone();

        if security.is_active
            && !self
                .controllers
                .iter()
                .any(|c| c.name().eq_ignore_ascii_case(SecurityController::NAME))
        {
            self.controllers
                .push(Arc::new(SecurityController::new(&security)));
        }

        let store = LocalSessionStore::new(&name, security, self.config.path_to_local_data(true))?;

        let mut extra: HashMap<String, Vec<RouteValues>> = HashMap::new();
        for declaration in &self.config.routes {
            let values = match declaration {
                RouteDeclaration::Compact(text) => text.parse::<RouteValues>()?,
                RouteDeclaration::Full(values) => values.clone(),
            };
            let controller = values.controller.clone().unwrap_or_default();
            extra
                .entry(controller.to_ascii_lowercase())
                .or_default()
                .push(values);
        }

        let mut declarations = Vec::new();
        let mut controllers = HashMap::new();
        for controller in &self.controllers {
            let key = controller.name().to_ascii_lowercase();
            let mut routes = controller.routes();
            routes.extend(extra.remove(&key).unwrap_or_default());
            declarations.push(ControllerRoutes {
                controller: controller.name().to_string(),
                defaults: controller.defaults(),
                routes,
            });
            controllers.insert(key, Arc::clone(controller));
        }
        if let Some(unknown) = extra.into_keys().next() {
            return Err(EngineError::UnknownController(unknown));
        }

        let router = Router::new(RouterSettings {
            application: name.clone(),
            controllers_namespace: self.config.controllers_namespace.clone(),
            table_path: self.config.path_to_app_routes(true),
            declarations,
            known_middlewares: self.middlewares.keys().cloned().collect::<BTreeSet<_>>(),
        });
        router.set_default_route_config(self.default_route_config);
        router.set_is_update_routes(self.domain.is_update_routes);
        router.load_or_build()?;

        let table = router.table();
        for entry in table.entries() {
            for record in entry.methods().values() {
                if !controllers.contains_key(&record.controller().to_ascii_lowercase()) {
                    return Err(EngineError::UnknownController(record.controller().to_string()));
                }
            }
        }

        let store = Arc::new(store);
        if let Err(e) = store.process_routes_permissions(router.table_path()) {
            tracing::warn!(application = %name, error = %e, "Route permissions not resolved");
        }

        tracing::info!(
            application = %name,
            controllers = controllers.len(),
            routes = table.len(),
            "Application ready"
        );

        Ok(Application {
            config: self.config,
            router,
            controllers,
            middlewares: self.middlewares,
            gate: SecurityGate::new(store),
            cache: ResponseCache::new(),
        })
    }
}

/// A hosted application ready to serve requests.
pub struct Application {
    config: ApplicationConfig,
    router: Router,
    controllers: HashMap<String, Arc<dyn Controller>>,
    middlewares: HashMap<String, Arc<dyn RouteMiddleware>>,
    gate: SecurityGate,
    cache: ResponseCache,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.config.name)
            .field("routes", &self.router.table().len())
            .finish()
    }
}

impl Application {
    pub fn builder(config: ApplicationConfig, domain: DomainConfig) -> ApplicationBuilder {
        ApplicationBuilder::new(config, domain)
    }

    /// Build with `setup`, or the welcome setup when none is given.
    pub fn configure_application(
        config: ApplicationConfig,
        domain: DomainConfig,
        setup: Option<&dyn ApplicationSetup>,
    ) -> Result<Self, EngineError> {
        let builder = Self::builder(config, domain);
        let builder = match setup {
            Some(setup) => setup.configure_application(builder),
            None => WelcomeSetup.configure_application(builder),
        };
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn gate(&self) -> &SecurityGate {
        &self.gate
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Drop the persisted route table and compile it again.
    pub fn rebuild_routes(&self) -> Result<(), EngineError> {
        self.router.rebuild()?;
        self.cache.clear();
        self.gate
            .store()
            .process_routes_permissions(self.router.table_path())?;
        Ok(())
    }

    /// Serve one request. Never fails: errors become error responses.
    pub async fn run(&self, request: RequestContext, target: &TargetApplication) -> Response {
        let started = Instant::now();
        let method = request.method().to_string();
        let path = request.path().to_string();
        let request_id = request.request_id().unwrap_or("-").to_string();

        let response = match self.dispatch(request, target).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        };

        let elapsed = started.elapsed();
        metrics::record_request(self.name(), &method, response.status().as_u16(), elapsed);
        tracing::debug!(
            request_id = %request_id,
            application = %self.name(),
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Request served"
        );
        response
    }

    async fn dispatch(
        &self,
        request: RequestContext,
        target: &TargetApplication,
    ) -> Result<Response, EngineError> {
        let method = request.method().as_str().to_ascii_uppercase();
        let raw_target = target.raw_target(request.path());

        let selection = self
            .router
            .select_target_raw_route(&raw_target)
            .ok_or_else(|| EngineError::RouteNotFound(request.path().to_string()))?;

        let head_only = method == "HEAD";
        let mut record: RouteRecord = match selection.route_for(&method) {
            Some(record) => record.clone(),
            None if head_only && selection.route_for("GET").is_some() => selection
                .route_for("GET")
                .cloned()
                .ok_or_else(|| EngineError::RouteNotFound(raw_target.clone()))?,
            None if method == "OPTIONS" => {
                let mut allowed = selection.allowed_methods();
                allowed.push("OPTIONS".to_string());
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::NO_CONTENT;
                if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                    response.headers_mut().insert(header::ALLOW, value);
                }
                return Ok(response);
            }
            None => {
                return Err(EngineError::MethodNotAllowed {
                    method,
                    allowed: selection.allowed_methods(),
                })
            }
        };

        // Content negotiation, with query string overrides.
        let query = request.query_params();
        let accept = request.header(header::ACCEPT.as_str()).map(preferred_values);
        let negotiation = record.negotiate_mime_type(
            accept.as_deref(),
            query.get("_mime").map(String::as_str),
        );
        let (locales, languages) = request
            .header(header::ACCEPT_LANGUAGE.as_str())
            .map(split_language_tags)
            .unwrap_or_default();
        let locale = record.negotiate_locale(
            Some(locales.as_slice()),
            Some(languages.as_slice()),
            Some(self.config.locales.as_slice()),
            Some(self.config.default_locale()),
            query.get("_locale").map(String::as_str),
        );

        // Security gate.
        let store = self.gate.store();
        let mut session = store
            .user_agent(
                request.client_ip(),
                request.user_agent(),
                request.cookie(&store.config().security_cookie_name),
                request.now(),
            )
            .with_https(request.is_use_https())
            .with_root_cookie_path(target.is_default);
        let gate_mime = if negotiation.mime.is_empty() {
            "html"
        } else {
            negotiation.mime.as_str()
        };
        match self.gate.evaluate(
            &mut session,
            record.method(),
            selection.pattern(),
            record.is_secure(),
            gate_mime,
        ) {
            GateDecision::Allow => {}
            GateDecision::Forbidden { reason } => {
                let mut response = EngineError::Forbidden(reason).into_response();
                append_cookies(&mut response, &session.take_set_cookies());
                return Ok(response);
            }
            GateDecision::LoginRequired { location, redirect: true } => {
                let mut response = redirect(StatusCode::SEE_OTHER, &location);
                append_cookies(&mut response, &session.take_set_cookies());
                return Ok(response);
            }
            GateDecision::LoginRequired { redirect: false, .. } => {
                let mut response = EngineError::Unauthorized.into_response();
                append_cookies(&mut response, &session.take_set_cookies());
                return Ok(response);
            }
        }

        if !negotiation.valid {
            return Err(EngineError::NotAcceptable);
        }

        record.set_response_mime(&negotiation.mime)?;
        record.set_response_mime_type(&negotiation.mimetype)?;
        record.set_response_locale(&locale)?;
        if query.get("_pretty").is_some_and(|v| is_truthy(v)) {
            record.set_response_is_pretty_print(true)?;
        }
        if query.get("_download").is_some_and(|v| is_truthy(v)) {
            record.set_response_is_download(true)?;
        }
        record.lock_properties();

        let cache_key = record.is_use_cache().then(|| CacheKey {
            method: record.method().to_string(),
            uri: format!("{}?{}", request.path(), request.query_raw()),
            mime: record.response_mime().to_string(),
            locale: record.response_locale().to_string(),
        });
        let generation = self.router.generation();
        if let Some(key) = &cache_key {
            if let Some(mut response) = self.cache.get(key, generation) {
                metrics::record_cache_hit(self.name());
                if head_only {
                    *response.body_mut() = Body::empty();
                }
                append_cookies(&mut response, &session.take_set_cookies());
                return Ok(response);
            }
        }

        let controller = self
            .controllers
            .get(&record.controller().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| EngineError::UnknownController(record.controller().to_string()))?;
        let middlewares = record
            .middlewares()
            .iter()
            .map(|name| {
                self.middlewares.get(name).cloned().ok_or_else(|| {
                    EngineError::Internal(format!("middleware '{name}' is not registered"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let action = record.action().to_string();

        let mut ctx = ActionContext {
            application: self.name().to_string(),
            request,
            route: record,
            raw_route: selection.pattern().to_string(),
            params: selection.params().clone(),
            session,
        };

        let result = Next::new(&middlewares, controller.as_ref(), &action)
            .run(&mut ctx)
            .await?;
        let mut response = render(&ctx.route, result, false);

        if let Some(key) = cache_key {
            if response.status() == StatusCode::OK && ctx.route.is_use_cache() {
                let (parts, body) = response.into_parts();
                let bytes = axum::body::to_bytes(body, usize::MAX)
                    .await
                    .map_err(|e| EngineError::Internal(e.to_string()))?;
                self.cache.insert(
                    key,
                    generation,
                    Duration::from_secs(ctx.route.cache_timeout().max(0) as u64),
                    parts.status,
                    parts.headers.clone(),
                    bytes.clone(),
                );
                response = Response::from_parts(parts, Body::from(bytes));
            }
        }

        if head_only {
            *response.body_mut() = Body::empty();
        }
        append_cookies(&mut response, &ctx.session.take_set_cookies());

        if ctx.route.is_secure() && ctx.session.retrieve_session().is_some() {
            let posted = (ctx.request.method() != "GET").then(|| ctx.request.posted_data());
            ctx.session.register_log_activity(
                ctx.route.method(),
                &ctx.request.current_uri(),
                posted.as_ref(),
                ctx.route.controller(),
                ctx.route.action(),
                "request",
                response.status().as_str(),
            );
        }

        Ok(response)
    }

    /// Allowed methods of each route, keyed by raw route pattern.
    pub fn route_summary(&self) -> BTreeMap<String, Vec<String>> {
        let table = self.router.table();
        table
            .entries()
            .map(|entry| {
                (
                    entry.pattern().to_string(),
                    entry.methods().keys().cloned().collect(),
                )
            })
            .collect()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "1" | "true" | "yes" | "on"
    )
}
