//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the hosted applications from configuration and their setups
//! - Create the Axum Router with the engine handler and middleware layers
//! - Pick the target application of each request and hand it over
//! - Swap the live domain when the configuration file changes
//! - Serve until the shutdown signal, then drain gracefully
//!
//! # Design Decisions
//! - The live domain sits behind `ArcSwap`; a request keeps the snapshot it
//!   started with even if a reload lands mid-flight
//! - Applications whose configuration did not change survive a reload, so
//!   their sessions and caches do too
//! - A reload that fails to build keeps the current domain

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ApplicationConfig, DomainConfig, EngardeConfig};
use crate::domain::Domain;
use crate::engine::{Application, ApplicationSetup};
use crate::error::EngineError;
use crate::http::request::{ClientAddressPolicy, RequestContext};
use crate::http::response::redirect;

/// Application setups keyed by application name.
pub type SetupRegistry = HashMap<String, Arc<dyn ApplicationSetup>>;

/// Everything built from one version of the configuration.
pub struct DomainState {
    config: EngardeConfig,
    domain: Domain,
    applications: HashMap<String, Arc<Application>>,
}

impl DomainState {
    /// Build every hosted application. Applications of `previous` are kept
    /// when their configuration is unchanged.
    pub fn build(
        config: EngardeConfig,
        setups: &SetupRegistry,
        previous: Option<&DomainState>,
    ) -> Result<Self, EngineError> {
        let domain = Domain::new(&config);
        let mut applications = HashMap::new();

        for name in &config.domain.hosted_apps {
            let app_config = config
                .application(name)
                .cloned()
                .ok_or_else(|| EngineError::UnknownApplication(name.clone()))?;
            let key = app_config.name.to_ascii_lowercase();

            if let Some(existing) =
                previous.and_then(|p| p.reusable(&app_config, &config.domain))
            {
                tracing::debug!(application = %app_config.name, "Application unchanged, kept");
                applications.insert(key, existing);
                continue;
            }

            let setup = setups
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(&app_config.name))
                .map(|(_, s)| s.as_ref());
            let application =
                Application::configure_application(app_config, config.domain.clone(), setup)?;
            applications.insert(key, Arc::new(application));
        }

        Ok(Self {
            config,
            domain,
            applications,
        })
    }

    fn reusable(&self, config: &ApplicationConfig, domain: &DomainConfig) -> Option<Arc<Application>> {
        let existing = self.application(&config.name)?;
        let same_app = serde_json::to_value(existing.config()).ok()
            == serde_json::to_value(config).ok();
        let same_domain = self.config.domain.is_update_routes == domain.is_update_routes;
        (same_app && same_domain).then(|| Arc::clone(existing))
    }

    pub fn config(&self) -> &EngardeConfig {
        &self.config
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Hosted application by name, case-insensitive.
    pub fn application(&self, name: &str) -> Option<&Arc<Application>> {
        self.applications.get(&name.to_ascii_lowercase())
    }

    /// Hosted applications in configuration order.
    pub fn applications(&self) -> impl Iterator<Item = &Arc<Application>> {
        self.domain
            .hosted_apps()
            .filter_map(|name| self.application(name))
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<DomainState>>,
    setups: Arc<SetupRegistry>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: EngardeConfig, setups: SetupRegistry) -> Result<Self, EngineError> {
        let state = DomainState::build(config, &setups, None)?;
        Ok(Self {
            inner: Arc::new(ArcSwap::from_pointee(state)),
            setups: Arc::new(setups),
            started_at: Utc::now(),
        })
    }

    /// Current domain snapshot.
    pub fn load(&self) -> Arc<DomainState> {
        self.inner.load_full()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Build a domain from `config` and make it live.
    pub fn apply_config(&self, config: EngardeConfig) -> Result<(), EngineError> {
        let current = self.inner.load_full();
        let next = DomainState::build(config, &self.setups, Some(&current))?;
        self.inner.store(Arc::new(next));
        Ok(())
    }

    /// Drop expired sessions, stale cache entries and forgotten address
    /// failures of every application.
    pub fn purge_expired(&self) {
        let current = self.inner.load_full();
        let now = Utc::now();
        for application in current.applications() {
            let store = application.gate().store();
            let sessions = store.purge_expired(now);
            let addresses = store.ip_guard().purge_at(now);
            let responses = application
                .cache()
                .purge(application.router().generation(), std::time::Instant::now());
            if sessions + addresses + responses > 0 {
                tracing::debug!(
                    application = %application.name(),
                    sessions,
                    addresses,
                    responses,
                    "Expired entries purged"
                );
            }
        }
    }
}

/// HTTP server hosting the EnGarde domain.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Build every hosted application and the HTTP router in front of them.
    pub fn new(config: EngardeConfig, setups: SetupRegistry) -> Result<Self, EngineError> {
        let router_config = config.clone();
        let state = AppState::new(config, setups)?;
        let router = Self::build_router(&router_config, state.clone());
        Ok(Self { router, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// A copy of the router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &EngardeConfig, state: AppState) -> Router {
        Router::new()
            .route("/", any(engine_handler))
            .route("/{*path}", any(engine_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.domain.max_body_bytes()))
            .layer(TimeoutLayer::new(Duration::from_secs(config.domain.time_out)))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configurations received on `config_updates` replace the live domain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<EngardeConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reload_state = self.state.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match reload_state.apply_config(config) {
                    Ok(()) => tracing::info!("Configuration reloaded"),
                    Err(e) => tracing::error!(
                        error = %e,
                        "Reloaded configuration rejected, keeping current domain"
                    ),
                }
            }
        });

        let purge_state = self.state.clone();
        let purger = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                purge_state.purge_expired();
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        reloader.abort();
        purger.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Entry point of every request: pick the application and run it.
async fn engine_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let current = state.load();
    let target = current
        .domain()
        .define_target_application(request.uri().path());

    if let Some(location) = &target.new_location_path {
        let location = match request.uri().query() {
            Some(query) => format!("{location}?{query}"),
            None => location.clone(),
        };
        tracing::debug!(from = %request.uri().path(), to = %location, "Redirecting to application");
        return redirect(StatusCode::FOUND, &location);
    }

    let Some(application) = current.application(&target.name).cloned() else {
        return EngineError::UnknownApplication(target.name).into_response();
    };

    let config = current.config();
    let policy = ClientAddressPolicy {
        trust_forwarded_for: config.server.trust_forwarded_for,
    };
    let context = match RequestContext::from_request(
        request,
        peer,
        policy,
        &config.domain.root_path,
        config.domain.max_body_bytes(),
    )
    .await
    {
        Ok(context) => context,
        Err(e) => return e.into_response(),
    };

    application.run(context, &target).await
}
