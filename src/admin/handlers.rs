use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::Application;
use crate::error::EngineError;
use crate::http::server::AppState;
use crate::security::ActivityRecord;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub timezone: String,
    /// Current time in the domain timezone, RFC 3339.
    pub local_time: String,
    pub applications: Vec<ApplicationStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplicationStatus {
    pub name: String,
    pub routes: usize,
    pub route_generation: u64,
    pub security_active: bool,
    pub sessions: usize,
    pub cached_responses: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteListing {
    pub application: String,
    pub fingerprint: String,
    pub generated_at: DateTime<Utc>,
    pub routes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

fn status_of(application: &Application) -> ApplicationStatus {
    ApplicationStatus {
        name: application.name().to_string(),
        routes: application.router().table().len(),
        route_generation: application.router().generation(),
        security_active: application.config().security.is_active,
        sessions: application.gate().store().session_count(),
        cached_responses: application.cache().len(),
    }
}

fn listing_of(application: &Application) -> RouteListing {
    let table = application.router().table();
    RouteListing {
        application: application.name().to_string(),
        fingerprint: table.fingerprint().to_string(),
        generated_at: table.generated_at(),
        routes: application.route_summary(),
    }
}

fn find(state: &AppState, name: &str) -> Result<Arc<Application>, EngineError> {
    state
        .load()
        .application(name)
        .cloned()
        .ok_or_else(|| EngineError::UnknownApplication(name.to_string()))
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let inner = state.load();
    let domain = inner.domain();
    let version = if domain.version().is_empty() {
        env!("CARGO_PKG_VERSION").to_string()
    } else {
        domain.version().to_string()
    };
    Json(SystemStatus {
        version,
        status: "operational".to_string(),
        environment: domain.environment_type().as_str().to_string(),
        started_at: state.started_at(),
        timezone: domain.timezone().name().to_string(),
        local_time: domain.local_time(domain.now()).to_rfc3339(),
        applications: inner.applications().map(|a| status_of(a.as_ref())).collect(),
    })
}

pub async fn get_routes(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> Result<Json<RouteListing>, EngineError> {
    let application = find(&state, &app)?;
    Ok(Json(listing_of(&application)))
}

pub async fn rebuild_routes(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> Result<Json<RouteListing>, EngineError> {
    let application = find(&state, &app)?;
    application.rebuild_routes()?;
    tracing::info!(application = %application.name(), "Routes rebuilt on admin request");
    Ok(Json(listing_of(&application)))
}

pub async fn get_activity(
    State(state): State<AppState>,
    Path(app): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityRecord>>, EngineError> {
    let application = find(&state, &app)?;
    let limit = query.limit.unwrap_or(50).min(1024);
    Ok(Json(application.gate().store().recent_activity(limit)))
}
