//! Engine error types.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::routing::{RouteError, RouterError};
use crate::security::{IpRuleError, SessionError};

/// Errors raised while building or running an application.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("application '{0}' is not hosted")]
    UnknownApplication(String),

    #[error("controller '{0}' is not registered")]
    UnknownController(String),

    #[error("action '{action}' not found on controller '{controller}'")]
    UnknownAction { controller: String, action: String },

    #[error("no route matches '{0}'")]
    RouteNotFound(String),

    #[error("method {method} is not allowed on this route")]
    MethodNotAllowed { method: String, allowed: Vec<String> },

    #[error("none of the requested representations is available")]
    NotAcceptable,

    #[error("access denied: {0}")]
    Forbidden(&'static str),

    #[error("authentication required")]
    Unauthorized,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Address(#[from] IpRuleError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn status(&self) -> StatusCode {
        match self {
            EngineError::UnknownApplication(_)
            | EngineError::UnknownAction { .. }
            | EngineError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            EngineError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
            EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            EngineError::UnknownApplication(_) => "UNKNOWN_APPLICATION",
            EngineError::UnknownController(_) => "UNKNOWN_CONTROLLER",
            EngineError::UnknownAction { .. } => "UNKNOWN_ACTION",
            EngineError::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            EngineError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            EngineError::NotAcceptable => "NOT_ACCEPTABLE",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::Unauthorized => "UNAUTHORIZED",
            EngineError::InvalidRequest(_) => "INVALID_REQUEST",
            EngineError::Route(_) => "ROUTE_ERROR",
            EngineError::Router(_) => "ROUTER_ERROR",
            EngineError::Session(_) => "SESSION_ERROR",
            EngineError::Address(_) => "ADDRESS_RULE_ERROR",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        let mut response = (status, body).into_response();
        if let EngineError::MethodNotAllowed { allowed, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                response.headers_mut().insert(header::ALLOW, value);
            }
        }
        response
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
