//! Route-level access decision.
//!
//! # Responsibilities
//! - Refuse clients rejected by the IP guard
//! - Let public routes and inactive security through
//! - Require a recognized session on secure routes
//! - Check the session profile against the route
//!
//! # Design Decisions
//! - The gate only decides; turning a decision into a response is the
//!   engine's job
//! - Browsers (html/xhtml) are redirected to the login route, other
//!   clients get 401

use std::sync::Arc;

use crate::observability::metrics;
use crate::routing::mime::is_markup;
use crate::routing::table::raw_route;
use crate::security::session::Session;
use crate::security::store::{LocalSessionStore, UserAgentSession};

/// Outcome of [`SecurityGate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// 403.
    Forbidden { reason: &'static str },
    /// 303 to `location` when `redirect`, 401 otherwise.
    LoginRequired { location: String, redirect: bool },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

/// Access decision for one application.
#[derive(Debug, Clone)]
pub struct SecurityGate {
    store: Arc<LocalSessionStore>,
}

impl SecurityGate {
    pub fn new(store: Arc<LocalSessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<LocalSessionStore> {
        &self.store
    }

    /// Raw route of the login page.
    pub fn login_location(&self) -> String {
        raw_route(self.store.application(), &self.store.config().route_to_login)
    }

    /// Decide whether `method` on the raw route pattern `raw_route` may run.
    ///
    /// `response_mime` is the negotiated short mime of the route.
    pub fn evaluate(
        &self,
        session: &mut UserAgentSession,
        method: &str,
        raw_route: &str,
        is_secure: bool,
        response_mime: &str,
    ) -> GateDecision {
        let decision = self.decide(session, method, raw_route, is_secure, response_mime);
        if let GateDecision::Forbidden { reason } = &decision {
            metrics::record_gate_denial(self.store.application(), reason);
            tracing::info!(
                application = %self.store.application(),
                client_ip = %session.client_ip(),
                method,
                route = raw_route,
                reason,
                "Access denied"
            );
        } else if let GateDecision::LoginRequired { .. } = &decision {
            metrics::record_gate_denial(self.store.application(), "login required");
        }
        decision
    }

    fn decide(
        &self,
        session: &mut UserAgentSession,
        method: &str,
        raw_route: &str,
        is_secure: bool,
        response_mime: &str,
    ) -> GateDecision {
        if session.is_ip_refused() {
            return GateDecision::Forbidden {
                reason: "client address refused",
            };
        }

        let config = self.store.config();
        if !config.is_active {
            return GateDecision::Allow;
        }

        let has_cookie = session
            .retrieve_security_cookie()
            .value
            .is_some_and(|v| !v.is_empty());
        let authenticated = has_cookie && session.check_user_agent_session();

        let login = self.login_location();
        if !is_secure || raw_route.eq_ignore_ascii_case(&login) {
            return GateDecision::Allow;
        }

        if !authenticated {
            return GateDecision::LoginRequired {
                location: login,
                redirect: is_markup(response_mime),
            };
        }

        if session.check_route_permission(method, raw_route) {
            GateDecision::Allow
        } else {
            GateDecision::Forbidden {
                reason: "permission denied",
            }
        }
    }
}
