//! State handed to middlewares and actions.

use std::collections::BTreeMap;

use crate::http::request::RequestContext;
use crate::routing::RouteRecord;
use crate::security::UserAgentSession;

/// Everything an action can see and change while it runs.
#[derive(Debug)]
pub struct ActionContext {
    /// Name of the application serving the request.
    pub application: String,
    pub request: RequestContext,
    /// Route being served; locked, only view-related fields stay writable.
    pub route: RouteRecord,
    /// Raw route pattern that matched, e.g. `/site/users/{id}`.
    pub raw_route: String,
    pub params: BTreeMap<String, String>,
    pub session: UserAgentSession,
}

impl ActionContext {
    /// A route parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}
