//! Controllers every application can fall back on.
//!
//! - [`WelcomeController`] answers `/` for applications without a setup
//! - [`SecurityController`] serves login, logout and profile switching for
//!   applications with active security

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;

use crate::config::SecurityConfig;
use crate::engine::context::ActionContext;
use crate::engine::controller::Controller;
use crate::error::EngineError;
use crate::http::response::ActionResult;
use crate::routing::mime::{is_markup, MimeSpec};
use crate::routing::table::raw_route;
use crate::routing::RouteValues;
use crate::security::Session;

fn declare(declaration: &str, mimes: &[&str]) -> Option<RouteValues> {
    let mut values: RouteValues = declaration.parse().ok()?;
    values.accept_mimes = Some(mimes.iter().map(|m| MimeSpec::from(*m)).collect());
    Some(values)
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Landing page of an application nobody configured yet.
#[derive(Debug, Default)]
pub struct WelcomeController;

#[async_trait]
impl Controller for WelcomeController {
    fn name(&self) -> &str {
        "welcome"
    }

    fn routes(&self) -> Vec<RouteValues> {
        declare("GET,HEAD / welcome:index", &["html", "json", "txt"])
            .into_iter()
            .collect()
    }

    async fn invoke(
        &self,
        action: &str,
        ctx: &mut ActionContext,
    ) -> Result<ActionResult, EngineError> {
        if action != "index" {
            return Err(EngineError::UnknownAction {
                controller: self.name().to_string(),
                action: action.to_string(),
            });
        }
        let application = ctx.application.clone();
        Ok(match ctx.route.response_mime() {
            "json" => ActionResult::json(json!({
                "application": application,
                "locale": ctx.route.response_locale(),
                "version": env!("CARGO_PKG_VERSION"),
            })),
            "txt" => ActionResult::text(format!("EnGarde: {application}")),
            _ => ActionResult::text(format!(
                "<!DOCTYPE html><html><head><title>{0}</title></head>\
                 <body><h1>{0}</h1><p>EnGarde is running.</p></body></html>",
                html_escape(&application)
            )),
        })
    }
}

/// Login, logout and profile switching.
#[derive(Debug)]
pub struct SecurityController {
    routes: Vec<RouteValues>,
    route_to_start: String,
    route_to_login: String,
}

impl SecurityController {
    pub const NAME: &'static str = "security";

    pub fn new(config: &SecurityConfig) -> Self {
        let mimes = ["html", "json"];
        let routes = [
            format!("GET,POST {} security:login", config.route_to_login),
            "GET,POST /logout security:logout".to_string(),
            "POST /profile security:profile".to_string(),
        ]
        .iter()
        .filter_map(|d| declare(d, &mimes))
        .collect();
        Self {
            routes,
            route_to_start: config.route_to_start.clone(),
            route_to_login: config.route_to_login.clone(),
        }
    }

    fn answer(
        &self,
        ctx: &ActionContext,
        success: bool,
        location: &str,
        status_on_failure: StatusCode,
    ) -> ActionResult {
        let status = ctx.session.retrieve_security_status();
        if is_markup(ctx.route.response_mime()) {
            if success {
                return ActionResult::redirect(location);
            }
            let body = format!(
                "<!DOCTYPE html><html><body><p>{}</p></body></html>",
                status.as_str()
            );
            return ActionResult::text(body).with_status(status_on_failure);
        }
        let result = ActionResult::json(json!({
            "success": success,
            "status": status.as_str(),
            "location": location,
        }));
        if success {
            result
        } else {
            result.with_status(status_on_failure)
        }
    }

    fn login(&self, ctx: &mut ActionContext) -> ActionResult {
        let start = raw_route(&ctx.application, &self.route_to_start);
        if ctx.request.method() == "GET" {
            let authenticated = ctx.session.retrieve_session().is_some();
            if authenticated {
                return self.answer(ctx, true, &start, StatusCode::OK);
            }
            if is_markup(ctx.route.response_mime()) {
                let action = raw_route(&ctx.application, &self.route_to_login);
                return ActionResult::text(format!(
                    "<!DOCTYPE html><html><body><form method=\"post\" action=\"{}\">\
                     <input name=\"login\"><input name=\"password\" type=\"password\">\
                     <button>Login</button></form></body></html>",
                    html_escape(&action)
                ));
            }
            return ActionResult::json(json!({
                "success": false,
                "status": ctx.session.retrieve_security_status().as_str(),
            }));
        }

        let data = ctx.request.posted_data();
        let login = data.get("login").map(String::as_str).unwrap_or_default();
        let password = data.get("password").map(String::as_str).unwrap_or_default();
        let grant = data.get("grant_permission").map(String::as_str).filter(|v| !v.is_empty());
        let hash = data.get("session_hash").map(String::as_str).filter(|v| !v.is_empty());

        let success = ctx.session.execute_login(login, password, grant, hash);
        ctx.session.register_log_activity(
            ctx.request.method().as_str(),
            &ctx.request.current_uri(),
            Some(&data),
            Self::NAME,
            "login",
            if success { "login" } else { "login-fail" },
            ctx.session.retrieve_security_status().as_str(),
        );
        self.answer(ctx, success, &start, StatusCode::UNAUTHORIZED)
    }

    fn logout(&self, ctx: &mut ActionContext) -> ActionResult {
        ctx.session.check_user_agent_session();
        let had_session = ctx.session.execute_logout();
        tracing::debug!(application = %ctx.application, had_session, "Logout");
        let login = raw_route(&ctx.application, &self.route_to_login);
        self.answer(ctx, true, &login, StatusCode::OK)
    }

    fn profile(&self, ctx: &mut ActionContext) -> ActionResult {
        let data = ctx.request.posted_data();
        let profile = data.get("profile").map(String::as_str).unwrap_or_default();
        let success = ctx.session.retrieve_session().is_some()
            && ctx.session.change_user_profile(profile);
        let start = raw_route(&ctx.application, &self.route_to_start);
        self.answer(ctx, success, &start, StatusCode::FORBIDDEN)
    }
}

#[async_trait]
impl Controller for SecurityController {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn routes(&self) -> Vec<RouteValues> {
        self.routes.clone()
    }

    async fn invoke(
        &self,
        action: &str,
        ctx: &mut ActionContext,
    ) -> Result<ActionResult, EngineError> {
        match action {
            "login" => Ok(self.login(ctx)),
            "logout" => Ok(self.logout(ctx)),
            "profile" => Ok(self.profile(ctx)),
            other => Err(EngineError::UnknownAction {
                controller: Self::NAME.to_string(),
                action: other.to_string(),
            }),
        }
    }
}
