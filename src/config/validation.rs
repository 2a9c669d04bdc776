//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (hosted apps have a configuration, users
//!   reference existing profiles)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngardeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use chrono_tz::Tz;
use thiserror::Error;

use crate::config::schema::{ApplicationConfig, EngardeConfig, RouteDeclaration};
use crate::engine::cache::MAX_CACHE_TTL;
use crate::routing::RouteValues;
use crate::security::ip_guard::MAX_BLOCK_MINUTES;
use crate::security::{IpRule, Permission};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &EngardeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new(
            "listener.max_connections",
            "must be greater than 0",
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }
    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                "is not a socket address",
            ));
        }
        if config.admin.api_key.is_empty() || config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
            errors.push(ValidationError::new(
                "admin.api_key",
                "must be set when the admin API is enabled",
            ));
        }
    }

    validate_domain(config, &mut errors);

    let mut seen = HashSet::new();
    for (index, app) in config.applications.iter().enumerate() {
        let field = format!("applications[{index}]");
        if !seen.insert(app.name.to_ascii_lowercase()) {
            errors.push(ValidationError::new(
                format!("{field}.name"),
                format!("application '{}' is declared twice", app.name),
            ));
        }
        validate_application(&field, app, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_domain(config: &EngardeConfig, errors: &mut Vec<ValidationError>) {
    let domain = &config.domain;
    if domain.hosted_apps.is_empty() {
        errors.push(ValidationError::new(
            "domain.hosted_apps",
            "at least one application must be hosted",
        ));
    }
    let hosted = |name: &str| domain.hosted_apps.iter().any(|a| a.eq_ignore_ascii_case(name));
    if !domain.default_app.is_empty() && !hosted(&domain.default_app) {
        errors.push(ValidationError::new(
            "domain.default_app",
            format!("'{}' is not a hosted application", domain.default_app),
        ));
    }
    for name in &domain.hosted_apps {
        if name.is_empty() || name.contains('/') {
            errors.push(ValidationError::new(
                "domain.hosted_apps",
                format!("'{name}' is not a valid application name"),
            ));
        } else if config.application(name).is_none() {
            errors.push(ValidationError::new(
                "domain.hosted_apps",
                format!("application '{name}' has no configuration"),
            ));
        }
    }
    if domain.time_out == 0 {
        errors.push(ValidationError::new("domain.time_out", "must be greater than 0"));
    }
    if domain.date_time_local.parse::<Tz>().is_err() {
        errors.push(ValidationError::new(
            "domain.date_time_local",
            format!("'{}' is not a known timezone", domain.date_time_local),
        ));
    }
}

fn validate_application(field: &str, app: &ApplicationConfig, errors: &mut Vec<ValidationError>) {
    if !app.start_route.starts_with('/') {
        errors.push(ValidationError::new(
            format!("{field}.start_route"),
            "must start with '/'",
        ));
    }
    if !app.locales.is_empty()
        && !app.default_locale.is_empty()
        && !app.locales.iter().any(|l| l.eq_ignore_ascii_case(&app.default_locale))
    {
        errors.push(ValidationError::new(
            format!("{field}.default_locale"),
            format!("'{}' is not one of the supported locales", app.default_locale),
        ));
    }
    if let Some(seconds) = app.default_route_config.cache_timeout {
        if seconds > MAX_CACHE_TTL.as_secs() as i64 {
            errors.push(ValidationError::new(
                format!("{field}.default_route_config.cache_timeout"),
                format!("must be at most {} seconds", MAX_CACHE_TTL.as_secs()),
            ));
        }
    }
    for (index, route) in app.routes.iter().enumerate() {
        if let RouteDeclaration::Compact(text) = route {
            if let Err(e) = text.parse::<RouteValues>() {
                errors.push(ValidationError::new(
                    format!("{field}.routes[{index}]"),
                    e.to_string(),
                ));
            }
        }
    }

    let security = &app.security;
    let sfield = format!("{field}.security");
    for route in [
        &security.route_to_login,
        &security.route_to_start,
        &security.route_to_reset_password,
    ] {
        if !route.starts_with('/') {
            errors.push(ValidationError::new(
                sfield.clone(),
                format!("route '{route}' must start with '/'"),
            ));
        }
    }
    if security.session_timeout == 0 {
        errors.push(ValidationError::new(
            format!("{sfield}.session_timeout"),
            "must be greater than 0",
        ));
    }
    for (name, minutes) in [
        ("session_timeout", security.session_timeout),
        ("login_block_timeout", security.login_block_timeout),
        ("ip_block_timeout", security.ip_block_timeout),
    ] {
        if minutes > MAX_BLOCK_MINUTES {
            errors.push(ValidationError::new(
                format!("{sfield}.{name}"),
                format!("must be at most {MAX_BLOCK_MINUTES} minutes"),
            ));
        }
    }
    for ip in security.allow_ips.iter().chain(&security.deny_ips) {
        if let Err(e) = ip.parse::<IpRule>() {
            errors.push(ValidationError::new(format!("{sfield}.ips"), e.to_string()));
        }
    }
    for profile in &security.profiles {
        for entry in &profile.permissions {
            if let Err(e) = entry.parse::<Permission>() {
                errors.push(ValidationError::new(
                    format!("{sfield}.profiles.{}", profile.name),
                    e.to_string(),
                ));
            }
        }
    }
    let mut logins = HashSet::new();
    for user in &security.users {
        if !logins.insert(user.login.to_ascii_lowercase()) {
            errors.push(ValidationError::new(
                format!("{sfield}.users"),
                format!("login '{}' is declared twice", user.login),
            ));
        }
        if user.id == security.anonymous_id {
            errors.push(ValidationError::new(
                format!("{sfield}.users"),
                format!("user '{}' uses the anonymous id", user.login),
            ));
        }
        if user.profiles.is_empty() {
            errors.push(ValidationError::new(
                format!("{sfield}.users"),
                format!("user '{}' has no profile", user.login),
            ));
        }
        for name in &user.profiles {
            if !security.profiles.iter().any(|p| &p.name == name) {
                errors.push(ValidationError::new(
                    format!("{sfield}.users"),
                    format!("user '{}' references unknown profile '{name}'", user.login),
                ));
            }
        }
    }
}
