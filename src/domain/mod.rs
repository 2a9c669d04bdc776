//! Domain: the set of hosted applications.
//!
//! # Responsibilities
//! - Hold domain-wide settings (environment, limits, version)
//! - Decide which application answers a request path
//!
//! # Design Decisions
//! - Application names are matched case-insensitively; a case mismatch is
//!   answered with a redirect to the canonical spelling
//! - Paths that do not start with a hosted application name belong to the
//!   default application

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::{DomainConfig, EngardeConfig, EnvironmentType};

/// Application chosen for a request path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetApplication {
    pub name: String,
    /// The path did not name the application; the default one answers.
    pub is_omitted: bool,
    /// The application is the domain's default one, reachable with or
    /// without its name in the path.
    pub is_default: bool,
    /// Where the UA should be redirected instead, if anywhere.
    pub new_location_path: Option<String>,
}

impl TargetApplication {
    /// Raw route target for the router: the path with the application
    /// name always present.
    pub fn raw_target(&self, uri_path: &str) -> String {
        let path = if uri_path.is_empty() { "/" } else { uri_path };
        if self.is_omitted {
            format!("/{}{}", self.name, path.trim_end_matches('/'))
        } else {
            let rest = strip_first_segment(path);
            format!("/{}{}", self.name, rest.trim_end_matches('/'))
        }
    }
}

#[derive(Debug, Clone)]
struct HostedApp {
    name: String,
    start_route: String,
}

/// Domain-wide state shared by every request.
#[derive(Debug, Clone)]
pub struct Domain {
    config: DomainConfig,
    hosted: Vec<HostedApp>,
    timezone: Tz,
    started_at: DateTime<Utc>,
}

impl Domain {
    pub fn new(config: &EngardeConfig) -> Self {
        let hosted = config
            .domain
            .hosted_apps
            .iter()
            .map(|name| HostedApp {
                name: name.clone(),
                start_route: config
                    .application(name)
                    .map(|a| a.start_route.clone())
                    .unwrap_or_else(|| "/".to_string()),
            })
            .collect();
        let timezone = config.domain.date_time_local.parse().unwrap_or_else(|_| {
            tracing::warn!(
                timezone = %config.domain.date_time_local,
                "Unknown timezone, using UTC"
            );
            Tz::UTC
        });
        Self {
            config: config.domain.clone(),
            hosted,
            timezone,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    /// Current instant; requests take it once on arrival.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Timezone of `date_time_local`.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// `instant` in the domain's local time.
    pub fn local_time(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.timezone)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn environment_type(&self) -> EnvironmentType {
        self.config.environment_type
    }

    pub fn is_debug_mode(&self) -> bool {
        self.config.is_debug_mode
    }

    pub fn hosted_apps(&self) -> impl Iterator<Item = &str> {
        self.hosted.iter().map(|a| a.name.as_str())
    }

    pub fn default_app(&self) -> &str {
        self.config.default_app()
    }

    fn hosted(&self, name: &str) -> Option<&HostedApp> {
        self.hosted.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Pick the application answering `uri_path` (no query string).
    pub fn define_target_application(&self, uri_path: &str) -> TargetApplication {
        let trimmed = uri_path.trim_start_matches('/');
        let first = trimmed.split('/').next().unwrap_or_default();

        if let Some(app) = self.hosted(first).filter(|_| !first.is_empty()) {
            let rest = strip_first_segment(uri_path);
            let new_location_path = if first != app.name {
                let rest = if rest == "/" { "" } else { rest };
                Some(format!("/{}{}", app.name, rest))
            } else if is_bare(rest) && app.start_route != "/" {
                Some(format!("/{}{}", app.name, app.start_route))
            } else {
                None
            };
            return TargetApplication {
                name: app.name.clone(),
                is_omitted: false,
                is_default: app.name.eq_ignore_ascii_case(self.default_app()),
                new_location_path,
            };
        }

        let name = self.default_app().to_string();
        let new_location_path = match self.hosted(&name) {
            Some(app) if is_bare(uri_path) && app.start_route != "/" => {
                Some(format!("/{}{}", app.name, app.start_route))
            }
            _ => None,
        };
        TargetApplication {
            name,
            is_omitted: true,
            is_default: true,
            new_location_path,
        }
    }
}

fn is_bare(path: &str) -> bool {
    path.trim_matches('/').is_empty()
}

/// `/app/users/1` → `/users/1`, `/app` → `/`.
fn strip_first_segment(path: &str) -> &str {
    let trimmed = path.trim_start_matches('/');
    match trimmed.find('/') {
        Some(index) => &trimmed[index..],
        None => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApplicationConfig;

    fn domain() -> Domain {
        let mut config = EngardeConfig::default();
        config.domain.hosted_apps = vec!["site".into(), "Admin".into()];
        config.applications = vec![
            ApplicationConfig::default(),
            ApplicationConfig {
                name: "Admin".into(),
                start_route: "/dashboard".into(),
                ..Default::default()
            },
        ];
        Domain::new(&config)
    }

    #[test]
    fn named_application_is_selected() {
        let target = domain().define_target_application("/Admin/users/4");
        assert_eq!(target.name, "Admin");
        assert!(!target.is_omitted);
        assert!(!target.is_default);
        assert_eq!(target.new_location_path, None);
        assert_eq!(target.raw_target("/Admin/users/4"), "/Admin/users/4");
    }

    #[test]
    fn omitted_application_uses_default() {
        let domain = domain();
        let target = domain.define_target_application("/users/4");
        assert_eq!(target.name, "site");
        assert!(target.is_omitted);
        assert!(target.is_default);
        assert_eq!(target.raw_target("/users/4"), "/site/users/4");
        assert!(domain.define_target_application("/site/users").is_default);

        let root = domain.define_target_application("/");
        assert_eq!(root.raw_target("/"), "/site");
        assert_eq!(root.new_location_path, None);
    }

    #[test]
    fn local_time_follows_configured_timezone() {
        let mut config = EngardeConfig::default();
        config.applications = vec![ApplicationConfig::default()];
        config.domain.date_time_local = "America/Sao_Paulo".into();
        let domain = Domain::new(&config);

        let instant = DateTime::parse_from_rfc3339("2024-06-01T15:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(domain.local_time(instant).to_rfc3339(), "2024-06-01T12:00:00-03:00");

        config.domain.date_time_local = "Nowhere/Else".into();
        assert_eq!(Domain::new(&config).timezone(), Tz::UTC);
    }

    #[test]
    fn case_mismatch_redirects_to_canonical_name() {
        let target = domain().define_target_application("/admin/users");
        assert_eq!(target.name, "Admin");
        assert_eq!(target.new_location_path.as_deref(), Some("/Admin/users"));
    }

    #[test]
    fn bare_application_redirects_to_start_route() {
        let domain = domain();
        let target = domain.define_target_application("/Admin");
        assert_eq!(target.new_location_path.as_deref(), Some("/Admin/dashboard"));

        let site = domain.define_target_application("/site/");
        assert_eq!(site.new_location_path, None);
    }
}
