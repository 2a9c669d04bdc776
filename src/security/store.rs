//! In-memory session backend.
//!
//! # Responsibilities
//! - Keep authenticated sessions, login failure counters and resolved
//!   profile permissions of one application
//! - Hand out a per-request [`UserAgentSession`] implementing [`Session`]
//! - Keep a bounded activity log
//!
//! # Design Decisions
//! - Passwords are compared as SHA-256 hex digests
//! - Session hashes are random UUIDs; nothing secret is derived from them
//! - Sessions do not survive a restart

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::config::{SecurityConfig, SessionType, UserConfig};
use crate::routing::table::{raw_route, CompiledRouteFile};
use crate::security::ip_guard::{deadline, IpGuard, IpRuleError, IpVerdict, MAX_BLOCK_MINUTES};
use crate::security::permission::Permission;
use crate::security::session::{
    ActivityRecord, SecurityCookie, SecurityStatus, Session, SessionData, SessionError, UserData,
    UserProfile,
};

/// Activity entries kept in memory.
const ACTIVITY_CAPACITY: usize = 1024;

/// SHA-256 hex digest of a password, as stored in user records.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[derive(Debug, Default, Clone, Copy)]
struct LoginFaults {
    count: u32,
    blocked_until: Option<DateTime<Utc>>,
}

/// Sessions and security state of one application.
#[derive(Debug)]
pub struct LocalSessionStore {
    application: String,
    config: SecurityConfig,
    path_to_local_data: PathBuf,
    ip_guard: IpGuard,
    profiles: HashMap<String, Vec<Permission>>,
    resolved: ArcSwap<HashMap<String, BTreeSet<String>>>,
    sessions: DashMap<String, SessionData>,
    login_faults: DashMap<String, LoginFaults>,
    activity: Mutex<VecDeque<ActivityRecord>>,
}

impl LocalSessionStore {
    pub fn new(
        application: &str,
        config: SecurityConfig,
        path_to_local_data: PathBuf,
    ) -> Result<Self, IpRuleError> {
        if config.session_type == SessionType::Database {
            tracing::warn!(
                application,
                "Database sessions are not available, keeping sessions in memory"
            );
        }
        let ip_guard = IpGuard::from_config(&config)?;
        let profiles = config
            .profiles
            .iter()
            .filter(|p| p.application.is_empty() || p.application.eq_ignore_ascii_case(application))
            .map(|p| {
                let entries = p
                    .permissions
                    .iter()
                    .filter_map(|e| match e.parse::<Permission>() {
                        Ok(permission) => Some(permission),
                        Err(err) => {
                            tracing::warn!(profile = %p.name, error = %err, "Ignoring permission");
                            None
                        }
                    })
                    .collect();
                (p.name.clone(), entries)
            })
            .collect();

        Ok(Self {
            application: application.to_string(),
            config,
            path_to_local_data,
            ip_guard,
            profiles,
            resolved: ArcSwap::from_pointee(HashMap::new()),
            sessions: DashMap::new(),
            login_faults: DashMap::new(),
            activity: Mutex::new(VecDeque::new()),
        })
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn ip_guard(&self) -> &IpGuard {
        &self.ip_guard
    }

    /// Start a request-scoped session for a UA.
    pub fn user_agent(
        self: &Arc<Self>,
        client_ip: IpAddr,
        user_agent: &str,
        cookie_value: Option<String>,
        now: DateTime<Utc>,
    ) -> UserAgentSession {
        UserAgentSession {
            store: Arc::clone(self),
            client_ip,
            user_agent: user_agent.to_string(),
            cookie_value,
            now,
            status: SecurityStatus::UserAgentUndefined,
            current: None,
            is_https: false,
            cookie_path: format!("/{}", self.application),
            set_cookies: Vec::new(),
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Most recent activity entries, newest last.
    pub fn recent_activity(&self, limit: usize) -> Vec<ActivityRecord> {
        let log = self.activity.lock().expect("activity log mutex poisoned");
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).cloned().collect()
    }

    /// Drop sessions expired at `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at > now);
        before - self.sessions.len()
    }

    fn user(&self, login: &str) -> Option<&UserConfig> {
        self.config
            .users
            .iter()
            .find(|u| u.login.eq_ignore_ascii_case(login))
    }

    fn user_by_id(&self, id: i64) -> Option<&UserConfig> {
        self.config.users.iter().find(|u| u.id == id)
    }

    fn session_ttl(&self) -> Duration {
        Duration::minutes(self.config.session_timeout.min(MAX_BLOCK_MINUTES) as i64)
    }

    fn login_block(&self) -> Duration {
        Duration::minutes(self.config.login_block_timeout.min(MAX_BLOCK_MINUTES) as i64)
    }

    fn login_blocked_at(&self, login: &str, now: DateTime<Utc>) -> bool {
        let key = login.to_ascii_lowercase();
        let Some(mut faults) = self.login_faults.get_mut(&key) else {
            return false;
        };
        match faults.blocked_until {
            Some(until) if until > now => true,
            Some(_) => {
                *faults = LoginFaults::default();
                false
            }
            None => false,
        }
    }

    fn record_login_fault(&self, login: &str, now: DateTime<Utc>) {
        let limit = self.config.allowed_fault_by_login;
        if limit == 0 {
            return;
        }
        let mut faults = self.login_faults.entry(login.to_ascii_lowercase()).or_default();
        faults.count += 1;
        if faults.count >= limit && faults.blocked_until.is_none() {
            faults.blocked_until = Some(deadline(now, self.login_block()));
            tracing::warn!(application = %self.application, login, "Login blocked");
        }
    }

    fn profile(&self, name: &str) -> Option<UserProfile> {
        let entries = self.profiles.get(name)?;
        let configured = self.config.profiles.iter().find(|p| p.name == name)?;
        Some(UserProfile {
            name: name.to_string(),
            application: configured.application.clone(),
            permissions: entries.iter().map(ToString::to_string).collect(),
            routes: self.resolved.load().get(name).cloned().unwrap_or_default(),
        })
    }

    fn profile_allows(&self, profile: &str, method: &str, raw_route: &str) -> bool {
        let resolved = self.resolved.load();
        if let Some(routes) = resolved.get(profile) {
            return routes.contains(&route_key(method, raw_route));
        }
        self.profiles
            .get(profile)
            .is_some_and(|entries| entries.iter().any(|p| p.matches(method, raw_route)))
    }

    /// Resolve every profile against a compiled route table file.
    pub fn process_routes_permissions(&self, path: &Path) -> Result<(), SessionError> {
        let file: CompiledRouteFile = serde_json::from_slice(&fs::read(path)?)?;
        let mut pairs = Vec::new();
        for values in &file.routes {
            let Some(method) = values.method.as_deref() else {
                continue;
            };
            for route in values.routes.iter().flatten() {
                pairs.push((method.to_ascii_uppercase(), raw_route(&file.application, route)));
            }
        }

        let resolved: HashMap<String, BTreeSet<String>> = self
            .profiles
            .iter()
            .map(|(name, entries)| {
                let routes = pairs
                    .iter()
                    .filter(|(m, r)| entries.iter().any(|p| p.matches(m, r)))
                    .map(|(m, r)| route_key(m, r))
                    .collect();
                (name.clone(), routes)
            })
            .collect();

        tracing::debug!(
            application = %self.application,
            profiles = resolved.len(),
            routes = pairs.len(),
            "Route permissions resolved"
        );
        self.resolved.store(Arc::new(resolved));
        Ok(())
    }

    fn push_activity(&self, record: ActivityRecord) {
        tracing::info!(
            application = %record.application,
            user_id = ?record.user_id,
            client_ip = %record.client_ip,
            method = %record.method,
            url = %record.full_url,
            activity = %record.activity,
            "Activity"
        );
        let mut log = self.activity.lock().expect("activity log mutex poisoned");
        if log.len() == ACTIVITY_CAPACITY {
            log.pop_front();
        }
        log.push_back(record);
    }
}

fn route_key(method: &str, raw_route: &str) -> String {
    let route = match raw_route.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    format!("{} {}", method.to_ascii_uppercase(), route)
}

/// [`Session`] of one UA during one request.
#[derive(Debug)]
pub struct UserAgentSession {
    store: Arc<LocalSessionStore>,
    client_ip: IpAddr,
    user_agent: String,
    cookie_value: Option<String>,
    now: DateTime<Utc>,
    status: SecurityStatus,
    current: Option<SessionData>,
    is_https: bool,
    cookie_path: String,
    set_cookies: Vec<String>,
}

impl UserAgentSession {
    /// Mark the request as received over HTTPS (cookies get `Secure`).
    pub fn with_https(mut self, is_https: bool) -> Self {
        self.is_https = is_https;
        self
    }

    /// Scope cookies to `/` instead of `/<application>`. The default
    /// application also answers paths without its name.
    pub fn with_root_cookie_path(mut self, root: bool) -> Self {
        if root {
            self.cookie_path = "/".to_string();
        }
        self
    }

    /// `Set-Cookie` values produced during the request.
    pub fn take_set_cookies(&mut self) -> Vec<String> {
        std::mem::take(&mut self.set_cookies)
    }

    pub fn client_ip(&self) -> IpAddr {
        self.client_ip
    }

    /// Whether the client address is refused or blocked.
    pub fn is_ip_refused(&self) -> bool {
        self.store.ip_guard.check_at(self.client_ip, self.now) != IpVerdict::Allowed
    }

    fn push_cookie(&mut self, name: &str, value: &str, max_age: i64) {
        let mut cookie = format!(
            "{name}={value}; Path={}; Max-Age={max_age}; HttpOnly; SameSite=Lax",
            self.cookie_path
        );
        if self.is_https {
            cookie.push_str("; Secure");
        }
        self.set_cookies.push(cookie);
    }

    fn write_session_cookies(&mut self, hash: &str, profile: &str) {
        let max_age = self.store.session_ttl().num_seconds();
        let security = self.store.config.security_cookie_name.clone();
        let data = self.store.config.data_cookie_name.clone();
        self.push_cookie(&security, hash, max_age);
        self.push_cookie(&data, profile, max_age);
    }

    fn clear_session_cookies(&mut self) {
        let security = self.store.config.security_cookie_name.clone();
        let data = self.store.config.data_cookie_name.clone();
        self.push_cookie(&security, "", 0);
        self.push_cookie(&data, "", 0);
    }

    /// Check credentials, updating the fault counters and the status.
    fn authenticate(&mut self, login: &str, password: &str) -> Option<UserConfig> {
        let store = Arc::clone(&self.store);
        if store.ip_guard.check_at(self.client_ip, self.now) != IpVerdict::Allowed {
            self.status = SecurityStatus::UserAgentIpBlocked;
            return None;
        }
        self.status = SecurityStatus::UserAgentIpValid;

        let Some(user) = store.user(login) else {
            store.ip_guard.record_fault_at(self.client_ip, self.now);
            self.status = SecurityStatus::UserAccountDoesNotExist;
            return None;
        };
        if store.login_blocked_at(login, self.now) {
            self.status = SecurityStatus::UserAccountWaitingNewLoginTime;
            return None;
        }
        if !user.active {
            self.status = SecurityStatus::UserAccountDisabled;
            return None;
        }
        self.status = SecurityStatus::UserAccountRecognizedAndActive;

        if !hash_password(password).eq_ignore_ascii_case(&user.password_hash) {
            store.record_login_fault(login, self.now);
            store.ip_guard.record_fault_at(self.client_ip, self.now);
            self.status = SecurityStatus::UserAccountUnexpectedPassword;
            return None;
        }

        store.login_faults.remove(&login.to_ascii_lowercase());
        store.ip_guard.clear(self.client_ip);
        Some(user.clone())
    }

    fn grant(&mut self, granter: &UserConfig, permission: &str, session_hash: &str) -> bool {
        let store = Arc::clone(&self.store);
        let Ok(parsed) = permission.parse::<Permission>() else {
            self.status = SecurityStatus::UserSessionLoginFail;
            return false;
        };
        let granter_allowed = granter
            .profiles
            .iter()
            .any(|profile| permission_covered(&store, profile, &parsed, permission));
        if !granter_allowed {
            self.status = SecurityStatus::UserSessionLoginFail;
            return false;
        }
        let granted = match store.sessions.get_mut(session_hash) {
            Some(mut session) if session.expires_at > self.now => {
                session.granted_permissions.insert(parsed.to_string());
                tracing::info!(
                    application = %store.application,
                    granted_by = %granter.login,
                    permission = %parsed,
                    "Permission granted to session"
                );
                self.status = SecurityStatus::SessionPermissionGranted;
                true
            }
            _ => {
                self.status = SecurityStatus::UserSessionUnespected;
                false
            }
        };
        granted
    }
}

/// Whether `profile` may hand out `permission` to another session.
fn permission_covered(
    store: &LocalSessionStore,
    profile: &str,
    parsed: &Permission,
    raw: &str,
) -> bool {
    let Some(entries) = store.profiles.get(profile) else {
        return false;
    };
    if entries.iter().any(|p| p == parsed) {
        return true;
    }
    let mut parts = raw.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(method), Some(route)) if method != "*" && !route.ends_with('*') => {
            store.profile_allows(profile, method, route)
        }
        _ => false,
    }
}

impl Session for UserAgentSession {
    fn retrieve_security_cookie(&self) -> SecurityCookie {
        SecurityCookie {
            name: self.store.config.security_cookie_name.clone(),
            value: self.cookie_value.clone(),
        }
    }

    fn retrieve_path_to_local_data(&self) -> PathBuf {
        self.store.path_to_local_data.clone()
    }

    fn has_database(&self) -> bool {
        false
    }

    fn retrieve_session(&self) -> Option<SessionData> {
        self.current.clone()
    }

    fn retrieve_user(&self) -> Option<UserData> {
        let session = self.current.as_ref()?;
        let user = self.store.user_by_id(session.user_id)?;
        Some(UserData {
            id: user.id,
            login: user.login.clone(),
            name: user.name.clone(),
            active: user.active,
            profiles: user.profiles.clone(),
        })
    }

    fn retrieve_user_profile(&self) -> Option<UserProfile> {
        let session = self.current.as_ref()?;
        self.store.profile(&session.profile)
    }

    fn retrieve_user_profile_name(&self) -> Option<String> {
        self.current.as_ref().map(|s| s.profile.clone())
    }

    fn retrieve_user_profiles(&self, application: &str) -> Vec<UserProfile> {
        let Some(user) = self.current.as_ref().and_then(|s| self.store.user_by_id(s.user_id))
        else {
            return Vec::new();
        };
        user.profiles
            .iter()
            .filter_map(|name| self.store.profile(name))
            .filter(|p| {
                application.is_empty()
                    || p.application.is_empty()
                    || p.application.eq_ignore_ascii_case(application)
            })
            .collect()
    }

    fn change_user_profile(&mut self, profile: &str) -> bool {
        let Some(session) = self.current.as_mut() else {
            return false;
        };
        let allowed = self
            .store
            .user_by_id(session.user_id)
            .is_some_and(|u| u.profiles.iter().any(|p| p == profile))
            && self.store.profiles.contains_key(profile);
        if !allowed {
            return false;
        }
        session.profile = profile.to_string();
        let hash = session.hash.clone();
        if let Some(mut stored) = self.store.sessions.get_mut(&hash) {
            stored.profile = profile.to_string();
        }
        self.write_session_cookies(&hash, profile);
        true
    }

    fn retrieve_security_status(&self) -> SecurityStatus {
        self.status
    }

    fn execute_login(
        &mut self,
        login: &str,
        password: &str,
        grant_permission: Option<&str>,
        session_hash: Option<&str>,
    ) -> bool {
        let Some(user) = self.authenticate(login, password) else {
            tracing::info!(
                application = %self.store.application,
                login,
                status = %self.status,
                "Login refused"
            );
            return false;
        };

        if let (Some(permission), Some(hash)) = (grant_permission, session_hash) {
            return self.grant(&user, permission, hash);
        }

        let profile = if user.default_profile.is_empty() {
            user.profiles.first().cloned().unwrap_or_default()
        } else {
            user.default_profile.clone()
        };
        let session = SessionData {
            hash: uuid::Uuid::new_v4().simple().to_string(),
            application: self.store.application.clone(),
            user_id: user.id,
            login: user.login.clone(),
            profile: profile.clone(),
            client_ip: self.client_ip,
            user_agent: self.user_agent.clone(),
            created_at: self.now,
            last_access: self.now,
            expires_at: deadline(self.now, self.store.session_ttl()),
            granted_permissions: BTreeSet::new(),
        };
        let hash = session.hash.clone();

        self.store.sessions.insert(hash.clone(), session.clone());
        self.current = Some(session);
        self.cookie_value = Some(hash.clone());
        self.write_session_cookies(&hash, &profile);
        self.status = SecurityStatus::UserSessionAuthenticated;
        tracing::info!(
            application = %self.store.application,
            user_id = user.id,
            profile = %profile,
            "Login succeeded"
        );
        true
    }

    fn check_user_agent_session(&mut self) -> bool {
        let Some(hash) = self.cookie_value.clone().filter(|v| !v.is_empty()) else {
            self.status = SecurityStatus::UserAgentUndefined;
            return false;
        };
        if self.is_ip_refused() {
            self.status = SecurityStatus::UserAgentIpBlocked;
            return false;
        }

        let Some(mut stored) = self.store.sessions.get_mut(&hash) else {
            self.status = SecurityStatus::UserSessionUnespected;
            return false;
        };
        if stored.expires_at <= self.now {
            drop(stored);
            self.store.sessions.remove(&hash);
            self.status = SecurityStatus::UserSessionExpired;
            self.clear_session_cookies();
            return false;
        }
        if stored.client_ip != self.client_ip || stored.user_agent != self.user_agent {
            drop(stored);
            self.status = SecurityStatus::UserSessionUnespected;
            tracing::warn!(
                application = %self.store.application,
                client_ip = %self.client_ip,
                "Session presented from another user agent"
            );
            return false;
        }

        stored.last_access = self.now;
        let renew = self.store.config.is_session_renew;
        if renew {
            stored.expires_at = deadline(self.now, self.store.session_ttl());
        }
        let session = stored.clone();
        drop(stored);

        if renew {
            self.write_session_cookies(&session.hash, &session.profile);
        }
        self.current = Some(session);
        self.status = SecurityStatus::UserSessionAuthenticated;
        true
    }

    fn execute_logout(&mut self) -> bool {
        let hash = match (&self.current, &self.cookie_value) {
            (Some(session), _) => session.hash.clone(),
            (None, Some(value)) if !value.is_empty() => value.clone(),
            _ => return false,
        };
        let removed = self.store.sessions.remove(&hash).is_some();
        self.current = None;
        self.cookie_value = None;
        self.clear_session_cookies();
        self.status = SecurityStatus::UserSessionLogout;
        removed
    }

    fn check_route_permission(&self, method: &str, raw_route: &str) -> bool {
        let Some(session) = &self.current else {
            return false;
        };
        if self.store.profile_allows(&session.profile, method, raw_route) {
            return true;
        }
        session
            .granted_permissions
            .iter()
            .filter_map(|entry| entry.parse::<Permission>().ok())
            .any(|p| p.matches(method, raw_route))
    }

    fn process_routes_permissions(&self, path_to_app_routes: &Path) -> Result<(), SessionError> {
        self.store.process_routes_permissions(path_to_app_routes)
    }

    fn register_log_activity(
        &self,
        method: &str,
        full_url: &str,
        post_data: Option<&BTreeMap<String, String>>,
        controller: &str,
        action: &str,
        activity: &str,
        note: &str,
    ) -> bool {
        let post_data = post_data.map(|data| {
            data.iter()
                .map(|(k, v)| {
                    let value = if k.to_ascii_lowercase().contains("password") {
                        "***".to_string()
                    } else {
                        v.clone()
                    };
                    (k.clone(), value)
                })
                .collect()
        });
        self.store.push_activity(ActivityRecord {
            at: self.now,
            application: self.store.application.clone(),
            session_hash: self.current.as_ref().map(|s| s.hash.clone()),
            user_id: self.current.as_ref().map(|s| s.user_id),
            client_ip: self.client_ip,
            method: method.to_string(),
            full_url: full_url.to_string(),
            post_data,
            controller: controller.to_string(),
            action: action.to_string(),
            activity: activity.to_string(),
            note: note.to_string(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileConfig;
    use crate::routing::RouteValues;

    fn config() -> SecurityConfig {
        SecurityConfig {
            is_active: true,
            allowed_fault_by_login: 2,
            allowed_fault_by_ip: 10,
            users: vec![
                UserConfig {
                    id: 2,
                    login: "ana".into(),
                    name: "Ana".into(),
                    password_hash: hash_password("secret"),
                    active: true,
                    profiles: vec!["editor".into(), "viewer".into()],
                    default_profile: String::new(),
                },
                UserConfig {
                    id: 3,
                    login: "bob".into(),
                    name: "Bob".into(),
                    password_hash: hash_password("hunter2"),
                    active: false,
                    profiles: vec!["viewer".into()],
                    default_profile: String::new(),
                },
                UserConfig {
                    id: 4,
                    login: "boss".into(),
                    name: "Boss".into(),
                    password_hash: hash_password("chief"),
                    active: true,
                    profiles: vec!["admin".into()],
                    default_profile: String::new(),
                },
            ],
            profiles: vec![
                ProfileConfig {
                    name: "editor".into(),
                    application: "site".into(),
                    permissions: vec!["* /site/posts/*".into(), "GET /site".into()],
                },
                ProfileConfig {
                    name: "viewer".into(),
                    application: String::new(),
                    permissions: vec!["GET *".into()],
                },
                ProfileConfig {
                    name: "admin".into(),
                    application: String::new(),
                    permissions: vec!["* *".into()],
                },
            ],
            ..Default::default()
        }
    }

    fn store() -> Arc<LocalSessionStore> {
        Arc::new(LocalSessionStore::new("site", config(), PathBuf::from("/tmp/site/data")).unwrap())
    }

    fn ua(store: &Arc<LocalSessionStore>, cookie: Option<String>, now: DateTime<Utc>) -> UserAgentSession {
        store.user_agent("192.0.2.10".parse().unwrap(), "test-agent", cookie, now)
    }

    #[test]
    fn login_opens_session_and_sets_cookies() {
        let store = store();
        let now = Utc::now();
        let mut session = ua(&store, None, now);

        assert!(session.execute_login("ANA", "secret", None, None));
        assert_eq!(session.retrieve_security_status(), SecurityStatus::UserSessionAuthenticated);
        assert_eq!(session.retrieve_user_profile_name().as_deref(), Some("editor"));
        assert_eq!(session.retrieve_user().unwrap().id, 2);

        let cookies = session.take_set_cookies();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("engarde_session="));
        assert!(cookies[0].contains("Max-Age=2400"));
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn default_application_cookies_cover_the_whole_domain() {
        let store = store();
        let mut scoped = ua(&store, None, Utc::now());
        scoped.execute_login("ana", "secret", None, None);
        assert!(scoped.take_set_cookies()[0].contains("; Path=/site;"));

        let mut root = ua(&store, None, Utc::now()).with_root_cookie_path(true);
        root.execute_login("ana", "secret", None, None);
        assert!(root.take_set_cookies()[0].contains("; Path=/;"));
    }

    #[test]
    fn huge_timeouts_saturate_instead_of_overflowing() {
        let mut config = config();
        config.session_timeout = u64::MAX;
        config.login_block_timeout = u64::MAX;
        let store = Arc::new(LocalSessionStore::new("site", config, PathBuf::from("/tmp")).unwrap());
        let now = Utc::now();

        let mut session = ua(&store, None, now);
        assert!(session.execute_login("ana", "secret", None, None));
        let hash = session.retrieve_session().unwrap().hash;
        let mut next = ua(&store, Some(hash), now + Duration::days(3650));
        assert!(next.check_user_agent_session());

        let mut failing = ua(&store, None, now);
        assert!(!failing.execute_login("ana", "wrong", None, None));
        assert!(!failing.execute_login("ana", "wrong", None, None));
        assert!(!failing.execute_login("ana", "secret", None, None));
        assert_eq!(
            failing.retrieve_security_status(),
            SecurityStatus::UserAccountWaitingNewLoginTime
        );
    }

    #[test]
    fn login_failures_report_status() {
        let store = store();
        let now = Utc::now();
        let mut session = ua(&store, None, now);

        assert!(!session.execute_login("nobody", "x", None, None));
        assert_eq!(session.retrieve_security_status(), SecurityStatus::UserAccountDoesNotExist);

        assert!(!session.execute_login("bob", "hunter2", None, None));
        assert_eq!(session.retrieve_security_status(), SecurityStatus::UserAccountDisabled);

        assert!(!session.execute_login("ana", "wrong", None, None));
        assert_eq!(
            session.retrieve_security_status(),
            SecurityStatus::UserAccountUnexpectedPassword
        );
        assert!(!session.execute_login("ana", "wrong", None, None));
        assert!(!session.execute_login("ana", "secret", None, None));
        assert_eq!(
            session.retrieve_security_status(),
            SecurityStatus::UserAccountWaitingNewLoginTime
        );

        let later = now + Duration::minutes(21);
        let mut session = ua(&store, None, later);
        assert!(session.execute_login("ana", "secret", None, None));
    }

    #[test]
    fn session_is_recognized_renewed_and_expires() {
        let store = store();
        let now = Utc::now();
        let mut login = ua(&store, None, now);
        login.execute_login("ana", "secret", None, None);
        let hash = login.retrieve_session().unwrap().hash;

        let mut next = ua(&store, Some(hash.clone()), now + Duration::minutes(30));
        assert!(next.check_user_agent_session());
        assert_eq!(next.take_set_cookies().len(), 2);

        let mut renewed = ua(&store, Some(hash.clone()), now + Duration::minutes(60));
        assert!(renewed.check_user_agent_session());

        let mut expired = ua(&store, Some(hash), now + Duration::minutes(200));
        assert!(!expired.check_user_agent_session());
        assert_eq!(expired.retrieve_security_status(), SecurityStatus::UserSessionExpired);
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn session_from_another_agent_is_unexpected() {
        let store = store();
        let now = Utc::now();
        let mut login = ua(&store, None, now);
        login.execute_login("ana", "secret", None, None);
        let hash = login.retrieve_session().unwrap().hash;

        let mut other = store.user_agent("192.0.2.99".parse().unwrap(), "test-agent", Some(hash), now);
        assert!(!other.check_user_agent_session());
        assert_eq!(other.retrieve_security_status(), SecurityStatus::UserSessionUnespected);

        let mut missing = ua(&store, None, now);
        assert!(!missing.check_user_agent_session());
        assert_eq!(missing.retrieve_security_status(), SecurityStatus::UserAgentUndefined);
    }

    #[test]
    fn permissions_follow_profile_and_change() {
        let store = store();
        let mut session = ua(&store, None, Utc::now());
        session.execute_login("ana", "secret", None, None);

        assert!(session.check_route_permission("POST", "/site/posts/{id}"));
        assert!(!session.check_route_permission("GET", "/site/users"));

        assert!(session.change_user_profile("viewer"));
        assert!(session.check_route_permission("GET", "/site/users"));
        assert!(!session.check_route_permission("POST", "/site/posts/{id}"));
        assert!(!session.change_user_profile("admin"));

        assert_eq!(session.retrieve_user_profiles("site").len(), 2);
        assert_eq!(session.retrieve_user_profiles("blog").len(), 1);
    }

    #[test]
    fn resolved_permissions_use_route_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AppRoutes.json");
        let route = |decl: &str, method: &str| {
            let mut values: RouteValues = decl.parse().unwrap();
            values.method = Some(method.to_string());
            values
        };
        let file = CompiledRouteFile {
            application: "site".into(),
            fingerprint: "fp".into(),
            generated_at: Utc::now(),
            routes: vec![
                route("GET /posts/{id} posts:show", "GET"),
                route("DELETE /posts/{id} posts:delete", "DELETE"),
                route("GET / home:index", "GET"),
            ],
        };
        fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        let store = store();
        let mut session = ua(&store, None, Utc::now());
        session.execute_login("ana", "secret", None, None);
        session.process_routes_permissions(&path).unwrap();

        let profile = session.retrieve_user_profile().unwrap();
        assert_eq!(
            profile.routes.iter().cloned().collect::<Vec<_>>(),
            vec!["DELETE /site/posts/{id}", "GET /site", "GET /site/posts/{id}"]
        );
        assert!(session.check_route_permission("DELETE", "/site/posts/{id}"));
        assert!(!session.check_route_permission("GET", "/site/unknown"));
    }

    #[test]
    fn grant_attaches_permission_to_existing_session() {
        let store = store();
        let now = Utc::now();
        let mut viewer = ua(&store, None, now);
        viewer.execute_login("ana", "secret", None, None);
        viewer.change_user_profile("viewer");
        let hash = viewer.retrieve_session().unwrap().hash;
        assert!(!viewer.check_route_permission("DELETE", "/site/users/{id}"));

        let mut supervisor = ua(&store, None, now);
        assert!(supervisor.execute_login(
            "boss",
            "chief",
            Some("DELETE /site/users/{id}"),
            Some(&hash)
        ));
        assert_eq!(
            supervisor.retrieve_security_status(),
            SecurityStatus::SessionPermissionGranted
        );
        assert_eq!(store.session_count(), 1);

        let mut again = ua(&store, Some(hash), now);
        assert!(again.check_user_agent_session());
        assert!(again.check_route_permission("DELETE", "/site/users/{id}"));
    }

    #[test]
    fn logout_removes_session() {
        let store = store();
        let mut session = ua(&store, None, Utc::now());
        session.execute_login("ana", "secret", None, None);
        session.take_set_cookies();

        assert!(session.execute_logout());
        assert_eq!(session.retrieve_security_status(), SecurityStatus::UserSessionLogout);
        assert!(session.take_set_cookies()[0].contains("Max-Age=0"));
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn activity_log_redacts_passwords() {
        let store = store();
        let session = ua(&store, None, Utc::now());
        let mut post = BTreeMap::new();
        post.insert("login".to_string(), "ana".to_string());
        post.insert("password".to_string(), "secret".to_string());

        session.register_log_activity("POST", "http://localhost/site/login", Some(&post), "auth", "login", "login", "");
        let log = store.recent_activity(10);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].post_data.as_ref().unwrap()["password"], "***");
    }
}
