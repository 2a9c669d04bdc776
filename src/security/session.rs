//! Session contract and the data it exposes.
//!
//! # Responsibilities
//! - Define the [`Session`] trait every session backend implements
//! - Define the records a session hands out (session, user, profile,
//!   activity) and the [`SecurityStatus`] reported after each check
//!
//! # Design Decisions
//! - A `Session` is per request: it knows the UA (address, user agent,
//!   security cookie) and accumulates the cookies to send back
//! - Operations answer with plain values and record the reason in the
//!   security status instead of failing

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by session backends outside the login flow.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read route table: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed route table: {0}")]
    Format(#[from] serde_json::Error),
}

/// Identification and authentication state of the UA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityStatus {
    UserAgentUndefined,
    UserAgentIpBlocked,
    UserAgentIpValid,
    UserAccountDoesNotExist,
    UserAccountDisabled,
    UserAccountRecognizedAndActive,
    UserAccountUnexpectedPassword,
    UserAccountWaitingNewLoginTime,
    UserSessionAuthenticated,
    UserSessionLoginFail,
    UserSessionUnespected,
    UserSessionExpired,
    UserSessionLogout,
    SessionPermissionGranted,
}

impl SecurityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityStatus::UserAgentUndefined => "UserAgentUndefined",
            SecurityStatus::UserAgentIpBlocked => "UserAgentIPBlocked",
            SecurityStatus::UserAgentIpValid => "UserAgentIPValid",
            SecurityStatus::UserAccountDoesNotExist => "UserAccountDoesNotExist",
            SecurityStatus::UserAccountDisabled => "UserAccountDisabled",
            SecurityStatus::UserAccountRecognizedAndActive => "UserAccountRecognizedAndActive",
            SecurityStatus::UserAccountUnexpectedPassword => "UserAccountUnexpectedPassword",
            SecurityStatus::UserAccountWaitingNewLoginTime => "UserAccountWaitingNewLoginTime",
            SecurityStatus::UserSessionAuthenticated => "UserSessionAuthenticated",
            SecurityStatus::UserSessionLoginFail => "UserSessionLoginFail",
            SecurityStatus::UserSessionUnespected => "UserSessionUnespected",
            SecurityStatus::UserSessionExpired => "UserSessionExpired",
            SecurityStatus::UserSessionLogout => "UserSessionLogout",
            SecurityStatus::SessionPermissionGranted => "SessionPermissionGranted",
        }
    }
}

impl fmt::Display for SecurityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The security cookie as received from the UA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityCookie {
    pub name: String,
    pub value: Option<String>,
}

/// An authenticated session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionData {
    pub hash: String,
    pub application: String,
    pub user_id: i64,
    pub login: String,
    pub profile: String,
    pub client_ip: IpAddr,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Permissions granted to this session by another user's login.
    pub granted_permissions: BTreeSet<String>,
}

/// Public data of a user account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserData {
    pub id: i64,
    pub login: String,
    pub name: String,
    pub active: bool,
    pub profiles: Vec<String>,
}

/// A security profile and the routes it reaches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub name: String,
    pub application: String,
    /// Configured entries, as written.
    pub permissions: Vec<String>,
    /// Concrete `"<METHOD> <raw route>"` pairs resolved from the route table.
    pub routes: BTreeSet<String>,
}

/// One entry of the activity log.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
    pub at: DateTime<Utc>,
    pub application: String,
    pub session_hash: Option<String>,
    pub user_id: Option<i64>,
    pub client_ip: IpAddr,
    pub method: String,
    pub full_url: String,
    pub post_data: Option<BTreeMap<String, String>>,
    pub controller: String,
    pub action: String,
    pub activity: String,
    pub note: String,
}

/// Access control for one UA during one request.
pub trait Session: Send {
    /// Security cookie sent by the UA.
    fn retrieve_security_cookie(&self) -> SecurityCookie;

    /// Directory where locally stored session data lives.
    fn retrieve_path_to_local_data(&self) -> PathBuf;

    /// Whether sessions are kept in a database.
    fn has_database(&self) -> bool;

    /// The authenticated session, once recognized.
    fn retrieve_session(&self) -> Option<SessionData>;

    /// The user bound to the authenticated session.
    fn retrieve_user(&self) -> Option<UserData>;

    /// The profile in use.
    fn retrieve_user_profile(&self) -> Option<UserProfile>;

    fn retrieve_user_profile_name(&self) -> Option<String>;

    /// Profiles the user may use; filtered by application when not empty.
    fn retrieve_user_profiles(&self, application: &str) -> Vec<UserProfile>;

    /// Switch to another of the user's profiles.
    fn change_user_profile(&mut self, profile: &str) -> bool;

    fn retrieve_security_status(&self) -> SecurityStatus;

    /// Authenticate a user. With `grant_permission` and `session_hash` the
    /// permission is attached to that existing session instead of opening
    /// a new one.
    fn execute_login(
        &mut self,
        login: &str,
        password: &str,
        grant_permission: Option<&str>,
        session_hash: Option<&str>,
    ) -> bool;

    /// Recognize the UA's session from its security cookie.
    fn check_user_agent_session(&mut self) -> bool;

    fn execute_logout(&mut self) -> bool;

    /// Whether the profile in use may call `method` on `raw_route`.
    fn check_route_permission(&self, method: &str, raw_route: &str) -> bool;

    /// Resolve every profile against the compiled route table at `path`.
    fn process_routes_permissions(&self, path_to_app_routes: &Path) -> Result<(), SessionError>;

    #[allow(clippy::too_many_arguments)]
    fn register_log_activity(
        &self,
        method: &str,
        full_url: &str,
        post_data: Option<&BTreeMap<String, String>>,
        controller: &str,
        action: &str,
        activity: &str,
        note: &str,
    ) -> bool;
}
