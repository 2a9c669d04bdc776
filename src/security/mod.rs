//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Matched route + negotiated mime:
//!     → ip_guard.rs   (allow/deny lists, fault blocks)
//!     → store.rs      (security cookie → session, renew expiry)
//!     → permission.rs (profile entries vs. method + raw route)
//!     → gate.rs       (Allow | Forbidden | LoginRequired)
//!
//! Login request (controller action):
//!     → Session::execute_login (password digest, fault counters)
//!     → new session + Set-Cookie, or a grant on an existing session
//! ```
//!
//! # Design Decisions
//! - Fail closed: a secure route needs a recognized session and a profile
//!   entry covering it
//! - No trust in client input: sessions are bound to address and user agent

pub mod gate;
pub mod ip_guard;
pub mod permission;
pub mod session;
pub mod store;

pub use gate::{GateDecision, SecurityGate};
pub use ip_guard::{IpGuard, IpRule, IpRuleError, IpVerdict};
pub use permission::{Permission, PermissionError};
pub use session::{
    ActivityRecord, SecurityCookie, SecurityStatus, Session, SessionData, SessionError, UserData,
    UserProfile,
};
pub use store::{hash_password, LocalSessionStore, UserAgentSession};
