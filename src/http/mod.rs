//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs   (Axum setup, layers, target application)
//!     → request.rs  (RequestContext: peer, headers, cookies, body)
//!     → engine      (route, negotiate, gate, action)
//!     → response.rs (ActionResult → headers + body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{ClientAddressPolicy, RequestContext, X_REQUEST_ID};
pub use response::{ActionBody, ActionResult};
pub use server::{AppState, DomainState, HttpServer, SetupRegistry};
