//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route compilation (startup / rebuild):
//!     application defaults ← controller defaults ← route declarations
//!     → route.rs   (validated RouteRecord per method)
//!     → table.rs   (group by raw route, compile matcher, persist JSON)
//!     → router.rs  (atomic swap of the live table)
//!
//! Incoming request target (`/<app>/<path>`)
//!     → router.rs  (table lookup)
//!     → matcher.rs (exact map, then ranked dynamic patterns)
//!     → Return: RouteSelection (records per method + params) or None
//! ```
//!
//! # Design Decisions
//! - Tables are immutable once compiled; rebuilds replace them wholesale
//! - Deterministic: same input always matches same route
//! - Every method of a route carries its own RouteRecord

pub mod matcher;
pub mod mime;
pub mod route;
pub mod router;
pub mod table;

pub use matcher::{RouteMatcher, RoutePattern};
pub use mime::{MimeEntry, MimeSpec};
pub use route::{ActionAttributes, RouteError, RouteRecord, RouteValues};
pub use router::{ControllerRoutes, Router, RouterError, RouterSettings};
pub use table::{raw_route, RouteSelection, RouteTable};
