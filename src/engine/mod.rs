//! Application engine.
//!
//! # Data Flow
//! ```text
//! RequestContext + TargetApplication
//!     → application.rs (route lookup, method check)
//!     → negotiation    (mime + locale written into the route copy)
//!     → security gate  (allow / 401 / 303 login / 403)
//!     → cache.rs       (replay a stored response)
//!     → middleware.rs  (route middlewares, in declaration order)
//!     → controller.rs  (action) → http::response::render
//! ```
//!
//! # Design Decisions
//! - Controllers and middlewares are registered in code by an
//!   [`ApplicationSetup`]; routes name them by string
//! - Built-in controllers fill the gaps: a welcome page for applications
//!   without a setup, login handling when security is active

pub mod application;
pub mod builtin;
pub mod cache;
pub mod context;
pub mod controller;
pub mod middleware;

pub use application::{Application, ApplicationBuilder, ApplicationSetup, WelcomeSetup};
pub use builtin::{SecurityController, WelcomeController};
pub use cache::{CacheKey, ResponseCache};
pub use context::ActionContext;
pub use controller::Controller;
pub use middleware::{Next, RouteMiddleware};
