//! EnGarde: route resolution, content negotiation and a security gate for
//! the applications hosted in one domain.

// Core subsystems
pub mod config;
pub mod domain;
pub mod engine;
pub mod http;
pub mod negotiation;
pub mod routing;

// Cross-cutting concerns
pub mod admin;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::EngardeConfig;
pub use engine::{Application, ApplicationBuilder, ApplicationSetup, Controller, RouteMiddleware};
pub use error::{EngineError, EngineResult};
pub use http::{HttpServer, SetupRegistry};
pub use lifecycle::Shutdown;
