//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! engarde.toml
//!     → loader.rs (parse, resolve relative roots)
//!     → validation.rs (semantic checks)
//!     → EngardeConfig (validated, immutable)
//!     → Domain built from it, shared via ArcSwap
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server rebuilds the Domain and swaps it atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, ApplicationConfig, DomainConfig, EngardeConfig, EnvironmentType,
    ListenerConfig, ProfileConfig, RouteDeclaration, SecurityConfig, SessionType, UserConfig,
};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
