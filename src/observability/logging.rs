//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Pick the filter from `RUST_LOG`, falling back to the configured level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `tower_http` spans are always included so request ids show up

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor config set one.
pub const DEFAULT_FILTER: &str = "engarde=debug,tower_http=debug";

/// Filter directive for a configured level such as `info`.
pub fn filter_for_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "" => DEFAULT_FILTER.to_string(),
        level @ ("trace" | "debug" | "info" | "warn" | "error") => {
            format!("engarde={level},tower_http={level}")
        }
        other => other.to_string(),
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(level: Option<&str>) {
    let fallback = level.map(filter_for_level).unwrap_or_else(|| DEFAULT_FILTER.to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
