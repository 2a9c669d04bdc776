//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Logging/metrics → Build domain → Listeners
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Trigger → listeners stop accepting → drain (bounded) → exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when every application is built)
//! - Shutdown has a deadline: `timeouts.shutdown_secs`

pub mod shutdown;
pub mod signals;

pub use shutdown::{drain_with_deadline, Shutdown};
pub use signals::{spawn_signal_handler, wait_for_signal};
