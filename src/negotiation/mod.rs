//! Content negotiation subsystem.
//!
//! # Data Flow
//! ```text
//! Accept / Accept-Language headers, `_mime` / `_locale` query overrides
//!     → accept.rs (quality lists, locale/language split)
//!     → mime.rs   (route mimes vs. request → MimeNegotiation)
//!     → locale.rs (application locales vs. request → locale)
//!     → written into the RouteRecord before it is locked
//! ```
//!
//! # Design Decisions
//! - Forced values always win; an unsupported forced mime is reported as
//!   invalid instead of silently replaced
//! - Negotiation is pure: no request or route state is mutated here

pub mod accept;
pub mod locale;
pub mod mime;

pub use accept::{parse_quality_list, preferred_values, split_language_tags, QualityItem};
pub use locale::negotiate_locale;
pub use mime::{negotiate_mime_type, MimeNegotiation};
