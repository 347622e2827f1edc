//! Primary Router Authority (C3): spec §4.3.

pub mod authority;
pub mod registration;

pub use authority::{PrimaryRouterAuthority, DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_WINDOW_MS};
pub use registration::{AssetRegistration, AuthorityDecision};
