//! Router Core (C7): lifecycle, peer roster, inter-router message dispatch,
//! periodic tasks, and a minimal admin HTTP surface. Spec §4.7.

pub mod admin;
pub mod dispatch;
pub mod envelope;
pub mod roster;
pub mod router;

pub use admin::{build_router as build_admin_router, start_admin_server, AdminState};
pub use envelope::{parse_verifying_key, MessageType, RouterMessage};
pub use roster::{PeerRoster, RouterInfo, RouterStatus};
pub use router::{RouterConfig, RouterCore};
