//! Edge routing off the editing thread.
//!
//! The editor keeps its own graph; a worker thread keeps a mirror of it,
//! fed with [`protocol::RouterRequest`] messages, and answers with routed
//! link vertices. [`bridge::RoutingBridge`] is the editor side of that
//! conversation.

pub mod bridge;
pub mod protocol;
pub mod router;
pub mod worker;

pub use bridge::RoutingBridge;
pub use protocol::{RouterRequest, RouterResponse};
pub use router::{OrthogonalRouter, RouterOptions, calculate_lane_offset};
pub use worker::RoutingWorker;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Routing worker is not running")]
    Disconnected,
    #[error("No routing result within {0:?}")]
    Timeout(std::time::Duration),
    #[error("Failed to start routing worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Routing worker panicked")]
    Panicked,
    #[error("Malformed router message: {0}")]
    Json(#[from] serde_json::Error),
}
