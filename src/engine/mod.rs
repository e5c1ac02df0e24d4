//! The federated backfill engine: given a room and a point in its DAG,
//! decides which remote servers to ask, recovers state incrementally, and
//! persists whatever it learns together with state snapshots.

pub mod missing_events;
pub mod orchestrator;
pub mod persist;
pub mod requester;
pub mod selector;
pub mod state_tracker;

pub use missing_events::Ratelimiter;
pub use orchestrator::{BackfillEngine, BackfillRequest, BackfillResponse};
pub use requester::Requester;
