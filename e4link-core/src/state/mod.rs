pub mod link;
mod pending;

pub use link::LinkPhase;
pub use pending::{PendingKey, PendingRequests, TrackedRequest};
