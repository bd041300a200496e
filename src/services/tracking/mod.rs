//! Per-user tracking state and its durable backends.

mod backend;
mod registry;
mod store;

pub use backend::TrackingBackend;
#[cfg(test)]
pub use backend::MockTrackingBackend;
pub use registry::{StoreRegistry, DEFAULT_STORE_CAPACITY};
pub use store::{Outcome, TrackingStore};
