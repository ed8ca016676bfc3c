//! Live change notification for single feedback records.

pub mod bridge;
pub mod registry;

pub use bridge::{
    ChangeEvent, ChangeStream, ChangeSubscriptionBridge, CloseReason, DEFAULT_STREAM_BUFFER,
    StreamFrame,
};
pub use registry::{ActiveSubscription, ConnectionRegistry, SubscriptionLease};
