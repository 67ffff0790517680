//! Infrastructure event bus implementations.
//!
//! The bus abstraction lives in `bizdesk-events`; this module adds the
//! Redis-backed transport for cross-process fan-out.

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisBusError, RedisPubSubEventBus};
