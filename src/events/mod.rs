//! Typed publish/subscribe
//!
//! Managers publish into an [`EventBus`]; consumers hold a [`Subscription`].
//! Each subscriber owns an unbounded queue, so publishing never waits on a
//! slow consumer and every subscriber sees events in publish order.

mod bus;

pub use bus::{EventBus, Subscription, SubscriptionId};
