//! # Business Event Delivery
//!
//! Domain events, their route table, and the dispatcher that forwards them to
//! the external automation target. Events are fire-and-forget: delivered
//! within the current call or dropped.

pub mod dispatcher;
pub mod routes;
pub mod types;

pub use dispatcher::EventDispatcher;
pub use routes::{RouteTable, TriggerRoute};
pub use types::{Event, EventIdentity};
