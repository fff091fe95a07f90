//! Connection Manager: single transport link, lifecycle with backoff, and the
//! typed event bus that decouples transport events from consumers.

pub mod backoff;
pub mod bus;
pub mod event;
pub mod manager;

pub use bus::{EventBus, Subscription};
pub use event::{ConnectionEvent, EventKind};
pub use manager::{ConnectionConfig, ConnectionManager, ConnectionState};
