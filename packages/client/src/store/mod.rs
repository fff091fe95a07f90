//! Synchronization Store: reconciles the connection's event stream into
//! ordered, de-duplicated conversations, messages and typing state.

mod state;
mod sync_store;

pub use state::{StoreConfig, StoreSnapshot};
pub use sync_store::SyncStore;
