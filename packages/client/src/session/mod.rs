//! Session Binding: connects and disconnects in lockstep with sign-in state.

mod binding;

pub use binding::{SessionBinding, SessionState};
