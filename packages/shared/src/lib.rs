//! Utilities shared by the chatsync packages: logging setup and display-time helpers.

pub mod logger;
pub mod time;
