//! Data Transfer Objects (DTOs) for the messaging wire protocol.
//!
//! - `websocket`: frame envelope and event payloads
//! - `conversion`: DTO → domain entity conversion

pub mod conversion;
pub mod websocket;

pub use conversion::DtoError;
