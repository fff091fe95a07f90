//! Infrastructure: wire DTOs and the transport that carries them.

pub mod dto;
pub mod transport;
