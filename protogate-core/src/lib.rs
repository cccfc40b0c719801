//! Core status types for protogate.
//!
//! This crate provides the types shared by the request pipeline and the
//! transport adapters (`protogate`).
//!
//! ## Modules
//!
//! - [`Code`]: The status table and its transport-code lookup
//! - [`RpcError`]: The tagged error value returned by implementations
//! - [`wrap_envelope`] / [`unwrap_envelope`]: Length-prefixed framing for the binary transport

mod envelope;
mod error;
mod status;

pub use envelope::*;
pub use error::*;
pub use status::*;
