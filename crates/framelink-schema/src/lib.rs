//! JSON Schema validation of inbound message payloads.
//!
//! Payloads from the embedded peer are never trusted as typed on arrival.
//! The registry maps message names to compiled JSON Schema 2020-12 validators;
//! [`SchemaRegistry::builtin`] covers every guest→host message of the wire
//! catalog.

pub mod builtin;
pub mod config;
pub mod error;
pub mod registry;
pub mod validator;

pub use builtin::BUILTIN_SCHEMAS;
pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use registry::SchemaRegistry;
