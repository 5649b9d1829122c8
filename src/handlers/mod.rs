//! # Backend handlers: schema, registry and discovery.
//!
//! A handler is the self-description of one backend script: the protocol
//! name it implements, the parameters it accepts and a couple of capability
//! flags. Handlers are discovered once at startup and never change afterwards.
//!
//! - [`ParamType`], [`Param`] - declared parameter schema
//! - [`Handler`], [`HandlerFlags`] - immutable handler record
//! - [`HandlerRegistry`] - name → handler lookup, owned by the daemon
//! - [`JsonStreamDecoder`] - resumable decoder for script self-descriptions
//! - [`discover`] / [`discover_script`] - run scripts in introspection mode

mod decoder;
mod discovery;
mod registry;
mod schema;

pub use decoder::{Decoded, JsonStreamDecoder};
pub use discovery::{discover, discover_script, register_descriptor};
pub use registry::{Handler, HandlerFlags, HandlerRegistry};
pub use schema::{Param, ParamType};

pub(crate) use schema::validate_config;
