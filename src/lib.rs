//! Runtime protobuf schemas and reflective JSON conversion.
//!
//! This crate provides:
//! - An instance-owned schema registry built from `.proto` source text or files (`registry`)
//! - Nested type lookup by structural index path (`resolver`)
//! - Generic message -> JSON encoding driven only by descriptors (`encoder`)
//! - JSON -> message decoding with classified errors (`decoder`)
//! - Payload <-> JSON conversion by type name (`codec`)
//! - Framed payloads and topic dump streams (`framing`, `dump`)
//!
//! # Usage
//!
//! ```no_run
//! use dynaproto::{codec, SchemaRegistry};
//!
//! # fn main() -> Result<(), dynaproto::Error> {
//! let mut registry = SchemaRegistry::new();
//! registry.add_schema(
//!     "point.proto",
//!     r#"syntax = "proto3"; message Point { int32 x = 1; int32 y = 2; }"#,
//! )?;
//!
//! let payload = codec::json_to_payload(&registry, "Point", r#"{"x":3,"y":4}"#)?;
//! let json = codec::payload_to_json(&registry, "Point", &payload)?;
//! assert_eq!(json, r#"{"x":3,"y":4}"#);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod decoder;
pub mod dump;
pub mod encoder;
pub mod error;
pub mod framing;
pub mod kind;
pub mod proto_parser;
pub mod registry;
pub mod resolver;

// Re-export commonly used types
pub use codec::{json_to_payload, payload_to_json};
pub use decoder::DecodeOptions;
pub use encoder::EncodeOptions;
pub use error::{Error, Result};
pub use kind::{Cardinality, FieldKind};
pub use proto_parser::{ProtoField, ProtoMessage};
pub use registry::SchemaRegistry;

pub use prost_reflect;
