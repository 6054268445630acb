//! Decoding of canonical JSON into dynamic messages.
//!
//! Field assignment follows the protobuf JSON mapping as implemented by
//! `prost_reflect`: fields match by proto name or JSON name, enums by name or
//! number, 64-bit integers may be numbers or strings and bytes are base64.
//! This module binds the target descriptor and sorts failures into malformed
//! JSON and JSON that does not fit the schema.

use prost_reflect::{DeserializeOptions, DynamicMessage, MessageDescriptor};
use serde_json::error::Category;

use crate::error::{Error, Result};

/// Knobs for [`decode`].
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Reject object keys that name no field of the target message.
    pub deny_unknown_fields: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            deny_unknown_fields: true,
        }
    }
}

/// Build a message instance of type `descriptor` from JSON text.
///
/// Anything after the top-level value other than whitespace is rejected.
pub fn decode(
    json: &str,
    descriptor: MessageDescriptor,
    options: &DecodeOptions,
) -> Result<DynamicMessage> {
    let type_name = descriptor.full_name().to_string();
    let reflect_options = DeserializeOptions::new().deny_unknown_fields(options.deny_unknown_fields);

    let mut deserializer = serde_json::Deserializer::from_str(json);
    DynamicMessage::deserialize_with_options(descriptor, &mut deserializer, &reflect_options)
        .and_then(|message| deserializer.end().map(|()| message))
        .map_err(|source| classify_error(type_name, source))
}

fn classify_error(type_name: String, source: serde_json::Error) -> Error {
    match source.classify() {
        Category::Data => Error::SchemaMismatch { type_name, source },
        Category::Syntax | Category::Eof | Category::Io => Error::JsonSyntax {
            type_name,
            line: source.line(),
            column: source.column(),
            source,
        },
    }
}
