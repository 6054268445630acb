//! Binary payload <-> JSON conversion against a registry.
//!
//! These are the operations a host process calls: look a type up by name,
//! run the wire codec, and hand the instance to the reflective encoder or
//! decoder.

use prost::Message as _;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use tracing::debug;

use crate::decoder::{self, DecodeOptions};
use crate::encoder::{self, EncodeOptions};
use crate::error::{Error, Result};
use crate::registry::SchemaRegistry;

/// Convert a protobuf payload to JSON for a given message type.
pub fn payload_to_json(registry: &SchemaRegistry, type_name: &str, payload: &[u8]) -> Result<String> {
    payload_to_json_with_options(registry, type_name, payload, &EncodeOptions::default())
}

/// Convert a protobuf payload to JSON with explicit encoder options.
pub fn payload_to_json_with_options(
    registry: &SchemaRegistry,
    type_name: &str,
    payload: &[u8],
    options: &EncodeOptions,
) -> Result<String> {
    let descriptor = registry.find_type(type_name)?;
    let message = decode_payload(descriptor, payload)?;
    let json = encoder::encode(&message, options)?;

    debug!(type_name, payload_len = payload.len(), json_len = json.len(), "payload converted to JSON");
    Ok(json)
}

/// Encode JSON to protobuf wire format for a given message type.
pub fn json_to_payload(registry: &SchemaRegistry, type_name: &str, json: &str) -> Result<Vec<u8>> {
    json_to_payload_with_options(registry, type_name, json, &DecodeOptions::default())
}

/// Encode JSON to protobuf wire format with explicit decoder options.
pub fn json_to_payload_with_options(
    registry: &SchemaRegistry,
    type_name: &str,
    json: &str,
    options: &DecodeOptions,
) -> Result<Vec<u8>> {
    let descriptor = registry.find_type(type_name)?;
    let message = decoder::decode(json, descriptor, options)?;
    let payload = encode_message(&message);

    debug!(type_name, json_len = json.len(), payload_len = payload.len(), "JSON converted to payload");
    Ok(payload)
}

/// Parse a wire-format payload into a message instance of `descriptor`.
pub fn decode_payload(descriptor: MessageDescriptor, payload: &[u8]) -> Result<DynamicMessage> {
    let type_name = descriptor.full_name().to_string();
    DynamicMessage::decode(descriptor, payload)
        .map_err(|source| Error::PayloadDecode { type_name, source })
}

/// Serialize a message instance to wire format.
pub fn encode_message(message: &DynamicMessage) -> Vec<u8> {
    message.encode_to_vec()
}
