//! Framed payloads as written by schema-registry aware producers.
//!
//! Layout:
//!
//! ```text
//! +-------+----------------+---------------------------+---------+
//! | 0x00  | schema id (BE) | message index array       | payload |
//! | 1 b   | 4 bytes        | zigzag varint count, then |         |
//! |       |                | zigzag varint indexes     |         |
//! +-------+----------------+---------------------------+---------+
//! ```
//!
//! A count of zero is shorthand for the index path `[0]`, the first
//! top-level message of the schema.

use nom::{
    error::{Error as NomError, ErrorKind},
    number::complete::be_u32,
    IResult,
};
use tracing::debug;

use crate::codec;
use crate::encoder::{self, EncodeOptions};
use crate::error::{Error, Result};
use crate::registry::SchemaRegistry;

pub const MAGIC_BYTE: u8 = 0;

const MAX_MESSAGE_INDEXES: i64 = 100_000;

/// A parsed framed payload borrowing its body from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub schema_id: u32,
    /// Index path of the message type within the schema.
    pub message_indexes: Vec<i32>,
    pub payload: &'a [u8],
}

impl Envelope<'_> {
    /// Write the envelope back out, using the short form for `[0]`.
    ///
    /// An empty index path is written as the short form too, so it parses
    /// back as `[0]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.payload.len() + 6);
        result.push(MAGIC_BYTE);
        result.extend_from_slice(&self.schema_id.to_be_bytes());

        if self.message_indexes.is_empty() || self.message_indexes == [0] {
            write_varint(&mut result, zigzag_encode(0));
        } else {
            write_varint(&mut result, zigzag_encode(self.message_indexes.len() as i64));
            for &index in &self.message_indexes {
                write_varint(&mut result, zigzag_encode(i64::from(index)));
            }
        }

        result.extend_from_slice(self.payload);
        result
    }
}

/// Split a framed payload into its header fields and protobuf body.
pub fn parse_envelope(input: &[u8]) -> Result<Envelope<'_>> {
    match input.first() {
        None => {
            return Err(Error::MalformedEnvelope {
                reason: "empty input".to_string(),
            })
        }
        Some(&magic) if magic != MAGIC_BYTE => {
            return Err(Error::MalformedEnvelope {
                reason: format!("incorrect magic byte ({magic})"),
            })
        }
        Some(_) => {}
    }

    let (_, envelope) = parse_header(&input[1..]).map_err(|err| Error::MalformedEnvelope {
        reason: describe_nom_error(&err),
    })?;
    Ok(envelope)
}

/// Decode a framed payload whose schema is `filename` in `registry`.
pub fn framed_payload_to_json(
    registry: &SchemaRegistry,
    filename: &str,
    input: &[u8],
    options: &EncodeOptions,
) -> Result<String> {
    let envelope = parse_envelope(input)?;
    envelope_to_json(registry, filename, &envelope, options)
}

/// Decode an already parsed envelope whose schema is `filename` in `registry`.
pub fn envelope_to_json(
    registry: &SchemaRegistry,
    filename: &str,
    envelope: &Envelope<'_>,
    options: &EncodeOptions,
) -> Result<String> {
    let descriptor = registry.find_type_by_path(filename, &envelope.message_indexes)?;

    debug!(
        schema_id = envelope.schema_id,
        type_name = descriptor.full_name(),
        "decoding framed payload"
    );
    let message = codec::decode_payload(descriptor, envelope.payload)?;
    encoder::encode(&message, options)
}

fn parse_header(input: &[u8]) -> IResult<&[u8], Envelope<'_>> {
    let (input, schema_id) = be_u32(input)?;
    let (payload, message_indexes) = parse_index_array(input)?;
    let rest: &[u8] = &[];
    Ok((
        rest,
        Envelope {
            schema_id,
            message_indexes,
            payload,
        },
    ))
}

fn parse_index_array(input: &[u8]) -> IResult<&[u8], Vec<i32>> {
    let (mut input, count) = parse_zigzag(input)?;
    if !(0..=MAX_MESSAGE_INDEXES).contains(&count) {
        return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify)));
    }
    if count == 0 {
        return Ok((input, vec![0]));
    }

    let mut indexes = Vec::with_capacity((count as usize).min(input.len()));
    for _ in 0..count {
        let (rest, index) = parse_zigzag(input)?;
        let index = i32::try_from(index)
            .map_err(|_| nom::Err::Failure(NomError::new(input, ErrorKind::TooLarge)))?;
        indexes.push(index);
        input = rest;
    }
    Ok((input, indexes))
}

fn parse_zigzag(input: &[u8]) -> IResult<&[u8], i64> {
    let (input, raw) = parse_varint(input)?;
    Ok((input, ((raw >> 1) as i64) ^ -((raw & 1) as i64)))
}

fn parse_varint(input: &[u8]) -> IResult<&[u8], u64> {
    let mut res: u64 = 0;
    let mut shift = 0;

    // Max 10 bytes for 64-bit varint
    for (i, byte) in input.iter().enumerate().take(10) {
        res |= ((*byte & 0x7F) as u64) << shift;
        shift += 7;
        if (byte & 0x80) == 0 {
            return Ok((&input[i + 1..], res));
        }
    }

    let kind = if input.len() < 10 {
        ErrorKind::Eof
    } else {
        ErrorKind::TooLarge
    };
    Err(nom::Err::Error(NomError::new(input, kind)))
}

fn describe_nom_error(err: &nom::Err<NomError<&[u8]>>) -> String {
    match err {
        nom::Err::Incomplete(_) => "truncated header".to_string(),
        nom::Err::Error(inner) | nom::Err::Failure(inner) => match inner.code {
            ErrorKind::Eof => "truncated header".to_string(),
            ErrorKind::Verify => "invalid message index array length".to_string(),
            ErrorKind::TooLarge => "varint out of range in message index array".to_string(),
            other => format!("unexpected parse failure ({other:?})"),
        },
    }
}

fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn write_varint(result: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        result.push((value as u8) | 0x80);
        value >>= 7;
    }
    result.push(value as u8);
}
