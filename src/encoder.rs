//! Reflective encoding of dynamic messages to canonical JSON.
//!
//! The encoder never looks at generated types. It walks the descriptor of
//! whatever message it is given, asks the instance which fields are
//! populated, and serializes each value according to its [`FieldKind`].
//! Output is driven through `serde`, so escaping and number formatting are
//! handled by `serde_json`.
//!
//! Messages from `google.protobuf` keep the special JSON forms
//! `prost_reflect` gives them (RFC 3339 timestamps, unwrapped wrappers).

use std::cmp::Ordering;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use prost_reflect::{DynamicMessage, FieldDescriptor, MapKey, ReflectMessage, SerializeOptions, Value};
use serde::ser::{self, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};
use crate::kind::{classify, declared_fields, Cardinality, FieldKind};

const WELL_KNOWN_PACKAGE: &str = "google.protobuf";

/// Knobs for [`encode`].
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Emit `int64`/`uint64` values as decimal strings instead of bare
    /// numbers, so JSON readers backed by doubles keep full precision.
    pub int64_as_string: bool,
    /// Also emit unset fields without presence tracking (proto3 scalars,
    /// repeated and map fields), using their default value.
    pub emit_default_fields: bool,
    /// Pretty-print the output.
    pub pretty: bool,
}

/// Encode a message instance as a JSON object.
///
/// Only populated fields are emitted, in declaration order, keyed by their
/// protobuf field name. The same instance always produces the same text.
pub fn encode(message: &DynamicMessage, options: &EncodeOptions) -> Result<String> {
    let view = MessageView::new(message, options);
    let encoded = if options.pretty {
        serde_json::to_string_pretty(&view)
    } else {
        serde_json::to_string(&view)
    };

    encoded.map_err(|err| Error::Encode {
        type_name: message.descriptor().full_name().to_string(),
        reason: err.to_string(),
    })
}

/// [`Serialize`] adapter over a dynamic message.
///
/// Usable with any serde serializer, not only `serde_json`.
#[derive(Debug, Clone, Copy)]
pub struct MessageView<'a> {
    message: &'a DynamicMessage,
    options: &'a EncodeOptions,
}

impl<'a> MessageView<'a> {
    pub fn new(message: &'a DynamicMessage, options: &'a EncodeOptions) -> Self {
        MessageView { message, options }
    }

    fn is_emitted(&self, field: &FieldDescriptor) -> bool {
        self.message.has_field(field)
            || (self.options.emit_default_fields && !field.supports_presence())
    }
}

impl Serialize for MessageView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let descriptor = self.message.descriptor();
        if descriptor.package_name() == WELL_KNOWN_PACKAGE {
            // Timestamp, Duration, wrappers, Struct and friends have special
            // JSON forms the decoder expects back.
            let options = SerializeOptions::new()
                .stringify_64_bit_integers(self.options.int64_as_string)
                .skip_default_fields(!self.options.emit_default_fields)
                .use_proto_field_name(true);
            return self.message.serialize_with_options(serializer, &options);
        }

        let mut map = serializer.serialize_map(None)?;

        for field in declared_fields(&descriptor) {
            if !self.is_emitted(&field) {
                continue;
            }

            let value = self.message.get_field(&field);
            let (kind, cardinality) = classify(&field);
            map.serialize_entry(
                field.name(),
                &FieldView {
                    kind: &kind,
                    cardinality: &cardinality,
                    value: &*value,
                    options: self.options,
                },
            )?;
        }

        map.end()
    }
}

struct FieldView<'a> {
    kind: &'a FieldKind,
    cardinality: &'a Cardinality,
    value: &'a Value,
    options: &'a EncodeOptions,
}

impl Serialize for FieldView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.cardinality {
            Cardinality::Singular => self.element(self.kind, self.value).serialize(serializer),
            Cardinality::Repeated => {
                let items = self
                    .value
                    .as_list()
                    .ok_or_else(|| mismatch::<S::Error>(self.kind, self.value))?;

                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&self.element(self.kind, item))?;
                }
                seq.end()
            }
            Cardinality::Map { value: value_kind, .. } => {
                let entries = self
                    .value
                    .as_map()
                    .ok_or_else(|| mismatch::<S::Error>(self.kind, self.value))?;

                // HashMap order is arbitrary; sort so output is stable.
                let mut entries: Vec<(&MapKey, &Value)> = entries.iter().collect();
                entries.sort_by(|(a, _), (b, _)| compare_map_keys(a, b));

                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(&map_key_to_string(key), &self.element(value_kind, value))?;
                }
                map.end()
            }
        }
    }
}

impl<'a> FieldView<'a> {
    fn element(&self, kind: &'a FieldKind, value: &'a Value) -> ValueView<'a> {
        ValueView {
            kind,
            value,
            options: self.options,
        }
    }
}

struct ValueView<'a> {
    kind: &'a FieldKind,
    value: &'a Value,
    options: &'a EncodeOptions,
}

impl Serialize for ValueView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let kind = self.kind;
        match kind {
            FieldKind::Bool => match self.value {
                Value::Bool(v) => serializer.serialize_bool(*v),
                other => Err(mismatch(kind, other)),
            },
            FieldKind::Int32 => match self.value {
                Value::I32(v) => serializer.serialize_i32(*v),
                other => Err(mismatch(kind, other)),
            },
            FieldKind::Uint32 => match self.value {
                Value::U32(v) => serializer.serialize_u32(*v),
                other => Err(mismatch(kind, other)),
            },
            FieldKind::Int64 => match self.value {
                Value::I64(v) if self.options.int64_as_string => serializer.collect_str(v),
                Value::I64(v) => serializer.serialize_i64(*v),
                other => Err(mismatch(kind, other)),
            },
            FieldKind::Uint64 => match self.value {
                Value::U64(v) if self.options.int64_as_string => serializer.collect_str(v),
                Value::U64(v) => serializer.serialize_u64(*v),
                other => Err(mismatch(kind, other)),
            },
            FieldKind::Float64 => match self.value {
                Value::F64(v) if v.is_finite() => serializer.serialize_f64(*v),
                Value::F64(v) => serializer.serialize_str(non_finite_name(*v)),
                other => Err(mismatch(kind, other)),
            },
            FieldKind::Float32 => match self.value {
                Value::F32(v) if v.is_finite() => serializer.serialize_f32(*v),
                Value::F32(v) => serializer.serialize_str(non_finite_name(f64::from(*v))),
                other => Err(mismatch(kind, other)),
            },
            FieldKind::String => match self.value {
                Value::String(v) => serializer.serialize_str(v),
                other => Err(mismatch(kind, other)),
            },
            FieldKind::Bytes => match self.value {
                Value::Bytes(v) => serializer.serialize_str(&BASE64.encode(v)),
                other => Err(mismatch(kind, other)),
            },
            FieldKind::Enum(desc) => match self.value {
                // Open enums may carry numbers without a declared name.
                Value::EnumNumber(number) => match desc.get_value(*number) {
                    Some(enum_value) => serializer.serialize_str(enum_value.name()),
                    None => serializer.serialize_i32(*number),
                },
                other => Err(mismatch(kind, other)),
            },
            FieldKind::Message(_) => match self.value {
                Value::Message(message) => MessageView::new(message, self.options).serialize(serializer),
                other => Err(mismatch(kind, other)),
            },
        }
    }
}

fn mismatch<E: ser::Error>(kind: &FieldKind, value: &Value) -> E {
    E::custom(format!("field of kind {kind} holds incompatible value {value:?}"))
}

fn non_finite_name(value: f64) -> &'static str {
    if value.is_nan() {
        "NaN"
    } else if value.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

fn map_key_to_string(key: &MapKey) -> String {
    match key {
        MapKey::Bool(v) => v.to_string(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(v) => v.clone(),
    }
}

// Keys of one map always share a variant.
fn compare_map_keys(a: &MapKey, b: &MapKey) -> Ordering {
    match (a, b) {
        (MapKey::Bool(a), MapKey::Bool(b)) => a.cmp(b),
        (MapKey::I32(a), MapKey::I32(b)) => a.cmp(b),
        (MapKey::I64(a), MapKey::I64(b)) => a.cmp(b),
        (MapKey::U32(a), MapKey::U32(b)) => a.cmp(b),
        (MapKey::U64(a), MapKey::U64(b)) => a.cmp(b),
        (MapKey::String(a), MapKey::String(b)) => a.cmp(b),
        _ => map_key_to_string(a).cmp(&map_key_to_string(b)),
    }
}
