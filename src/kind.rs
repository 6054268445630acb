//! Field kind taxonomy shared by the encoder, the decoder and schema outlines.
//!
//! Protobuf has more scalar wire types than JSON cares about. [`FieldKind`]
//! folds them into the set of value shapes the JSON mapping distinguishes;
//! every `match` over it is exhaustive, so a new kind has to be handled
//! everywhere before the crate builds again.

use std::fmt;

use prost_reflect::{EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor};

/// The value shape of a single protobuf field element.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Bool,
    /// `int32`, `sint32` and `sfixed32`.
    Int32,
    /// `uint32` and `fixed32`.
    Uint32,
    /// `int64`, `sint64` and `sfixed64`.
    Int64,
    /// `uint64` and `fixed64`.
    Uint64,
    Float64,
    Float32,
    String,
    Bytes,
    Enum(EnumDescriptor),
    /// Sub-messages and groups.
    Message(MessageDescriptor),
}

impl FieldKind {
    /// Short lowercase name, used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Int32 => "int32",
            FieldKind::Uint32 => "uint32",
            FieldKind::Int64 => "int64",
            FieldKind::Uint64 => "uint64",
            FieldKind::Float64 => "double",
            FieldKind::Float32 => "float",
            FieldKind::String => "string",
            FieldKind::Bytes => "bytes",
            FieldKind::Enum(_) => "enum",
            FieldKind::Message(_) => "message",
        }
    }
}

impl From<Kind> for FieldKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Bool => FieldKind::Bool,
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => FieldKind::Int32,
            Kind::Uint32 | Kind::Fixed32 => FieldKind::Uint32,
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => FieldKind::Int64,
            Kind::Uint64 | Kind::Fixed64 => FieldKind::Uint64,
            Kind::Double => FieldKind::Float64,
            Kind::Float => FieldKind::Float32,
            Kind::String => FieldKind::String,
            Kind::Bytes => FieldKind::Bytes,
            Kind::Enum(desc) => FieldKind::Enum(desc),
            Kind::Message(desc) => FieldKind::Message(desc),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Enum(desc) => write!(f, "enum {}", desc.full_name()),
            FieldKind::Message(desc) => write!(f, "message {}", desc.full_name()),
            other => f.write_str(other.name()),
        }
    }
}

/// Whether a field holds one value, a sequence, or a keyed map.
#[derive(Debug, Clone)]
pub enum Cardinality {
    Singular,
    Repeated,
    /// `map<K, V>`; on the wire a repeated synthetic entry message.
    Map { key: FieldKind, value: FieldKind },
}

impl Cardinality {
    pub fn label(&self) -> &'static str {
        match self {
            Cardinality::Singular => "singular",
            Cardinality::Repeated => "repeated",
            Cardinality::Map { .. } => "map",
        }
    }
}

/// Element kind and cardinality of a field descriptor.
///
/// For map fields the returned [`FieldKind`] is the synthetic entry message;
/// the key and value kinds live in [`Cardinality::Map`].
pub fn classify(field: &FieldDescriptor) -> (FieldKind, Cardinality) {
    let kind = field.kind();
    if field.is_map() {
        if let Kind::Message(entry) = &kind {
            let cardinality = Cardinality::Map {
                key: entry.map_entry_key_field().kind().into(),
                value: entry.map_entry_value_field().kind().into(),
            };
            return (kind.into(), cardinality);
        }
    }

    let cardinality = if field.is_list() {
        Cardinality::Repeated
    } else {
        Cardinality::Singular
    };
    (kind.into(), cardinality)
}

/// Fields of `message` in the order the schema declares them.
///
/// [`MessageDescriptor::fields`] yields them by field number instead.
pub fn declared_fields(message: &MessageDescriptor) -> impl Iterator<Item = FieldDescriptor> + '_ {
    message.descriptor_proto().field.iter().filter_map(move |field| {
        u32::try_from(field.number())
            .ok()
            .and_then(|number| message.get_field(number))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_reflect::DescriptorPool;

    fn message(source: &str) -> MessageDescriptor {
        let file = protox_parse::parse("kinds.proto", source).expect("schema should parse");
        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_proto(file).expect("schema should link");
        pool.get_message_by_name("Kinds").expect("Kinds should exist")
    }

    #[test]
    fn folds_wire_variants_into_json_shapes() {
        let desc = message(
            "syntax = \"proto3\"; message Kinds { sint32 a = 1; fixed64 b = 2; sfixed64 c = 3; float d = 4; }",
        );
        let names: Vec<&str> = desc.fields().map(|f| classify(&f).0.name()).collect();
        assert_eq!(names, vec!["int32", "uint64", "int64", "float"]);
    }

    #[test]
    fn declared_fields_keep_schema_order() {
        let desc = message("syntax = \"proto3\"; message Kinds { bool z = 9; bool a = 1; bool m = 5; }");
        let names: Vec<String> = declared_fields(&desc).map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn map_fields_carry_key_and_value_kinds() {
        let desc = message(
            "syntax = \"proto3\"; message Kinds { map<int64, Kinds> children = 1; repeated bytes blobs = 2; }",
        );

        let children = desc.get_field_by_name("children").unwrap();
        match classify(&children) {
            (FieldKind::Message(entry), Cardinality::Map { key, value }) => {
                assert!(entry.is_map_entry());
                assert!(matches!(key, FieldKind::Int64));
                assert_eq!(value.to_string(), "message Kinds");
            }
            other => panic!("unexpected classification {other:?}"),
        }

        let blobs = desc.get_field_by_name("blobs").unwrap();
        let (kind, cardinality) = classify(&blobs);
        assert!(matches!(kind, FieldKind::Bytes));
        assert_eq!(cardinality.label(), "repeated");
    }
}
