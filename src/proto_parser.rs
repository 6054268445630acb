//! Front end for `.proto` sources: text parsing, on-disk compilation and
//! human-oriented outlines of compiled message types.

use std::path::{Path, PathBuf};

use prost_reflect::{FieldDescriptor, Kind, MessageDescriptor};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use protox::Compiler;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::kind::{classify, declared_fields, Cardinality};

#[derive(Debug, Clone, Serialize)]
pub struct ProtoField {
    pub name: String,
    pub proto_type: String,
    pub field_number: u32,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtoMessage {
    pub name: String,
    pub full_name: String,
    pub fields: Vec<ProtoField>,
    pub nested_messages: Vec<ProtoMessage>,
}

/// Parse schema source text into a descriptor proto named `filename`.
///
/// Only syntax is checked here; imports and type references are resolved
/// when the result is added to a descriptor pool.
pub fn parse_schema_source(filename: &str, source: &str) -> Result<FileDescriptorProto> {
    protox_parse::parse(filename, source).map_err(|source| Error::SchemaSyntax {
        filename: filename.to_string(),
        source: Box::new(source),
    })
}

/// Compile a schema file from disk together with everything it imports.
///
/// The file's parent directory is searched first, then `include_dirs`.
/// Returns the name the file is known by inside the set (its file name)
/// and the compiled set, imports first.
pub fn compile_schema_file(
    proto_path: &Path,
    include_dirs: &[PathBuf],
) -> Result<(String, FileDescriptorSet)> {
    let compile_err = |source: protox::Error| Error::SchemaCompile {
        path: proto_path.to_path_buf(),
        source: Box::new(source),
    };

    let virtual_name = proto_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("schema.proto")
        .to_string();
    let include_dir = proto_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut include_paths = vec![include_dir.to_path_buf()];
    include_paths.extend(include_dirs.iter().cloned());

    let mut compiler = Compiler::new(include_paths).map_err(compile_err)?;
    compiler
        .include_imports(true)
        .open_files([virtual_name.as_str()])
        .map_err(compile_err)?;

    Ok((virtual_name, compiler.file_descriptor_set()))
}

/// Build an outline of a message type and its nested types.
pub fn describe_message(message: &MessageDescriptor) -> ProtoMessage {
    let fields = declared_fields(message).map(|field| convert_field(&field)).collect();
    let nested_messages = message
        .child_messages()
        .filter(|child| !child.is_map_entry())
        .map(|child| describe_message(&child))
        .collect();

    ProtoMessage {
        name: message.name().to_string(),
        full_name: message.full_name().to_string(),
        fields,
        nested_messages,
    }
}

fn convert_field(field: &FieldDescriptor) -> ProtoField {
    let (_, cardinality) = classify(field);
    let proto_type = match (&cardinality, field.kind()) {
        (Cardinality::Map { .. }, Kind::Message(entry)) => format!(
            "map<{}, {}>",
            kind_to_proto_type(entry.map_entry_key_field().kind()),
            kind_to_proto_type(entry.map_entry_value_field().kind())
        ),
        (_, kind) => kind_to_proto_type(kind),
    };

    ProtoField {
        name: field.name().to_string(),
        proto_type,
        field_number: field.number(),
        label: cardinality.label(),
    }
}

fn kind_to_proto_type(kind: Kind) -> String {
    match kind {
        Kind::Double => "double".to_string(),
        Kind::Float => "float".to_string(),
        Kind::Int32 => "int32".to_string(),
        Kind::Int64 => "int64".to_string(),
        Kind::Uint32 => "uint32".to_string(),
        Kind::Uint64 => "uint64".to_string(),
        Kind::Sint32 => "sint32".to_string(),
        Kind::Sint64 => "sint64".to_string(),
        Kind::Fixed32 => "fixed32".to_string(),
        Kind::Fixed64 => "fixed64".to_string(),
        Kind::Sfixed32 => "sfixed32".to_string(),
        Kind::Sfixed64 => "sfixed64".to_string(),
        Kind::Bool => "bool".to_string(),
        Kind::String => "string".to_string(),
        Kind::Bytes => "bytes".to_string(),
        Kind::Message(msg) => msg.full_name().to_string(),
        Kind::Enum(enum_desc) => enum_desc.full_name().to_string(),
    }
}
