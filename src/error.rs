//! Error type shared by the registry, resolver and codecs.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while registering schemas or converting messages.
#[derive(Error, Debug)]
pub enum Error {
    /// The schema source text could not be parsed.
    #[error("could not parse schema '{filename}': {source}")]
    SchemaSyntax {
        /// Name the schema was registered under.
        filename: String,
        /// Parser diagnostic.
        #[source]
        source: Box<protox_parse::ParseError>,
    },

    /// An on-disk schema (or one of its imports) failed to compile.
    #[error("could not compile schema '{}': {source}", path.display())]
    SchemaCompile {
        /// Path handed to the compiler.
        path: PathBuf,
        /// Compiler diagnostic.
        #[source]
        source: Box<protox::Error>,
    },

    /// The parsed schema could not be linked into the descriptor pool
    /// (missing import, unresolved type name, conflicting definitions).
    #[error("could not link schema '{filename}': {source}")]
    SchemaLink {
        /// Name the schema was registered under.
        filename: String,
        /// Pool diagnostic.
        #[source]
        source: prost_reflect::DescriptorError,
    },

    /// A schema with this filename is already registered.
    #[error("schema '{filename}' is already registered")]
    DuplicateSchema {
        /// The colliding filename.
        filename: String,
    },

    /// No schema file with this name is registered.
    #[error("schema file '{filename}' not found")]
    FileNotFound {
        /// The requested filename.
        filename: String,
    },

    /// No message type with this qualified name is registered.
    #[error("could not find descriptor for message type '{type_name}'")]
    TypeNotFound {
        /// The requested qualified name.
        type_name: String,
    },

    /// An index path with no elements was supplied.
    #[error("empty index path for schema '{filename}'")]
    EmptyIndexPath {
        /// The file the path was resolved against.
        filename: String,
    },

    /// An element of an index path does not select an existing type.
    #[error("index out of range at position {position} of index path in schema '{filename}'")]
    IndexOutOfRange {
        /// The file the path was resolved against.
        filename: String,
        /// 1-based position of the failing element within the path.
        position: usize,
    },

    /// The binary payload does not match the wire format of the type.
    #[error("could not decode payload as '{type_name}': {source}")]
    PayloadDecode {
        /// Target message type.
        type_name: String,
        /// Wire codec diagnostic.
        #[source]
        source: prost::DecodeError,
    },

    /// The JSON text is not well formed.
    #[error("malformed JSON for '{type_name}' at line {line}, column {column}: {source}")]
    JsonSyntax {
        /// Target message type.
        type_name: String,
        /// 1-based line of the error.
        line: usize,
        /// 1-based column of the error.
        column: usize,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The JSON is well formed but does not fit the message type.
    #[error("JSON does not match message type '{type_name}': {source}")]
    SchemaMismatch {
        /// Target message type.
        type_name: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A message instance disagreed with its own descriptor while encoding.
    #[error("internal error encoding '{type_name}': {reason}")]
    Encode {
        /// Message type being encoded.
        type_name: String,
        /// What went wrong.
        reason: String,
    },

    /// A framed payload header is invalid.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        /// What went wrong.
        reason: String,
    },

    /// A record in a dump stream is truncated or invalid.
    #[error("malformed record: {reason}")]
    MalformedRecord {
        /// What went wrong.
        reason: String,
    },

    /// I/O error while reading a record stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for unknown file and unknown type errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FileNotFound { .. } | Error::TypeNotFound { .. })
    }

    /// Returns true when an index path could not be resolved.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Error::EmptyIndexPath { .. } | Error::IndexOutOfRange { .. }
        )
    }
}
