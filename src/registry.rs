//! Instance-owned registry of protobuf schemas.
//!
//! A [`SchemaRegistry`] owns a [`DescriptorPool`] together with an index of
//! every message type it declares, keyed by fully qualified name. Schemas are
//! only ever added: descriptors handed out earlier and nested-type index
//! paths stay valid for the lifetime of the registry.
//!
//! # Concurrency
//!
//! Registration takes `&mut self`, every lookup and conversion takes `&self`.
//! A registry that keeps receiving schemas while other threads convert
//! messages has to be shared behind a lock (for example
//! `Arc<RwLock<SchemaRegistry>>`); a registry that is fully populated up
//! front can be shared as a plain `Arc<SchemaRegistry>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use prost_reflect::{DescriptorPool, FileDescriptor, MessageDescriptor};
use prost_types::FileDescriptorProto;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::proto_parser;

#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    pool: DescriptorPool,
    // Registration order.
    files: Vec<String>,
    types: BTreeMap<String, MessageDescriptor>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        SchemaRegistry {
            pool: DescriptorPool::new(),
            files: Vec::new(),
            types: BTreeMap::new(),
        }
    }

    /// Parse `source` and register it under `filename`.
    ///
    /// A blank `filename` is replaced by a generated `anonymous_<n>.proto`
    /// name. Files imported by `source` must already be registered. On any
    /// error the registry is left exactly as it was.
    pub fn add_schema(&mut self, filename: &str, source: &str) -> Result<FileDescriptor> {
        let filename = self.normalize_filename(filename);
        if self.pool.get_file_by_name(&filename).is_some() {
            return Err(Error::DuplicateSchema { filename });
        }

        let file_proto = match proto_parser::parse_schema_source(&filename, source) {
            Ok(file_proto) => file_proto,
            Err(err) => {
                warn!(%filename, error = %err, "rejected schema source");
                return Err(err);
            }
        };

        self.pool
            .add_file_descriptor_proto(file_proto)
            .map_err(|source| Error::SchemaLink {
                filename: filename.clone(),
                source,
            })?;

        self.index_file(&filename)
    }

    /// Compile a schema file from disk and register it along with any of its
    /// imports that are not registered yet.
    ///
    /// Imports are looked up next to the file first, then in `include_dirs`;
    /// the well-known `google/protobuf/*.proto` files are always available.
    pub fn add_schema_file(
        &mut self,
        proto_path: impl AsRef<Path>,
        include_dirs: &[PathBuf],
    ) -> Result<FileDescriptor> {
        let (filename, set) = proto_parser::compile_schema_file(proto_path.as_ref(), include_dirs)?;
        if self.pool.get_file_by_name(&filename).is_some() {
            return Err(Error::DuplicateSchema { filename });
        }

        let new_files: Vec<FileDescriptorProto> = set
            .file
            .into_iter()
            .filter(|file| self.pool.get_file_by_name(file.name()).is_none())
            .collect();
        let new_names: Vec<String> = new_files.iter().map(|file| file.name().to_string()).collect();

        self.pool
            .add_file_descriptor_protos(new_files)
            .map_err(|source| Error::SchemaLink {
                filename: filename.clone(),
                source,
            })?;

        for name in &new_names {
            self.index_file(name)?;
        }
        self.find_file(&filename)
    }

    /// Look up a message type by fully qualified name (`package.Outer.Inner`).
    pub fn find_type(&self, qualified_name: &str) -> Result<MessageDescriptor> {
        let name = qualified_name.strip_prefix('.').unwrap_or(qualified_name);
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TypeNotFound {
                type_name: qualified_name.to_string(),
            })
    }

    /// Look up a registered schema file by name.
    pub fn find_file(&self, filename: &str) -> Result<FileDescriptor> {
        self.pool
            .get_file_by_name(filename)
            .ok_or_else(|| Error::FileNotFound {
                filename: filename.to_string(),
            })
    }

    pub fn contains_type(&self, qualified_name: &str) -> bool {
        self.find_type(qualified_name).is_ok()
    }

    /// Qualified names of all registered message types, sorted.
    pub fn type_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.types.keys().map(String::as_str)
    }

    /// Registered file names in registration order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.files.iter().map(String::as_str)
    }

    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.pool
    }

    fn normalize_filename(&self, filename: &str) -> String {
        let trimmed = filename.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }

        let mut n = self.files.len();
        loop {
            let candidate = format!("anonymous_{n}.proto");
            if self.pool.get_file_by_name(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    fn index_file(&mut self, filename: &str) -> Result<FileDescriptor> {
        let file = self.find_file(filename)?;

        // Helper to register messages recursively (supporting nested definitions)
        fn register_recursive(msg: MessageDescriptor, reg: &mut BTreeMap<String, MessageDescriptor>) {
            for nested in msg.child_messages() {
                if !nested.is_map_entry() {
                    register_recursive(nested, reg);
                }
            }
            reg.insert(msg.full_name().to_string(), msg);
        }

        let before = self.types.len();
        for message in file.messages() {
            register_recursive(message, &mut self.types);
        }
        self.files.push(filename.to_string());

        debug!(
            filename,
            package = file.package_name(),
            types = self.types.len() - before,
            "registered schema"
        );
        Ok(file)
    }
}
