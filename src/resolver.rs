//! Resolution of nested message types by structural index path.
//!
//! Framing formats and schema tooling often refer to a message type by its
//! position in the file instead of by name: `[1]` is the second top-level
//! message, `[1, 0]` the first type nested inside it, and so on.

use prost_reflect::MessageDescriptor;
use tracing::trace;

use crate::error::{Error, Result};
use crate::registry::SchemaRegistry;

impl SchemaRegistry {
    /// Resolve an index path within `filename` to a fully qualified type name.
    ///
    /// Positions follow declaration order, including the synthetic entry
    /// types generated for `map<K, V>` fields. A failing element is reported
    /// by its 1-based position within `indices`.
    pub fn resolve_by_path(&self, filename: &str, indices: &[i32]) -> Result<String> {
        self.find_type_by_path(filename, indices)
            .map(|message| message.full_name().to_string())
    }

    /// Resolve an index path straight to its descriptor.
    pub fn find_type_by_path(&self, filename: &str, indices: &[i32]) -> Result<MessageDescriptor> {
        let file = self.find_file(filename)?;
        let (&first, rest) = indices.split_first().ok_or_else(|| Error::EmptyIndexPath {
            filename: filename.to_string(),
        })?;

        let mut current = select(file.messages(), first, 1, filename)?;
        for (offset, &index) in rest.iter().enumerate() {
            current = select(current.child_messages(), index, offset + 2, filename)?;
        }
        Ok(current)
    }
}

fn select(
    mut candidates: impl Iterator<Item = MessageDescriptor>,
    index: i32,
    position: usize,
    filename: &str,
) -> Result<MessageDescriptor> {
    let selected = usize::try_from(index)
        .ok()
        .and_then(|index| candidates.nth(index))
        .ok_or_else(|| Error::IndexOutOfRange {
            filename: filename.to_string(),
            position,
        })?;

    trace!(position, index, type_name = selected.full_name(), "resolved path element");
    Ok(selected)
}
