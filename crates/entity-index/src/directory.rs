//! Index storage provisioning.
//!
//! Chooses between an ephemeral in-RAM index and an on-disk index under
//! `<index_path>/<kind>_<version>`.

use std::path::{Path, PathBuf};

use tantivy::Index;
use tracing::{debug, info};

use entity_types::IndexSettings;

use crate::error::IndexError;
use crate::schema::IndexSchema;

/// Where an opened index keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLocation {
    InMemory,
    OnDisk(PathBuf),
}

impl IndexLocation {
    pub fn path(&self) -> Option<&Path> {
        match self {
            IndexLocation::InMemory => None,
            IndexLocation::OnDisk(path) => Some(path),
        }
    }
}

/// Directory for one version of one entity kind.
pub fn index_dir<E>(base: &Path, schema: &IndexSchema<E>) -> PathBuf {
    base.join(schema.directory_name())
}

/// Open the index backing `schema`, creating it if absent.
pub fn open_index<E>(
    schema: &IndexSchema<E>,
    settings: &IndexSettings,
) -> Result<(Index, IndexLocation), IndexError> {
    if settings.in_memory {
        debug!(kind = schema.name(), version = schema.version(), "Creating in-memory index");
        let index = Index::create_in_ram(schema.to_tantivy());
        return Ok((index, IndexLocation::InMemory));
    }

    let path = index_dir(&settings.expanded_index_path(), schema);
    let index = open_or_create_index(&path, schema)?;
    Ok((index, IndexLocation::OnDisk(path)))
}

/// Open an existing on-disk index or create a new one.
///
/// Uses MmapDirectory for persistence. An existing index must have the
/// same layout as `schema`.
pub fn open_or_create_index<E>(path: &Path, schema: &IndexSchema<E>) -> Result<Index, IndexError> {
    if path.join("meta.json").exists() {
        debug!(path = ?path, "Opening existing index");
        let index = Index::open_in_dir(path)?;
        schema.check_compatible(&index.schema())?;
        Ok(index)
    } else {
        info!(path = ?path, kind = schema.name(), version = schema.version(), "Creating new index");
        std::fs::create_dir_all(path)?;
        let index = Index::create_in_dir(path, schema.to_tantivy())?;
        Ok(index)
    }
}
