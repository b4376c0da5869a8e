//! Database manifest and job descriptor persistence

use crate::{paths, read_all, write_all, StorageBackend, StorageError, StorageResult};
use tracing::info;
use videogrid_common::{DatabaseMetadata, JobDescriptor};

/// Load the database manifest; a fresh store yields an empty manifest
pub fn read_database_metadata(storage: &dyn StorageBackend) -> StorageResult<DatabaseMetadata> {
    match read_all(storage, &paths::database_metadata_path()) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(StorageError::NotFound(_)) => Ok(DatabaseMetadata::new()),
        Err(e) => Err(e),
    }
}

pub fn write_database_metadata(
    storage: &dyn StorageBackend,
    meta: &DatabaseMetadata,
) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(meta)?;
    write_all(storage, &paths::database_metadata_path(), &bytes)
}

pub fn write_job_descriptor(
    storage: &dyn StorageBackend,
    descriptor: &JobDescriptor,
) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(descriptor)?;
    write_all(storage, &paths::job_descriptor_path(descriptor.id), &bytes)?;
    info!(job_id = descriptor.id, name = %descriptor.name, "wrote job descriptor");
    Ok(())
}
