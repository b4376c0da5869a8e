//! Well-known paths of the on-store layout

/// The database manifest listing committed jobs
#[must_use]
pub fn database_metadata_path() -> String {
    "db_metadata.json".to_string()
}

/// Descriptor of a committed job
#[must_use]
pub fn job_descriptor_path(job_id: i32) -> String {
    format!("jobs/{job_id}/descriptor.json")
}

/// Per-node profiler artifact of a job
#[must_use]
pub fn job_profiler_path(job_id: i32, node_id: i32) -> String {
    format!("jobs/{job_id}/profile_{node_id}.bin")
}

/// Input column blob of an upstream table
#[must_use]
pub fn table_column_path(job_id: i32, table_id: i32, column_id: i32) -> String {
    format!("jobs/{job_id}/tables/{table_id}/columns/{column_id}.bin")
}

/// Output blob holding all columns of one I/O item
#[must_use]
pub fn output_item_path(job_id: i32, table_id: i32, item_id: i64) -> String {
    format!("jobs/{job_id}/output/{table_id}/items/{item_id}.bin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_stable() {
        assert_eq!(database_metadata_path(), "db_metadata.json");
        assert_eq!(job_descriptor_path(7), "jobs/7/descriptor.json");
        assert_eq!(job_profiler_path(7, 2), "jobs/7/profile_2.bin");
        assert_eq!(table_column_path(0, 3, 1), "jobs/0/tables/3/columns/1.bin");
        assert_eq!(output_item_path(7, 0, 12), "jobs/7/output/0/items/12.bin");
    }
}
