//! Work units flowing through the planner and pipeline

use std::ops::Range;
use videogrid_common::Device;

/// A contiguous row slice of one task; the unit of work the master hands out.
/// `item_id` restarts at 0 within each task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoItem {
    pub table_id: i32,
    pub item_id: i64,
    pub start_row: i64,
    pub end_row: i64,
}

/// Row list one sample contributes to an I/O item, warmup prefix included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRows {
    pub job_id: i32,
    pub table_id: i32,
    pub column_ids: Vec<i32>,
    pub rows: Vec<i64>,
}

/// Everything the load stage must fetch to materialise one I/O item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWorkEntry {
    pub io_item_index: usize,
    pub samples: Vec<SampleRows>,
}

/// A named column of in-flight row payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBuffer {
    pub name: String,
    pub rows: Vec<Vec<u8>>,
}

/// Payload handed between the evaluation stages; owned by exactly one stage
/// at a time, ownership transferring via queue pop
#[derive(Debug)]
pub struct EvalWorkEntry {
    pub io_item_index: usize,
    /// Device the entry's buffers are staged on
    pub device: Device,
    pub columns: Vec<ColumnBuffer>,
}

/// Rows held by a column set; columns are kept row-aligned by construction
pub(crate) fn row_count(columns: &[ColumnBuffer]) -> usize {
    columns.first().map_or(0, |c| c.rows.len())
}

/// Copy one row window out of every column
pub(crate) fn slice_rows(columns: &[ColumnBuffer], range: Range<usize>) -> Vec<ColumnBuffer> {
    columns
        .iter()
        .map(|c| ColumnBuffer {
            name: c.name.clone(),
            rows: c.rows[range.clone()].to_vec(),
        })
        .collect()
}

/// Append a batch's columns onto the accumulated output, establishing the
/// column set on the first batch
pub(crate) fn append_columns(accumulated: &mut Vec<ColumnBuffer>, batch: Vec<ColumnBuffer>) {
    if accumulated.is_empty() {
        *accumulated = batch;
        return;
    }
    for (dst, src) in accumulated.iter_mut().zip(batch) {
        dst.rows.extend(src.rows);
    }
}
