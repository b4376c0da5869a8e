//! Per-thread interval profiling and the binary job profile artifact
//!
//! Every pipeline thread owns a `Profiler` created from the job's shared base
//! time and records tagged intervals while it works. At job end the worker
//! serialises all of them into one artifact per node. Integers are
//! little-endian with fixed widths (`u8` counts, `i64` timestamps); strings
//! are `u64` length-prefixed UTF-8. Timestamps are nanoseconds since the base
//! time.

use std::time::Instant;
use videogrid_storage::{retry_backoff, write_all, StorageBackend, StorageError, StorageResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInterval {
    pub label: String,
    pub start_ns: i64,
    pub end_ns: i64,
}

/// Interval recorder carried by one pipeline thread
#[derive(Debug, Clone)]
pub struct Profiler {
    base: Instant,
    intervals: Vec<TaskInterval>,
}

impl Profiler {
    #[must_use]
    pub fn new(base: Instant) -> Self {
        Self {
            base,
            intervals: Vec::new(),
        }
    }

    fn now_ns(&self) -> i64 {
        self.base.elapsed().as_nanos() as i64
    }

    /// Run `f` and record it as a tagged interval
    pub fn record<T>(&mut self, label: &str, f: impl FnOnce() -> T) -> T {
        let start_ns = self.now_ns();
        let value = f();
        let end_ns = self.now_ns();
        self.intervals.push(TaskInterval {
            label: label.to_string(),
            start_ns,
            end_ns,
        });
        value
    }

    #[must_use]
    pub fn intervals(&self) -> &[TaskInterval] {
        &self.intervals
    }
}

/// One `(rank, component, tag, worker_idx, intervals)` record of the artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub rank: i64,
    pub component: String,
    pub tag: String,
    pub worker_index: i32,
    pub intervals: Vec<TaskInterval>,
}

/// Parsed form of a node's job profile artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileArtifact {
    pub start_time_ns: i64,
    pub end_time_ns: i64,
    pub records: Vec<ProfileRecord>,
}

/// Serialise and persist a node's profile artifact.
///
/// Field order: start and end timestamps, the load pool (count then one
/// record per thread), the eval chains (PU count, profilers-per-chain, then
/// pre/eval/post records per PU), and the save pool.
#[allow(clippy::too_many_arguments)]
pub fn write_profiler_artifact(
    storage: &dyn StorageBackend,
    path: &str,
    rank: i64,
    start_time_ns: i64,
    end_time_ns: i64,
    load: &[Profiler],
    pre_eval: &[Profiler],
    eval: &[Profiler],
    post_eval: &[Profiler],
    save: &[Profiler],
) -> StorageResult<()> {
    debug_assert!(pre_eval.len() == eval.len() && eval.len() == post_eval.len());

    let mut out = Vec::new();
    put_i64(&mut out, start_time_ns);
    put_i64(&mut out, end_time_ns);

    put_u8(&mut out, load.len() as u8);
    for (i, profiler) in load.iter().enumerate() {
        put_record(&mut out, rank, "load", "", i as i32, profiler);
    }

    put_u8(&mut out, pre_eval.len() as u8);
    put_u8(&mut out, 3);
    for pu in 0..pre_eval.len() {
        put_record(&mut out, rank, "eval", "pre", pu as i32, &pre_eval[pu]);
        put_record(&mut out, rank, "eval", "eval", pu as i32, &eval[pu]);
        put_record(&mut out, rank, "eval", "post", pu as i32, &post_eval[pu]);
    }

    put_u8(&mut out, save.len() as u8);
    for (i, profiler) in save.iter().enumerate() {
        put_record(&mut out, rank, "save", "", i as i32, profiler);
    }

    retry_backoff(path, || write_all(storage, path, &out))
}

/// Parse an artifact produced by [`write_profiler_artifact`]
pub fn read_profiler_artifact(bytes: &[u8]) -> StorageResult<ProfileArtifact> {
    let mut cursor = Cursor { bytes, pos: 0 };
    let start_time_ns = cursor.take_i64()?;
    let end_time_ns = cursor.take_i64()?;

    let mut records = Vec::new();
    let load_count = cursor.take_u8()?;
    for _ in 0..load_count {
        records.push(cursor.take_record()?);
    }

    let eval_count = cursor.take_u8()?;
    let per_chain = cursor.take_u8()?;
    for _ in 0..(eval_count as usize * per_chain as usize) {
        records.push(cursor.take_record()?);
    }

    let save_count = cursor.take_u8()?;
    for _ in 0..save_count {
        records.push(cursor.take_record()?);
    }

    Ok(ProfileArtifact {
        start_time_ns,
        end_time_ns,
        records,
    })
}

fn put_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u64).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

fn put_record(
    out: &mut Vec<u8>,
    rank: i64,
    component: &str,
    tag: &str,
    worker_index: i32,
    profiler: &Profiler,
) {
    put_i64(out, rank);
    put_str(out, component);
    put_str(out, tag);
    put_i32(out, worker_index);
    let intervals = profiler.intervals();
    out.extend_from_slice(&(intervals.len() as u64).to_le_bytes());
    for interval in intervals {
        put_str(out, &interval.label);
        put_i64(out, interval.start_ns);
        put_i64(out, interval.end_ns);
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn take(&mut self, len: usize) -> StorageResult<&[u8]> {
        let end = self.pos + len;
        if end > self.bytes.len() {
            return Err(StorageError::MalformedBlob(format!(
                "truncated profile artifact at offset {}",
                self.pos
            )));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> StorageResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_i32(&mut self) -> StorageResult<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes(bytes.try_into().map_err(|_| {
            StorageError::MalformedBlob("truncated i32".to_string())
        })?))
    }

    fn take_i64(&mut self) -> StorageResult<i64> {
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().map_err(|_| {
            StorageError::MalformedBlob("truncated i64".to_string())
        })?))
    }

    fn take_str(&mut self) -> StorageResult<String> {
        let len = self.take_i64()? as usize;
        String::from_utf8(self.take(len)?.to_vec())
            .map_err(|e| StorageError::MalformedBlob(format!("profile string: {e}")))
    }

    fn take_record(&mut self) -> StorageResult<ProfileRecord> {
        let rank = self.take_i64()?;
        let component = self.take_str()?;
        let tag = self.take_str()?;
        let worker_index = self.take_i32()?;
        let count = self.take_i64()? as usize;
        let mut intervals = Vec::with_capacity(count);
        for _ in 0..count {
            let label = self.take_str()?;
            let start_ns = self.take_i64()?;
            let end_ns = self.take_i64()?;
            intervals.push(TaskInterval {
                label,
                start_ns,
                end_ns,
            });
        }
        Ok(ProfileRecord {
            rank,
            component,
            tag,
            worker_index,
            intervals,
        })
    }
}
