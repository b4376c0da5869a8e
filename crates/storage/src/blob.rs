//! Binary framing for column and output-item blobs
//!
//! Column blob: `u64` row count, `u64` length per row, then the payloads
//! back to back. Output-item blob: `u64` column count, then per column a
//! length-prefixed name followed by the same row framing. All integers are
//! little-endian.

use crate::{RandomReadFile, StorageError, StorageResult};

/// Encode the rows of one table column
#[must_use]
pub fn encode_column_blob(rows: &[Vec<u8>]) -> Vec<u8> {
    let payload: usize = rows.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(8 + rows.len() * 8 + payload);
    out.extend_from_slice(&(rows.len() as u64).to_le_bytes());
    for row in rows {
        out.extend_from_slice(&(row.len() as u64).to_le_bytes());
    }
    for row in rows {
        out.extend_from_slice(row);
    }
    out
}

/// Read the requested rows of a column blob through a random-read handle.
/// The index is read once; each payload is fetched with a positioned read.
pub fn read_column_rows(
    file: &mut dyn RandomReadFile,
    rows: &[i64],
) -> StorageResult<Vec<Vec<u8>>> {
    let header = file.read_at(0, 8)?;
    let row_count = u64::from_le_bytes(to_array(&header)?);

    let index = file.read_at(8, row_count as usize * 8)?;
    let mut lengths = Vec::with_capacity(row_count as usize);
    for chunk in index.chunks_exact(8) {
        lengths.push(u64::from_le_bytes(to_array(chunk)?));
    }

    // Prefix-sum the lengths into payload offsets.
    let payload_base = 8 + row_count * 8;
    let mut offsets = Vec::with_capacity(lengths.len());
    let mut acc = payload_base;
    for len in &lengths {
        offsets.push(acc);
        acc += len;
    }

    let mut out = Vec::with_capacity(rows.len());
    for &row in rows {
        if row < 0 || row as u64 >= row_count {
            return Err(StorageError::MalformedBlob(format!(
                "row {row} out of range for column with {row_count} rows"
            )));
        }
        let idx = row as usize;
        out.push(file.read_at(offsets[idx], lengths[idx] as usize)?);
    }
    Ok(out)
}

/// Encode all output columns of one I/O item as a single blob
#[must_use]
pub fn encode_item_blob(columns: &[(String, Vec<Vec<u8>>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(columns.len() as u64).to_le_bytes());
    for (name, rows) in columns {
        out.extend_from_slice(&(name.len() as u64).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&encode_column_blob(rows));
    }
    out
}

/// Decode an output-item blob back into named columns
pub fn decode_item_blob(bytes: &[u8]) -> StorageResult<Vec<(String, Vec<Vec<u8>>)>> {
    let mut cursor = Cursor { bytes, pos: 0 };
    let column_count = cursor.take_u64()?;
    let mut columns = Vec::with_capacity(column_count as usize);
    for _ in 0..column_count {
        let name_len = cursor.take_u64()? as usize;
        let name = String::from_utf8(cursor.take(name_len)?.to_vec())
            .map_err(|e| StorageError::MalformedBlob(format!("column name: {e}")))?;

        let row_count = cursor.take_u64()? as usize;
        let mut lengths = Vec::with_capacity(row_count);
        for _ in 0..row_count {
            lengths.push(cursor.take_u64()? as usize);
        }
        let mut rows = Vec::with_capacity(row_count);
        for len in lengths {
            rows.push(cursor.take(len)?.to_vec());
        }
        columns.push((name, rows));
    }
    Ok(columns)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> StorageResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| {
            StorageError::MalformedBlob("length overflows blob".to_string())
        })?;
        if end > self.bytes.len() {
            return Err(StorageError::MalformedBlob(format!(
                "truncated blob: wanted {len} bytes at offset {}",
                self.pos
            )));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u64(&mut self) -> StorageResult<u64> {
        Ok(u64::from_le_bytes(to_array(self.take(8)?)?))
    }
}

fn to_array(bytes: &[u8]) -> StorageResult<[u8; 8]> {
    bytes
        .try_into()
        .map_err(|_| StorageError::MalformedBlob("truncated integer field".to_string()))
}
