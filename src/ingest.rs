use std::io::{Read, Seek};

use anyhow::{Context, Result};
use log::debug;
use uuid::Uuid;

use crate::{
    compile::quote_identifier,
    reader::DelimitedReader,
    schema::TableSchema,
    store::ColumnStore,
    value::Scalar,
};

/// Rows per prepared batch. Matches the backend's sweet spot for
/// MergeTree-style inserts.
pub const INSERT_BATCH_SIZE: usize = 10_000;

/// A row-oriented source of raw field values with 1-based row numbers.
pub trait DataSource {
    /// Pulls the next raw row; `None` signals exhaustion without error.
    fn next_row(&mut self) -> Result<Option<(Vec<String>, u64)>>;
}

impl<R: Read + Seek> DataSource for DelimitedReader<R> {
    fn next_row(&mut self) -> Result<Option<(Vec<String>, u64)>> {
        self.read_row()
    }
}

/// Node identifier for time-based surrogate keys; unique enough per process
/// since the timestamp component carries the ordering.
fn surrogate_node_id() -> [u8; 6] {
    let pid = std::process::id().to_be_bytes();
    [b'c', b'p', pid[0], pid[1], pid[2], pid[3]]
}

/// Streams `source` into `table` in batches of [`INSERT_BATCH_SIZE`] rows.
///
/// Every raw row gets a generated time-based UUID prepended as its
/// surrogate key, then its fields converted through `schema`. A failed
/// batch aborts the whole ingestion; already-sent batches stay in place,
/// so callers that need all-or-nothing must drop the table themselves.
pub fn insert_table_data(
    store: &dyn ColumnStore,
    table: &str,
    schema: &TableSchema,
    source: &mut dyn DataSource,
) -> Result<u64> {
    let insert_sql = format!("INSERT INTO {}", quote_identifier(table)?);
    let node_id = surrogate_node_id();
    let mut total_rows = 0u64;
    let mut exhausted = false;

    while !exhausted {
        let mut batch = store
            .prepare_batch(&insert_sql)
            .context("failed to prepare batch insert")?;
        let mut batch_rows = 0usize;

        while batch_rows < INSERT_BATCH_SIZE {
            let Some((fields, row_number)) = source.next_row()? else {
                exhausted = true;
                break;
            };
            let mut row = Vec::with_capacity(schema.column_count() + 1);
            row.push(Scalar::Uuid(Uuid::now_v1(&node_id)));
            schema
                .convert_and_append_row(&mut row, &fields)
                .with_context(|| format!("failed to convert row {row_number}"))?;
            batch
                .append(row)
                .with_context(|| format!("failed to append row {row_number} to batch"))?;
            batch_rows += 1;
            total_rows += 1;
        }

        if batch_rows > 0 {
            batch.send().context("failed to send batch insert")?;
            debug!("sent batch of {batch_rows} row(s) into '{table}'");
        }
    }

    Ok(total_rows)
}
