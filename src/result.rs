//! Pivot result assembly.
//!
//! The column store emits grouped `(row, column, aggregation)` triples in
//! its own order; [`AnalysisResult`] folds them into a dense row-major
//! pivot: column headers kept sorted on the fly, zero back-fill whenever a
//! new column appears mid-stream, and a final truncation pass enforcing the
//! column-axis cap.

use anyhow::{Result, bail};
use serde::Serialize;

use crate::{
    query::{AnalysisQuery, SortOrder, Split},
    value::{DataType, TypedValue, TypedValueList},
};

/// Scan destinations for one emitted triple. The same handle is reused for
/// every row of a result stream; each slot is typed by the query.
#[derive(Debug, Clone)]
pub struct ResultHandle {
    pub row: TypedValue,
    pub column: TypedValue,
    pub aggregation: TypedValue,
    pub total: TypedValue,
}

impl ResultHandle {
    pub fn new(query: &AnalysisQuery) -> Self {
        Self {
            row: TypedValue::zero(query.row_split.data_type),
            column: TypedValue::zero(query.column_split.data_type),
            aggregation: TypedValue::zero(query.aggregation.data_type),
            total: TypedValue::zero(query.aggregation.data_type),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnResult {
    pub field_value: TypedValue,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RowResult {
    pub field_value: TypedValue,
    pub aggregation_total: TypedValue,
    pub aggregations_by_column: TypedValueList,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub rows_meta: Split,
    pub columns_meta: Split,
    pub value_aggregation_data_type: DataType,
    pub columns: Vec<ColumnResult>,
    pub rows: Vec<RowResult>,
}

impl AnalysisResult {
    pub fn new(query: &AnalysisQuery) -> Self {
        Self {
            rows_meta: query.row_split.clone(),
            columns_meta: query.column_split.clone(),
            value_aggregation_data_type: query.aggregation.data_type,
            columns: Vec::with_capacity(query.column_split.limit as usize),
            rows: Vec::with_capacity(query.row_split.limit as usize),
        }
    }

    /// Finds the row bucket for the handle's row value, allocating one with
    /// the handle's total and a zero-filled per-column list when absent.
    ///
    /// The search runs back to front: under the store's grouped emission
    /// order the most recently touched row is the most likely match.
    fn get_or_create_row_result(&mut self, handle: &ResultHandle) -> usize {
        if let Some(offset) = self
            .rows
            .iter()
            .rev()
            .position(|row| row.field_value == handle.row)
        {
            return self.rows.len() - 1 - offset;
        }
        self.rows.push(RowResult {
            field_value: handle.row.clone(),
            aggregation_total: handle.total.clone(),
            aggregations_by_column: TypedValueList::zeroed(
                self.value_aggregation_data_type,
                self.columns_meta.limit as usize,
            ),
        });
        self.rows.len() - 1
    }

    /// Returns the index of the column holding `value`, inserting a new
    /// header at its sort position when the value is unseen. The boolean is
    /// true for a fresh insertion.
    fn initialize_column_result(&mut self, value: &TypedValue) -> Result<(usize, bool)> {
        if let Some(index) = self
            .columns
            .iter()
            .position(|column| column.field_value == *value)
        {
            return Ok((index, false));
        }

        let mut insert_at = self.columns.len();
        for (index, existing) in self.columns.iter().enumerate() {
            let breaks_order = match self.columns_meta.sort_order {
                SortOrder::Ascending => value.less_than(&existing.field_value)?,
                SortOrder::Descending => existing.field_value.less_than(value)?,
            };
            if breaks_order {
                insert_at = index;
                break;
            }
        }
        self.columns.insert(
            insert_at,
            ColumnResult {
                field_value: value.clone(),
            },
        );
        Ok((insert_at, true))
    }

    /// Folds one scanned triple into the pivot.
    pub fn consume(&mut self, handle: &ResultHandle) -> Result<()> {
        let row_index = self.get_or_create_row_result(handle);
        let (column_index, inserted) = self.initialize_column_result(&handle.column)?;

        if inserted {
            // A column discovered mid-stream shifts every already-built row;
            // the current row gets its shift from the value insert below.
            let zero = TypedValue::zero(self.value_aggregation_data_type).value();
            for (index, row) in self.rows.iter_mut().enumerate() {
                if index != row_index {
                    row.aggregations_by_column.insert(column_index, &zero);
                }
            }
        }

        let accepted = self.rows[row_index]
            .aggregations_by_column
            .insert(column_index, &handle.aggregation.value());
        if !accepted {
            bail!(
                "aggregation value of type {} does not match declared aggregation type {}",
                handle.aggregation.data_type(),
                self.value_aggregation_data_type
            );
        }
        Ok(())
    }

    /// Enforces the column cap and densifies every row to one value per
    /// surviving column.
    pub fn finalize(&mut self) {
        let limit = self.columns_meta.limit as usize;
        if self.columns.len() > limit {
            self.columns.truncate(limit);
        }
        let width = self.columns.len();
        for row in &mut self.rows {
            row.aggregations_by_column.truncate(width);
            row.aggregations_by_column.add_zeroes_up_to(width);
        }
    }
}
