//! The boundary to the columnar backend and the façade built on top of it.
//!
//! The engine drives any backend through the narrow [`ColumnStore`] trait
//! (statement execution, parametrised queries, prepared batch inserts).
//! [`AnalysisDb`] binds the schema model, ingestion pipeline, query
//! compiler, and result builder to one store instance, and owns the
//! bootstrap metadata table in which schemas persist.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use thiserror::Error;

use crate::{
    compile::{compile_analysis_query, quote_identifier},
    ingest,
    query::AnalysisQuery,
    result::{AnalysisResult, ResultHandle},
    schema::{Column, StoredTableSchema, TableSchema},
    value::{DataType, Scalar, TypedValue},
};

/// Name of the bootstrap table holding persisted schemas.
pub const SCHEMA_TABLE: &str = "analysis_schemas";

/// Classified backend failures. Drivers are expected to wrap their native
/// errors in this type where the engine needs to react to a class of
/// failure; everything else may stay driver-specific.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend reports the target table does not exist (ClickHouse
    /// error code 60 or the dialect's equivalent).
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("backend failure: {0}")]
    Backend(String),
}

/// True when any cause in the error chain is an unknown-table report.
pub fn is_unknown_table(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<StoreError>(), Some(StoreError::UnknownTable(_))))
}

/// Streamed rows from a query; each row is one scalar per selected column.
pub trait RowCursor {
    fn next_row(&mut self) -> Result<Option<Vec<Scalar>>>;
}

/// A prepared batch insert. Appended rows are buffered until `send`.
pub trait BatchAppend {
    fn append(&mut self, row: Vec<Scalar>) -> Result<()>;
    fn send(self: Box<Self>) -> Result<()>;
}

/// Minimal surface the engine needs from a columnar backend. Values reach
/// the backend exclusively through `params` and batched rows, never spliced
/// into the SQL text.
pub trait ColumnStore {
    fn execute(&self, sql: &str, params: &[Scalar]) -> Result<()>;
    fn query(&self, sql: &str, params: &[Scalar]) -> Result<Box<dyn RowCursor>>;
    fn prepare_batch(&self, sql: &str) -> Result<Box<dyn BatchAppend + '_>>;
}

fn backend_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Text => "String",
        DataType::Integer => "Int64",
        DataType::Float => "Float64",
        DataType::Timestamp => "DateTime64(3)",
        DataType::Uuid => "UUID",
    }
}

fn column_definition(column: &Column) -> Result<String> {
    let name = quote_identifier(&column.name)?;
    let mut definition = format!("{name} {}", backend_type(column.data_type));
    if column.optional {
        definition.push_str(" NULL");
    }
    Ok(definition)
}

fn scan_into(slot: &mut TypedValue, scalar: &Scalar, what: &str) -> Result<()> {
    if slot.set(scalar) {
        return Ok(());
    }
    bail!(
        "scanned {what} value of type {} does not match declared {} storage",
        scalar.type_name(),
        slot.data_type()
    )
}

fn text_array(scalar: &Scalar, what: &str) -> Result<Vec<String>> {
    match scalar {
        Scalar::TextArray(values) => Ok(values.clone()),
        other => bail!("stored schema {what} has type {}, expected text array", other.type_name()),
    }
}

fn integer_array(scalar: &Scalar, what: &str) -> Result<Vec<i64>> {
    match scalar {
        Scalar::IntegerArray(values) => Ok(values.clone()),
        other => bail!(
            "stored schema {what} has type {}, expected integer array",
            other.type_name()
        ),
    }
}

/// Analysis database bound to one columnar backend.
pub struct AnalysisDb<S: ColumnStore> {
    store: S,
}

impl<S: ColumnStore> AnalysisDb<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates the user table: a generated `id UUID` primary key followed
    /// by the schema's columns, optional ones marked nullable.
    pub fn create_table(&self, name: &str, schema: &TableSchema) -> Result<()> {
        schema.validate()?;
        let mut definitions = Vec::with_capacity(schema.column_count() + 1);
        definitions.push("`id` UUID".to_string());
        for column in &schema.columns {
            definitions.push(column_definition(column)?);
        }
        let sql = format!(
            "CREATE TABLE {} ({}) ENGINE = MergeTree() PRIMARY KEY (id)",
            quote_identifier(name)?,
            definitions.join(", ")
        );
        self.store
            .execute(&sql, &[])
            .with_context(|| format!("failed to create table '{name}'"))?;
        info!("created table '{name}' with {} column(s)", schema.column_count());
        Ok(())
    }

    fn ensure_schema_table(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS `{SCHEMA_TABLE}` (\
             `name` String, \
             `column_names` Array(String), \
             `column_data_types` Array(UInt8), \
             `column_optionals` Array(UInt8)\
             ) ENGINE = MergeTree() PRIMARY KEY (name)"
        );
        self.store
            .execute(&sql, &[])
            .context("failed to ensure schema metadata table")
    }

    /// Persists the schema as one parallel-array row in the metadata table.
    pub fn store_table_schema(&self, name: &str, schema: &TableSchema) -> Result<()> {
        schema.validate()?;
        self.ensure_schema_table()?;
        let stored = StoredTableSchema::from_schema(schema);
        let row = vec![
            Scalar::Text(name.to_string()),
            Scalar::TextArray(stored.column_names),
            Scalar::IntegerArray(
                stored
                    .column_data_types
                    .iter()
                    .map(|&code| i64::from(code))
                    .collect(),
            ),
            Scalar::IntegerArray(
                stored
                    .column_optionals
                    .iter()
                    .map(|&optional| i64::from(optional))
                    .collect(),
            ),
        ];
        let mut batch = self
            .store
            .prepare_batch(&format!("INSERT INTO `{SCHEMA_TABLE}`"))
            .context("failed to prepare schema insert")?;
        batch.append(row).context("failed to append schema row")?;
        batch
            .send()
            .with_context(|| format!("failed to store schema for table '{name}'"))
    }

    /// Looks a schema up by table name, re-hydrating and re-validating the
    /// parallel-array form.
    pub fn get_table_schema(&self, name: &str) -> Result<TableSchema> {
        let sql = format!(
            "SELECT column_names, column_data_types, column_optionals \
             FROM `{SCHEMA_TABLE}` WHERE name = ? LIMIT 1"
        );
        let mut cursor = self
            .store
            .query(&sql, &[Scalar::Text(name.to_string())])
            .with_context(|| format!("failed to look up schema for table '{name}'"))?;
        let Some(row) = cursor.next_row().context("failed to scan schema row")? else {
            bail!("no schema stored for table '{name}'");
        };
        if row.len() != 3 {
            bail!("schema lookup returned {} column(s), expected 3", row.len());
        }

        let codes = integer_array(&row[1], "data types")?
            .into_iter()
            .map(|code| {
                u8::try_from(code)
                    .map_err(|_| anyhow::anyhow!("stored schema has invalid data type code {code}"))
            })
            .collect::<Result<Vec<u8>>>()?;
        let stored = StoredTableSchema {
            column_names: text_array(&row[0], "column names")?,
            column_data_types: codes,
            column_optionals: integer_array(&row[2], "optional flags")?
                .into_iter()
                .map(|flag| flag != 0)
                .collect(),
        };
        stored
            .into_schema()
            .with_context(|| format!("failed to load stored schema for table '{name}'"))
    }

    /// Batched ingestion of a raw data source into an existing table.
    pub fn insert_table_data(
        &self,
        name: &str,
        schema: &TableSchema,
        source: &mut dyn ingest::DataSource,
    ) -> Result<u64> {
        let rows = ingest::insert_table_data(&self.store, name, schema, source)
            .with_context(|| format!("failed to insert data into table '{name}'"))?;
        info!("inserted {rows} row(s) into '{name}'");
        Ok(rows)
    }

    /// Compiles and executes the pivot query, folding the grouped rows into
    /// a dense [`AnalysisResult`].
    pub fn run_analysis_query(&self, query: &AnalysisQuery, table: &str) -> Result<AnalysisResult> {
        let sql = compile_analysis_query(query, table).context("failed to compile analysis query")?;
        debug!("running analysis query: {sql}");

        let mut cursor = self
            .store
            .query(&sql, &[])
            .context("failed to run analysis query")?;
        let mut result = AnalysisResult::new(query);
        let mut handle = ResultHandle::new(query);

        while let Some(row) = cursor.next_row().context("failed to scan analysis row")? {
            if row.len() != 3 {
                bail!("analysis query returned {} column(s), expected 3", row.len());
            }
            scan_into(&mut handle.row, &row[0], "row split")?;
            scan_into(&mut handle.column, &row[1], "column split")?;
            scan_into(&mut handle.aggregation, &row[2], "aggregation")?;
            // The pivot query emits no separate per-row total; the
            // aggregation doubles as one, and only the first observation
            // seeds a row's total.
            scan_into(&mut handle.total, &row[2], "aggregation total")?;
            result.consume(&handle)?;
        }

        result.finalize();
        Ok(result)
    }

    /// Drops the table. A backend unknown-table report maps to
    /// `Ok(true)` ("already dropped"); any other failure propagates.
    pub fn drop_table(&self, name: &str) -> Result<bool> {
        let sql = format!("DROP TABLE {}", quote_identifier(name)?);
        match self.store.execute(&sql, &[]) {
            Ok(()) => Ok(false),
            Err(err) if is_unknown_table(&err) => Ok(true),
            Err(err) => Err(err.context(format!("failed to drop table '{name}'"))),
        }
    }

    /// Creates the table, persists its schema, then ingests the source.
    ///
    /// A schema-persistence failure triggers a best-effort drop of the
    /// just-created table; when that cleanup fails too, both errors
    /// surface.
    pub fn create_table_from_source(
        &self,
        name: &str,
        schema: &TableSchema,
        source: &mut dyn ingest::DataSource,
    ) -> Result<u64> {
        self.create_table(name, schema)?;
        if let Err(err) = self.store_table_schema(name, schema) {
            if let Err(cleanup_err) = self.drop_table(name) {
                return Err(err.context(format!(
                    "cleanup of table '{name}' failed as well: {cleanup_err:#}"
                )));
            }
            return Err(err);
        }
        self.insert_table_data(name, schema, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_table_is_detected_through_context_chains() {
        let err = anyhow::Error::new(StoreError::UnknownTable("t".to_string()))
            .context("failed to drop table 't'");
        assert!(is_unknown_table(&err));

        let other = anyhow::Error::new(StoreError::Backend("boom".to_string()));
        assert!(!is_unknown_table(&other));
    }
}
