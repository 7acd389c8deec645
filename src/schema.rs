//! Schema model, typed row conversion, and schema deduction.
//!
//! A [`TableSchema`] is an ordered list of named, typed, optionally-nullable
//! columns. Identity is positional: field *i* of a raw row maps to column
//! *i*. Schemas are produced either by an explicit request or by
//! [`deduce_schema`] sampling the leading rows of a delimited source, and
//! are persisted through the parallel-array [`StoredTableSchema`] form.

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::{
    reader::DelimitedReader,
    value::{DataType, Scalar, parse_canonical_uuid, parse_timestamp_millis},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub optional: bool,
}

impl Column {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("name must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Fails listing every column that breaks the schema invariants.
    pub fn validate(&self) -> Result<()> {
        let offenders: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .filter_map(|(position, column)| {
                column
                    .validate()
                    .err()
                    .map(|err| format!("column {}: {err}", position + 1))
            })
            .collect();
        if !offenders.is_empty() {
            bail!("invalid schema: {}", offenders.join("; "));
        }
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn convert_field(column: &Column, raw: &str) -> Result<Scalar> {
        if raw.is_empty() {
            if column.optional {
                return Ok(Scalar::Null);
            }
            bail!(
                "tried to insert empty value into non-optional column '{}'",
                column.name
            );
        }
        let converted = match column.data_type {
            DataType::Text => Scalar::Text(raw.to_string()),
            DataType::Integer => {
                let parsed: i64 = raw.parse().with_context(|| {
                    format!(
                        "failed to parse '{raw}' as {} for column '{}'",
                        DataType::Integer,
                        column.name
                    )
                })?;
                Scalar::Integer(parsed)
            }
            DataType::Float => {
                let parsed: f64 = raw.parse().with_context(|| {
                    format!(
                        "failed to parse '{raw}' as {} for column '{}'",
                        DataType::Float,
                        column.name
                    )
                })?;
                Scalar::Float(parsed)
            }
            DataType::Timestamp => {
                let millis = parse_timestamp_millis(raw).with_context(|| {
                    format!(
                        "failed to parse '{raw}' as {} for column '{}'",
                        DataType::Timestamp,
                        column.name
                    )
                })?;
                Scalar::Integer(millis)
            }
            DataType::Uuid => {
                let parsed = parse_canonical_uuid(raw).with_context(|| {
                    format!(
                        "failed to parse '{raw}' as {} for column '{}'",
                        DataType::Uuid,
                        column.name
                    )
                })?;
                Scalar::Text(parsed.to_string())
            }
        };
        Ok(converted)
    }

    /// Converts a raw row and appends the typed scalars to `dst`.
    ///
    /// Timestamps land as Unix-millisecond integers, UUIDs as their
    /// canonical string form. Empty fields become `Null` only for optional
    /// columns.
    pub fn convert_and_append_row(&self, dst: &mut Vec<Scalar>, raw_row: &[String]) -> Result<()> {
        if raw_row.len() != self.columns.len() {
            bail!(
                "row has {} field(s) but the schema defines {} column(s)",
                raw_row.len(),
                self.columns.len()
            );
        }
        dst.reserve(raw_row.len());
        for (column, raw) in self.columns.iter().zip(raw_row) {
            dst.push(Self::convert_field(column, raw)?);
        }
        Ok(())
    }

    /// The same conversion keyed by column name, for row-oriented backends.
    pub fn convert_row_to_map(&self, raw_row: &[String]) -> Result<BTreeMap<String, Scalar>> {
        if raw_row.len() != self.columns.len() {
            bail!(
                "row has {} field(s) but the schema defines {} column(s)",
                raw_row.len(),
                self.columns.len()
            );
        }
        let mut map = BTreeMap::new();
        for (column, raw) in self.columns.iter().zip(raw_row) {
            map.insert(column.name.clone(), Self::convert_field(column, raw)?);
        }
        Ok(map)
    }
}

/// The persisted form of a schema: three parallel arrays, one entry per
/// column. A concession to array-typed metadata storage; re-hydrated into
/// [`TableSchema`] immediately on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTableSchema {
    pub column_names: Vec<String>,
    pub column_data_types: Vec<u8>,
    pub column_optionals: Vec<bool>,
}

impl StoredTableSchema {
    pub fn from_schema(schema: &TableSchema) -> Self {
        Self {
            column_names: schema.columns.iter().map(|c| c.name.clone()).collect(),
            column_data_types: schema.columns.iter().map(|c| c.data_type.code()).collect(),
            column_optionals: schema.columns.iter().map(|c| c.optional).collect(),
        }
    }

    pub fn into_schema(self) -> Result<TableSchema> {
        if self.column_names.len() != self.column_data_types.len()
            || self.column_names.len() != self.column_optionals.len()
        {
            bail!(
                "stored schema arrays have mismatched lengths ({} names, {} data types, {} optional flags)",
                self.column_names.len(),
                self.column_data_types.len(),
                self.column_optionals.len()
            );
        }
        let columns = self
            .column_names
            .into_iter()
            .zip(self.column_data_types)
            .zip(self.column_optionals)
            .map(|((name, code), optional)| {
                let data_type = DataType::from_code(code).ok_or_else(|| {
                    anyhow!("stored schema has invalid data type code {code} for column '{name}'")
                })?;
                Ok(Column {
                    name,
                    data_type,
                    optional,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let schema = TableSchema::new(columns);
        schema.validate()?;
        Ok(schema)
    }
}

#[derive(Debug)]
struct DeducedColumn {
    name: String,
    data_type: Option<DataType>,
    optional: bool,
}

fn deduce_field_type(raw: &str) -> DataType {
    if raw.parse::<i64>().is_ok() {
        return DataType::Integer;
    }
    if raw.parse::<f64>().is_ok() {
        return DataType::Float;
    }
    if parse_timestamp_millis(raw).is_ok() {
        return DataType::Timestamp;
    }
    if parse_canonical_uuid(raw).is_ok() {
        return DataType::Uuid;
    }
    DataType::Text
}

/// Produces a schema from the header and up to `max_rows_to_check` data
/// rows of a delimited source.
///
/// An empty field only marks its column optional; the first successfully
/// probed type (integer, float, RFC 3339 timestamp, UUID, then text) sticks,
/// and any later row deducing a different type aborts the whole run. On
/// success the reader is rewound to just past the header.
pub fn deduce_schema<R: Read + Seek>(
    reader: &mut DelimitedReader<R>,
    max_rows_to_check: usize,
) -> Result<TableSchema> {
    let header = reader
        .read_header_row()
        .context("failed to read header row for schema deduction")?;
    let mut columns: Vec<DeducedColumn> = header
        .into_iter()
        .map(|name| DeducedColumn {
            name,
            data_type: None,
            optional: false,
        })
        .collect();

    let mut rows_checked = 0usize;
    while rows_checked < max_rows_to_check {
        let Some((fields, row_number)) = reader.read_row()? else {
            break;
        };
        rows_checked += 1;
        if fields.len() > columns.len() {
            bail!(
                "row {row_number} has {} field(s) but the header defines {} column(s)",
                fields.len(),
                columns.len()
            );
        }
        for (column, field) in columns.iter_mut().zip(&fields) {
            if field.is_empty() {
                column.optional = true;
                continue;
            }
            let deduced = deduce_field_type(field);
            match column.data_type {
                None => column.data_type = Some(deduced),
                Some(existing) if existing != deduced => {
                    bail!(
                        "found incompatible data types '{existing}' and '{deduced}' in column '{}'",
                        column.name
                    );
                }
                Some(_) => {}
            }
        }
    }

    let offenders: Vec<String> = columns
        .iter()
        .enumerate()
        .flat_map(|(position, column)| {
            let mut problems = Vec::new();
            if column.name.is_empty() {
                problems.push(format!("column {} has a blank name", position + 1));
            }
            if column.data_type.is_none() {
                problems.push(format!(
                    "no data type could be deduced for column '{}'",
                    if column.name.is_empty() {
                        format!("#{}", position + 1)
                    } else {
                        column.name.clone()
                    }
                ));
            }
            problems
        })
        .collect();
    if !offenders.is_empty() {
        bail!("schema deduction failed: {}", offenders.join("; "));
    }

    reader
        .reset_read_position(true)
        .context("failed to rewind reader after schema deduction")?;

    Ok(TableSchema::new(
        columns
            .into_iter()
            .map(|column| Column {
                name: column.name,
                data_type: column.data_type.expect("validated above"),
                optional: column.optional,
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn reader_for(text: &str) -> DelimitedReader<Cursor<Vec<u8>>> {
        DelimitedReader::new(Cursor::new(text.as_bytes().to_vec())).expect("construct reader")
    }

    fn column(name: &str, data_type: DataType, optional: bool) -> Column {
        Column {
            name: name.to_string(),
            data_type,
            optional,
        }
    }

    #[test]
    fn deduces_integer_and_float_columns() {
        let mut reader = reader_for("a,b\n1,2.5\n3,4.5\n");
        let schema = deduce_schema(&mut reader, 100).unwrap();
        assert_eq!(
            schema.columns,
            vec![
                column("a", DataType::Integer, false),
                column("b", DataType::Float, false),
            ]
        );
        // Reader sits just past the header afterwards.
        let (fields, row) = reader.read_row().unwrap().unwrap();
        assert_eq!(fields, vec!["1", "2.5"]);
        assert_eq!(row, 1);
    }

    #[test]
    fn empty_cell_marks_column_optional() {
        let mut reader = reader_for("x,k\n,1\ny,2\n");
        let schema = deduce_schema(&mut reader, 100).unwrap();
        assert_eq!(
            schema.columns,
            vec![
                column("x", DataType::Text, true),
                column("k", DataType::Integer, false),
            ]
        );
    }

    #[test]
    fn deduces_timestamp_and_uuid_columns() {
        let mut reader = reader_for(
            "seen;device\n2024-07-01T00:00:00Z;550e8400-e29b-41d4-a716-446655440000\n",
        );
        let schema = deduce_schema(&mut reader, 100).unwrap();
        assert_eq!(
            schema.columns,
            vec![
                column("seen", DataType::Timestamp, false),
                column("device", DataType::Uuid, false),
            ]
        );
    }

    #[test]
    fn conflicting_types_fail_with_both_names() {
        let mut reader = reader_for("n\n1\n2.5\n");
        let err = deduce_schema(&mut reader, 100).unwrap_err().to_string();
        assert!(
            err.contains("found incompatible data types 'INTEGER' and 'FLOAT' in column 'n'"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn all_empty_column_fails_validation() {
        let mut reader = reader_for("a,b\n1,\n2,\n");
        let err = deduce_schema(&mut reader, 100).unwrap_err().to_string();
        assert!(err.contains("no data type could be deduced for column 'b'"));
    }

    #[test]
    fn sample_limit_bounds_the_scan() {
        // The conflicting third row is outside the sampled window.
        let mut reader = reader_for("n\n1\n2\n2.5\n");
        let schema = deduce_schema(&mut reader, 2).unwrap();
        assert_eq!(schema.columns[0].data_type, DataType::Integer);
    }

    #[test]
    fn convert_row_rejects_length_mismatch() {
        let schema = TableSchema::new(vec![column("a", DataType::Integer, false)]);
        let mut dst = Vec::new();
        let raw = vec!["1".to_string(), "2".to_string()];
        assert!(schema.convert_and_append_row(&mut dst, &raw).is_err());
    }

    #[test]
    fn convert_row_handles_optional_and_required_empties() {
        let schema = TableSchema::new(vec![
            column("a", DataType::Integer, true),
            column("b", DataType::Text, false),
        ]);
        let mut dst = Vec::new();
        schema
            .convert_and_append_row(&mut dst, &["".to_string(), "hi".to_string()])
            .unwrap();
        assert_eq!(dst, vec![Scalar::Null, Scalar::Text("hi".to_string())]);

        let err = schema
            .convert_and_append_row(&mut Vec::new(), &["1".to_string(), "".to_string()])
            .unwrap_err()
            .to_string();
        assert!(err.contains("tried to insert empty value into non-optional column 'b'"));
    }

    #[test]
    fn convert_row_parses_typed_fields() {
        let schema = TableSchema::new(vec![
            column("ts", DataType::Timestamp, false),
            column("id", DataType::Uuid, false),
            column("v", DataType::Float, false),
        ]);
        let raw = vec![
            "2024-07-01T00:00:00Z".to_string(),
            "{550E8400-E29B-41D4-A716-446655440000}".to_string(),
            "1.25".to_string(),
        ];
        let mut dst = Vec::new();
        schema.convert_and_append_row(&mut dst, &raw).unwrap();
        assert_eq!(
            dst,
            vec![
                Scalar::Integer(1_719_792_000_000),
                Scalar::Text("550e8400-e29b-41d4-a716-446655440000".to_string()),
                Scalar::Float(1.25),
            ]
        );
    }

    #[test]
    fn convert_row_to_map_matches_positional_conversion() {
        let schema = TableSchema::new(vec![
            column("a", DataType::Integer, false),
            column("b", DataType::Text, false),
        ]);
        let raw = vec!["7".to_string(), "x".to_string()];

        let mut positional = Vec::new();
        schema.convert_and_append_row(&mut positional, &raw).unwrap();
        let map = schema.convert_row_to_map(&raw).unwrap();

        for (column, scalar) in schema.columns.iter().zip(&positional) {
            assert_eq!(map.get(&column.name), Some(scalar));
        }
    }

    #[test]
    fn stored_schema_round_trips() {
        let schema = TableSchema::new(vec![
            column("a", DataType::Integer, false),
            column("b", DataType::Timestamp, true),
        ]);
        let stored = StoredTableSchema::from_schema(&schema);
        assert_eq!(stored.column_data_types, vec![2, 4]);
        assert_eq!(stored.into_schema().unwrap(), schema);
    }

    #[test]
    fn stored_schema_rejects_mismatched_arrays() {
        let stored = StoredTableSchema {
            column_names: vec!["a".to_string()],
            column_data_types: vec![1, 2],
            column_optionals: vec![false],
        };
        let err = stored.into_schema().unwrap_err().to_string();
        assert!(err.contains("mismatched lengths"));
    }

    #[test]
    fn stored_schema_rejects_unknown_type_codes() {
        let stored = StoredTableSchema {
            column_names: vec!["a".to_string()],
            column_data_types: vec![9],
            column_optionals: vec![false],
        };
        assert!(stored.into_schema().is_err());
    }

    #[test]
    fn schema_json_uses_uppercase_type_names() {
        let schema = TableSchema::new(vec![column("a", DataType::Timestamp, true)]);
        let encoded = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({
                "columns": [{"name": "a", "dataType": "TIMESTAMP", "optional": true}]
            })
        );
        let decoded: TableSchema = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, schema);
    }
}
