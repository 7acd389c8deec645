//! Wire model for analysis queries: one aggregated measure split across a
//! row axis and a column axis.

use anyhow::{Result, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::value::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregationKind {
    Sum,
    Average,
    Min,
    Max,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DateInterval {
    Year,
    Quarter,
    Month,
    Week,
    Day,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub kind: AggregationKind,
    pub field_name: String,
    pub data_type: DataType,
}

/// Axis specification: the split field, its bucketing interval, the sort
/// order, and the size cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Split {
    pub field_name: String,
    pub data_type: DataType,
    pub limit: u32,
    pub sort_order: SortOrder,
    #[serde(default)]
    pub date_interval: Option<DateInterval>,
    #[serde(default)]
    pub integer_interval: Option<i64>,
    #[serde(default)]
    pub float_interval: Option<f64>,
}

impl Split {
    fn validate(&self, axis: &str) -> Result<()> {
        ensure!(self.limit > 0, "{axis} split limit must be greater than zero");

        let interval_count = usize::from(self.date_interval.is_some())
            + usize::from(self.integer_interval.is_some())
            + usize::from(self.float_interval.is_some());
        ensure!(
            interval_count <= 1,
            "{axis} split declares more than one bucketing interval"
        );

        if self.date_interval.is_some() && self.data_type != DataType::Timestamp {
            bail!(
                "{axis} split declares a date interval but field '{}' is {}",
                self.field_name,
                self.data_type
            );
        }
        if let Some(step) = self.integer_interval {
            if self.data_type != DataType::Integer {
                bail!(
                    "{axis} split declares an integer interval but field '{}' is {}",
                    self.field_name,
                    self.data_type
                );
            }
            ensure!(step > 0, "{axis} split integer interval must be positive");
        }
        if let Some(step) = self.float_interval {
            if self.data_type != DataType::Float {
                bail!(
                    "{axis} split declares a float interval but field '{}' is {}",
                    self.field_name,
                    self.data_type
                );
            }
            ensure!(step > 0.0, "{axis} split float interval must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisQuery {
    pub aggregation: Aggregation,
    pub row_split: Split,
    pub column_split: Split,
}

impl AnalysisQuery {
    pub fn validate(&self) -> Result<()> {
        self.row_split.validate("row")?;
        self.column_split.validate("column")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(data_type: DataType, limit: u32) -> Split {
        Split {
            field_name: "f".to_string(),
            data_type,
            limit,
            sort_order: SortOrder::Ascending,
            date_interval: None,
            integer_interval: None,
            float_interval: None,
        }
    }

    fn query() -> AnalysisQuery {
        AnalysisQuery {
            aggregation: Aggregation {
                kind: AggregationKind::Sum,
                field_name: "value".to_string(),
                data_type: DataType::Integer,
            },
            row_split: split(DataType::Text, 10),
            column_split: split(DataType::Timestamp, 4),
        }
    }

    #[test]
    fn enums_serialize_by_uppercase_name() {
        assert_eq!(
            serde_json::to_value(AggregationKind::Average).unwrap(),
            serde_json::json!("AVERAGE")
        );
        assert_eq!(
            serde_json::to_value(SortOrder::Descending).unwrap(),
            serde_json::json!("DESCENDING")
        );
        assert_eq!(
            serde_json::to_value(DateInterval::Quarter).unwrap(),
            serde_json::json!("QUARTER")
        );
    }

    #[test]
    fn absent_date_interval_serializes_as_null() {
        let encoded = serde_json::to_value(split(DataType::Text, 1)).unwrap();
        assert_eq!(encoded.get("dateInterval"), Some(&serde_json::Value::Null));
    }

    #[test]
    fn query_json_round_trips() {
        let mut q = query();
        q.column_split.date_interval = Some(DateInterval::Quarter);
        let encoded = serde_json::to_string(&q).unwrap();
        let decoded: AnalysisQuery = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, q);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let mut q = query();
        q.row_split.limit = 0;
        let err = q.validate().unwrap_err().to_string();
        assert!(err.contains("row split limit must be greater than zero"));
    }

    #[test]
    fn interval_must_match_data_type() {
        let mut q = query();
        q.row_split.date_interval = Some(DateInterval::Day);
        assert!(q.validate().is_err());

        let mut q = query();
        q.column_split.integer_interval = Some(10);
        assert!(q.validate().is_err());

        let mut q = query();
        q.row_split.integer_interval = Some(0);
        q.row_split.data_type = DataType::Integer;
        assert!(q.validate().is_err());
    }

    #[test]
    fn single_matching_interval_is_accepted() {
        let mut q = query();
        q.column_split.date_interval = Some(DateInterval::Month);
        q.row_split.data_type = DataType::Integer;
        q.row_split.integer_interval = Some(100);
        q.validate().unwrap();
    }
}
