//! Translation of an [`AnalysisQuery`] into columnar-store SQL.
//!
//! Dialect specifics (aggregation function names, date truncation, numeric
//! bucketing) are confined to small translation tables so the emitted shape
//! stays readable: one grouped select over both split expressions, with a
//! correlated top-N subquery restricting the row axis by aggregated value.

use anyhow::{Result, ensure};

use crate::query::{Aggregation, AggregationKind, AnalysisQuery, DateInterval, Split};

/// Quotes an identifier in backticks, rejecting any identifier that could
/// break out of the quoting.
pub fn quote_identifier(identifier: &str) -> Result<String> {
    ensure!(
        !identifier.contains('`'),
        "invalid identifier '{identifier}': backticks are not allowed"
    );
    Ok(format!("`{identifier}`"))
}

fn aggregation_function(kind: AggregationKind) -> &'static str {
    match kind {
        AggregationKind::Sum => "sum",
        AggregationKind::Average => "avg",
        AggregationKind::Min => "min",
        AggregationKind::Max => "max",
        AggregationKind::Count => "count",
    }
}

fn date_truncation_function(interval: DateInterval) -> &'static str {
    match interval {
        DateInterval::Year => "toStartOfYear",
        DateInterval::Quarter => "toStartOfQuarter",
        DateInterval::Month => "toStartOfMonth",
        DateInterval::Week => "toStartOfWeek",
        DateInterval::Day => "toStartOfDay",
    }
}

/// The split's field with its bucketing interval applied, or the bare
/// quoted field when no interval is declared.
fn split_expression(split: &Split) -> Result<String> {
    let field = quote_identifier(&split.field_name)?;
    let expression = if let Some(interval) = split.date_interval {
        format!("{}({field})", date_truncation_function(interval))
    } else if let Some(step) = split.integer_interval {
        format!("intDiv({field}, {step}) * {step}")
    } else if let Some(step) = split.float_interval {
        format!("floor({field} / {step}) * {step}")
    } else {
        field
    };
    Ok(expression)
}

fn aggregation_expression(aggregation: &Aggregation) -> Result<String> {
    if aggregation.kind == AggregationKind::Count {
        return Ok("count()".to_string());
    }
    let field = quote_identifier(&aggregation.field_name)?;
    Ok(format!("{}({field})", aggregation_function(aggregation.kind)))
}

/// Emits the pivot SQL for `query` against `table`.
///
/// The row axis is restricted to the top N values by aggregation, always
/// descending regardless of the row split's declared sort order; the column
/// axis is left unordered and uncapped here, since the result builder owns
/// column ordering and truncation.
pub fn compile_analysis_query(query: &AnalysisQuery, table: &str) -> Result<String> {
    query.validate()?;

    let table = quote_identifier(table)?;
    let row_field = quote_identifier(&query.row_split.field_name)?;
    let row_expr = split_expression(&query.row_split)?;
    let column_expr = split_expression(&query.column_split)?;
    let agg_expr = aggregation_expression(&query.aggregation)?;
    let row_limit = query.row_split.limit;

    Ok(format!(
        "SELECT {row_expr} AS row_split, {column_expr} AS column_split, {agg_expr} AS aggregation \
         FROM {table} \
         WHERE row_split IN (\
         SELECT {row_field} FROM {table} \
         GROUP BY {row_field} \
         ORDER BY {agg_expr} DESC \
         LIMIT {row_limit}) \
         GROUP BY column_split, row_split"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortOrder;
    use crate::value::DataType;

    fn split(field: &str, data_type: DataType, limit: u32) -> Split {
        Split {
            field_name: field.to_string(),
            data_type,
            limit,
            sort_order: SortOrder::Ascending,
            date_interval: None,
            integer_interval: None,
            float_interval: None,
        }
    }

    fn quarterly_sales_query() -> AnalysisQuery {
        let mut column_split = split("date", DataType::Timestamp, 4);
        column_split.date_interval = Some(DateInterval::Quarter);
        AnalysisQuery {
            aggregation: Aggregation {
                kind: AggregationKind::Sum,
                field_name: "value".to_string(),
                data_type: DataType::Integer,
            },
            row_split: split("region", DataType::Text, 2),
            column_split,
        }
    }

    #[test]
    fn emits_top_n_row_subquery_and_quarter_bucketing() {
        let sql = compile_analysis_query(&quarterly_sales_query(), "sales").unwrap();
        assert!(sql.contains("toStartOfQuarter(`date`) AS column_split"), "{sql}");
        assert!(
            sql.contains(
                "WHERE row_split IN (SELECT `region` FROM `sales` GROUP BY `region` \
                 ORDER BY sum(`value`) DESC LIMIT 2)"
            ),
            "{sql}"
        );
        assert!(sql.ends_with("GROUP BY column_split, row_split"), "{sql}");
    }

    #[test]
    fn row_sort_order_does_not_reach_the_sql() {
        let mut query = quarterly_sales_query();
        query.row_split.sort_order = SortOrder::Ascending;
        let ascending = compile_analysis_query(&query, "sales").unwrap();
        query.row_split.sort_order = SortOrder::Descending;
        let descending = compile_analysis_query(&query, "sales").unwrap();
        assert_eq!(ascending, descending);
        assert!(ascending.contains("DESC LIMIT 2"));
    }

    #[test]
    fn numeric_intervals_bucket_by_floor_division() {
        let mut query = quarterly_sales_query();
        query.row_split = split("age", DataType::Integer, 5);
        query.row_split.integer_interval = Some(10);
        query.column_split = split("score", DataType::Float, 5);
        query.column_split.float_interval = Some(0.5);

        let sql = compile_analysis_query(&query, "people").unwrap();
        assert!(sql.contains("intDiv(`age`, 10) * 10 AS row_split"), "{sql}");
        assert!(sql.contains("floor(`score` / 0.5) * 0.5 AS column_split"), "{sql}");
    }

    #[test]
    fn count_emits_bare_count() {
        let mut query = quarterly_sales_query();
        query.aggregation.kind = AggregationKind::Count;
        let sql = compile_analysis_query(&query, "sales").unwrap();
        assert!(sql.contains("count() AS aggregation"), "{sql}");
        assert!(sql.contains("ORDER BY count() DESC"), "{sql}");
    }

    #[test]
    fn backticked_identifiers_are_rejected_before_emission() {
        let query = quarterly_sales_query();
        let err = compile_analysis_query(&query, "`evil`").unwrap_err().to_string();
        assert!(err.contains("invalid identifier"), "{err}");

        let mut query = quarterly_sales_query();
        query.aggregation.field_name = "va`lue".to_string();
        assert!(compile_analysis_query(&query, "sales").is_err());
    }

    #[test]
    fn zero_limit_fails_compilation() {
        let mut query = quarterly_sales_query();
        query.column_split.limit = 0;
        assert!(compile_analysis_query(&query, "sales").is_err());
    }

    #[test]
    fn emitted_identifiers_contain_no_stray_backticks() {
        let sql = compile_analysis_query(&quarterly_sales_query(), "sales").unwrap();
        // Backticks only ever appear in balanced pairs around identifiers.
        assert_eq!(sql.matches('`').count() % 2, 0);
    }
}
