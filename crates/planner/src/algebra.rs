//! Relational-algebra operator tokens and expression-argument helpers.
//!
//! Plan expressions are flat operator strings in the frontend's calcite
//! style, e.g. `LogicalSort(sort0=[$0], dir0=[ASC], fetch=[10])`. The core
//! only ever interprets the leading operator token and a handful of
//! arguments (fetch counts, table names); everything else is passed through
//! opaquely to the compute backend.

/// Projection operator token.
pub const LOGICAL_PROJECT: &str = "LogicalProject";
/// Filter operator token.
pub const LOGICAL_FILTER: &str = "LogicalFilter";
/// Plain table-scan operator token.
pub const LOGICAL_TABLE_SCAN: &str = "LogicalTableScan";
/// Scan-with-pushdown operator token.
pub const BINDABLE_TABLE_SCAN: &str = "BindableTableScan";
/// Sort operator token (rewritten, never instantiated).
pub const LOGICAL_SORT: &str = "LogicalSort";
/// Aggregate operator token (rewritten, never instantiated).
pub const LOGICAL_AGGREGATE: &str = "LogicalAggregate";
/// Join operator token (rewritten, never instantiated).
pub const LOGICAL_JOIN: &str = "LogicalJoin";
/// Union operator token.
pub const LOGICAL_UNION: &str = "LogicalUnion";
/// Limit operator token.
pub const LOGICAL_LIMIT: &str = "LogicalLimit";
/// Sorted-merge stage token introduced by the sort rewrite.
pub const LOGICAL_MERGE: &str = "LogicalMerge";
/// Distributed partition stage token.
pub const LOGICAL_PARTITION: &str = "LogicalPartition";
/// Single-node partition stage token.
pub const LOGICAL_SINGLE_NODE_PARTITION: &str = "LogicalSingleNodePartition";
/// Distributed sort-and-sample stage token.
pub const LOGICAL_SORT_AND_SAMPLE: &str = "LogicalSortAndSample";
/// Single-node sort-and-sample stage token.
pub const LOGICAL_SINGLE_NODE_SORT_AND_SAMPLE: &str = "LogicalSingleNodeSortAndSample";
/// Partial-aggregation stage token.
pub const LOGICAL_COMPUTE_AGGREGATE: &str = "LogicalComputeAggregate";
/// Aggregate-distribution stage token.
pub const LOGICAL_DISTRIBUTE_AGGREGATE: &str = "LogicalDistributeAggregate";
/// Aggregate-merge stage token.
pub const LOGICAL_MERGE_AGGREGATE: &str = "LogicalMergeAggregate";
/// Pairwise-join stage token.
pub const LOGICAL_PARTWISE_JOIN: &str = "LogicalPartwiseJoin";
/// Join co-partitioning stage token.
pub const LOGICAL_JOIN_PARTITION: &str = "LogicalJoinPartition";

/// The leading operator token of an expression: everything before the first
/// `(` (or the whole string when no arguments follow).
#[must_use]
pub fn leading_operator(expression: &str) -> &str {
    let trimmed = expression.trim_start();
    match trimmed.find('(') {
        Some(idx) => trimmed[..idx].trim_end(),
        None => trimmed.trim_end(),
    }
}

/// Whether the expression's leading token equals `operator` exactly.
///
/// Exact equality matters: `LogicalSort` must not match
/// `LogicalSortAndSample`.
#[must_use]
pub fn is_operator(expression: &str, operator: &str) -> bool {
    leading_operator(expression) == operator
}

/// Replace only the leading operator token, preserving every argument.
#[must_use]
pub fn replace_operator(expression: &str, from: &str, to: &str) -> String {
    let trimmed = expression.trim_start();
    if let Some(rest) = trimmed.strip_prefix(from) {
        format!("{to}{rest}")
    } else {
        expression.to_string()
    }
}

/// Whether a sort expression carries only a `fetch` limit and no ordering
/// columns.
#[must_use]
pub fn has_limit_only(expression: &str) -> bool {
    !expression.contains("sort0") && expression.contains("fetch=")
}

/// The row count of a `fetch=[n]` argument, if present.
#[must_use]
pub fn limit_rows(expression: &str) -> Option<u64> {
    let start = expression.find("fetch=[")? + "fetch=[".len();
    let rest = &expression[start..];
    let end = rest.find(']')?;
    rest[..end].trim().parse().ok()
}

/// The table name of a scan expression's `table=[[name]]` argument.
#[must_use]
pub fn table_name(expression: &str) -> Option<&str> {
    let start = expression.find("table=[[")? + "table=[[".len();
    let rest = &expression[start..];
    let end = rest.find("]]")?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_operator_stops_at_arguments() {
        assert_eq!(leading_operator("LogicalFilter(condition=[>($0, 3)])"), "LogicalFilter");
        assert_eq!(leading_operator("LogicalUnion"), "LogicalUnion");
        assert_eq!(leading_operator("  LogicalLimit(fetch=[5])"), "LogicalLimit");
    }

    #[test]
    fn operator_match_is_exact() {
        assert!(is_operator("LogicalSort(sort0=[$0])", LOGICAL_SORT));
        assert!(!is_operator("LogicalSortAndSample(sort0=[$0])", LOGICAL_SORT));
    }

    #[test]
    fn replace_keeps_arguments_intact() {
        let rewritten = replace_operator(
            "LogicalSort(sort0=[$0], dir0=[ASC], fetch=[10])",
            LOGICAL_SORT,
            LOGICAL_MERGE,
        );
        assert_eq!(rewritten, "LogicalMerge(sort0=[$0], dir0=[ASC], fetch=[10])");
    }

    #[test]
    fn limit_only_detection_and_fetch_parsing() {
        assert!(has_limit_only("LogicalSort(fetch=[10])"));
        assert!(!has_limit_only("LogicalSort(sort0=[$0], dir0=[ASC], fetch=[10])"));
        assert_eq!(limit_rows("LogicalLimit(fetch=[10])"), Some(10));
        assert_eq!(limit_rows("LogicalLimit(offset=[2])"), None);
    }

    #[test]
    fn table_name_extraction() {
        assert_eq!(
            table_name("LogicalTableScan(table=[[orders]])"),
            Some("orders")
        );
        assert_eq!(
            table_name("BindableTableScan(table=[[lineitem]], projects=[[0, 2]])"),
            Some("lineitem")
        );
        assert_eq!(table_name("LogicalFilter(condition=[true])"), None);
    }
}
