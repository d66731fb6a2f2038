//! Logical-to-distributed plan rewriting.
//!
//! The frontend emits single-node logical operators; this pass decomposes
//! `LogicalSort`, `LogicalAggregate`, and `LogicalJoin` into their
//! multi-stage streaming pipelines, keyed on cluster cardinality. Rewrites
//! replace only the leading operator token of each expression, so every
//! stage of a pipeline still carries the original arguments.
//!
//! The pass is idempotent: after one application no rewritable token
//! remains, and stage tokens are never rewritten again.

use serde::{Deserialize, Serialize};

use crate::algebra::{
    LOGICAL_AGGREGATE, LOGICAL_COMPUTE_AGGREGATE, LOGICAL_DISTRIBUTE_AGGREGATE, LOGICAL_JOIN,
    LOGICAL_JOIN_PARTITION, LOGICAL_LIMIT, LOGICAL_MERGE, LOGICAL_MERGE_AGGREGATE,
    LOGICAL_PARTITION, LOGICAL_PARTWISE_JOIN, LOGICAL_SINGLE_NODE_PARTITION,
    LOGICAL_SINGLE_NODE_SORT_AND_SAMPLE, LOGICAL_SORT, LOGICAL_SORT_AND_SAMPLE, has_limit_only,
    is_operator, replace_operator,
};

/// One node of the plan tree: an operator expression over ordered children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanNode {
    /// Flat operator expression, e.g. `LogicalFilter(condition=[>($0, 3)])`.
    pub expr: String,
    /// Ordered inputs; the first child is the left input.
    #[serde(default)]
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    /// Leaf node with no children.
    #[must_use]
    pub fn leaf(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            children: Vec::new(),
        }
    }

    /// Node over ordered children.
    #[must_use]
    pub fn new(expr: impl Into<String>, children: Vec<PlanNode>) -> Self {
        Self {
            expr: expr.into(),
            children,
        }
    }
}

/// Rewrite a plan tree in place for a cluster of `total_nodes`.
pub fn rewrite_plan(node: &mut PlanNode, total_nodes: usize) {
    let single_node = total_nodes <= 1;
    if is_operator(&node.expr, LOGICAL_SORT) {
        rewrite_sort(node, single_node);
    } else if is_operator(&node.expr, LOGICAL_AGGREGATE) {
        rewrite_aggregate(node, single_node);
    } else if is_operator(&node.expr, LOGICAL_JOIN) {
        rewrite_join(node, single_node);
    }
    for child in &mut node.children {
        rewrite_plan(child, total_nodes);
    }
}

/// `LogicalSort` with only a fetch collapses to `LogicalLimit`; otherwise it
/// becomes the four-stage order-by pipeline
/// `LIMIT -> MERGE -> PARTITION -> SORT_AND_SAMPLE`.
fn rewrite_sort(node: &mut PlanNode, single_node: bool) {
    if has_limit_only(&node.expr) {
        node.expr = replace_operator(&node.expr, LOGICAL_SORT, LOGICAL_LIMIT);
        return;
    }
    let (partition_token, sample_token) = if single_node {
        (LOGICAL_SINGLE_NODE_PARTITION, LOGICAL_SINGLE_NODE_SORT_AND_SAMPLE)
    } else {
        (LOGICAL_PARTITION, LOGICAL_SORT_AND_SAMPLE)
    };
    let sample = PlanNode::new(
        replace_operator(&node.expr, LOGICAL_SORT, sample_token),
        std::mem::take(&mut node.children),
    );
    let partition = PlanNode::new(
        replace_operator(&node.expr, LOGICAL_SORT, partition_token),
        vec![sample],
    );
    let merge = PlanNode::new(
        replace_operator(&node.expr, LOGICAL_SORT, LOGICAL_MERGE),
        vec![partition],
    );
    node.expr = replace_operator(&node.expr, LOGICAL_SORT, LOGICAL_LIMIT);
    node.children = vec![merge];
}

/// `LogicalAggregate` becomes `MERGE_AGGREGATE -> COMPUTE_AGGREGATE`, with a
/// `DISTRIBUTE_AGGREGATE` stage in between on multi-node clusters.
fn rewrite_aggregate(node: &mut PlanNode, single_node: bool) {
    let compute = PlanNode::new(
        replace_operator(&node.expr, LOGICAL_AGGREGATE, LOGICAL_COMPUTE_AGGREGATE),
        std::mem::take(&mut node.children),
    );
    let below_merge = if single_node {
        compute
    } else {
        PlanNode::new(
            replace_operator(&node.expr, LOGICAL_AGGREGATE, LOGICAL_DISTRIBUTE_AGGREGATE),
            vec![compute],
        )
    };
    node.expr = replace_operator(&node.expr, LOGICAL_AGGREGATE, LOGICAL_MERGE_AGGREGATE);
    node.children = vec![below_merge];
}

/// `LogicalJoin` becomes `PARTWISE_JOIN`, over a `JOIN_PARTITION` stage on
/// multi-node clusters.
fn rewrite_join(node: &mut PlanNode, single_node: bool) {
    if single_node {
        node.expr = replace_operator(&node.expr, LOGICAL_JOIN, LOGICAL_PARTWISE_JOIN);
        return;
    }
    let partition = PlanNode::new(
        replace_operator(&node.expr, LOGICAL_JOIN, LOGICAL_JOIN_PARTITION),
        std::mem::take(&mut node.children),
    );
    node.expr = replace_operator(&node.expr, LOGICAL_JOIN, LOGICAL_PARTWISE_JOIN);
    node.children = vec![partition];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exprs_preorder(node: &PlanNode, out: &mut Vec<String>) {
        out.push(node.expr.clone());
        for child in &node.children {
            exprs_preorder(child, out);
        }
    }

    fn chain(node: &PlanNode) -> Vec<String> {
        let mut out = Vec::new();
        exprs_preorder(node, &mut out);
        out
    }

    #[test]
    fn sort_with_limit_only_collapses_to_limit() {
        let mut plan = PlanNode::new(
            "LogicalSort(fetch=[10])",
            vec![PlanNode::leaf("LogicalTableScan(table=[[t]])")],
        );
        rewrite_plan(&mut plan, 1);
        assert_eq!(
            chain(&plan),
            vec!["LogicalLimit(fetch=[10])", "LogicalTableScan(table=[[t]])"]
        );
    }

    #[test]
    fn sort_expands_to_single_node_pipeline() {
        let mut plan = PlanNode::new(
            "LogicalSort(sort0=[$0], dir0=[ASC], fetch=[5])",
            vec![PlanNode::leaf("LogicalTableScan(table=[[t]])")],
        );
        rewrite_plan(&mut plan, 1);
        assert_eq!(
            chain(&plan),
            vec![
                "LogicalLimit(sort0=[$0], dir0=[ASC], fetch=[5])",
                "LogicalMerge(sort0=[$0], dir0=[ASC], fetch=[5])",
                "LogicalSingleNodePartition(sort0=[$0], dir0=[ASC], fetch=[5])",
                "LogicalSingleNodeSortAndSample(sort0=[$0], dir0=[ASC], fetch=[5])",
                "LogicalTableScan(table=[[t]])",
            ]
        );
    }

    #[test]
    fn sort_expands_to_distributed_pipeline() {
        let mut plan = PlanNode::new(
            "LogicalSort(sort0=[$0], dir0=[ASC])",
            vec![PlanNode::leaf("LogicalTableScan(table=[[t]])")],
        );
        rewrite_plan(&mut plan, 3);
        assert_eq!(
            chain(&plan),
            vec![
                "LogicalLimit(sort0=[$0], dir0=[ASC])",
                "LogicalMerge(sort0=[$0], dir0=[ASC])",
                "LogicalPartition(sort0=[$0], dir0=[ASC])",
                "LogicalSortAndSample(sort0=[$0], dir0=[ASC])",
                "LogicalTableScan(table=[[t]])",
            ]
        );
    }

    #[test]
    fn aggregate_is_two_stage_on_one_node_and_three_stage_on_many() {
        let agg = "LogicalAggregate(group=[{0}], agg#0=[SUM($1)])";
        let mut single = PlanNode::new(agg, vec![PlanNode::leaf("LogicalTableScan(table=[[t]])")]);
        rewrite_plan(&mut single, 1);
        assert_eq!(
            chain(&single),
            vec![
                "LogicalMergeAggregate(group=[{0}], agg#0=[SUM($1)])",
                "LogicalComputeAggregate(group=[{0}], agg#0=[SUM($1)])",
                "LogicalTableScan(table=[[t]])",
            ]
        );

        let mut multi = PlanNode::new(agg, vec![PlanNode::leaf("LogicalTableScan(table=[[t]])")]);
        rewrite_plan(&mut multi, 3);
        assert_eq!(
            chain(&multi),
            vec![
                "LogicalMergeAggregate(group=[{0}], agg#0=[SUM($1)])",
                "LogicalDistributeAggregate(group=[{0}], agg#0=[SUM($1)])",
                "LogicalComputeAggregate(group=[{0}], agg#0=[SUM($1)])",
                "LogicalTableScan(table=[[t]])",
            ]
        );
    }

    #[test]
    fn join_keeps_children_on_one_node_and_gains_partition_stage_on_many() {
        let join = "LogicalJoin(condition=[=($0, $2)], joinType=[inner])";
        let scans = || {
            vec![
                PlanNode::leaf("LogicalTableScan(table=[[a]])"),
                PlanNode::leaf("LogicalTableScan(table=[[b]])"),
            ]
        };

        let mut single = PlanNode::new(join, scans());
        rewrite_plan(&mut single, 1);
        assert_eq!(
            chain(&single),
            vec![
                "LogicalPartwiseJoin(condition=[=($0, $2)], joinType=[inner])",
                "LogicalTableScan(table=[[a]])",
                "LogicalTableScan(table=[[b]])",
            ]
        );

        let mut multi = PlanNode::new(join, scans());
        rewrite_plan(&mut multi, 2);
        assert_eq!(
            chain(&multi),
            vec![
                "LogicalPartwiseJoin(condition=[=($0, $2)], joinType=[inner])",
                "LogicalJoinPartition(condition=[=($0, $2)], joinType=[inner])",
                "LogicalTableScan(table=[[a]])",
                "LogicalTableScan(table=[[b]])",
            ]
        );
    }

    #[test]
    fn rewrite_is_idempotent() {
        let mut plan = PlanNode::new(
            "LogicalSort(sort0=[$0], dir0=[ASC])",
            vec![PlanNode::new(
                "LogicalAggregate(group=[{0}], agg#0=[COUNT()])",
                vec![PlanNode::new(
                    "LogicalJoin(condition=[=($0, $1)], joinType=[inner])",
                    vec![
                        PlanNode::leaf("LogicalTableScan(table=[[a]])"),
                        PlanNode::leaf("LogicalTableScan(table=[[b]])"),
                    ],
                )],
            )],
        );
        rewrite_plan(&mut plan, 2);
        let once = plan.clone();
        rewrite_plan(&mut plan, 2);
        assert_eq!(plan, once);
        for expr in chain(&plan) {
            assert!(!expr.starts_with("LogicalSort("));
            assert!(!expr.starts_with("LogicalAggregate("));
            assert!(!expr.starts_with("LogicalJoin("));
        }
    }

    #[test]
    fn plan_trees_round_trip_through_json() {
        let json = r#"{"expr":"LogicalFilter(condition=[>($0, 3)])","children":[{"expr":"LogicalTableScan(table=[[t]])","children":[]}]}"#;
        let plan: PlanNode = serde_json::from_str(json).unwrap();
        assert_eq!(plan.children.len(), 1);
        let back = serde_json::to_string(&plan).unwrap();
        assert_eq!(back, json);
    }
}
