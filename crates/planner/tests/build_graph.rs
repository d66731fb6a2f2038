//! Graph-construction shapes and per-edge cache policies.

use std::sync::Arc;

use dfq_cache::CacheKind;
use dfq_common::config::{FLOW_CONTROL_BATCHES_THRESHOLD, FLOW_CONTROL_BYTES_THRESHOLD};
use dfq_common::{DfqError, EngineOptions, NodeId};
use dfq_execution::testing::{TestCompute, int_batch, int_schema};
use dfq_execution::{Edge, ExecutionContext, KernelKind, MemoryLoader, QueryGraph};
use dfq_planner::GraphBuilder;
use dfq_transport::LoopbackExchange;

fn builder(total_nodes: usize, node: u32, options: EngineOptions) -> GraphBuilder {
    let ctx = ExecutionContext::new(total_nodes, NodeId(node), options);
    let loader = || {
        Box::new(MemoryLoader::new(
            int_schema(),
            vec![int_batch(&[1, 2, 3])],
        )) as Box<dyn dfq_execution::DataLoader>
    };
    let mut b = GraphBuilder::new(ctx, TestCompute::shared())
        .with_table("t", loader())
        .with_table("a", loader())
        .with_table("b", loader());
    if total_nodes > 1 {
        let exchange = LoopbackExchange::new(total_nodes);
        b = b.with_transport(
            Arc::new(exchange.client(NodeId(node))),
            exchange.queue(NodeId(node)).unwrap(),
        );
    }
    b
}

fn kinds(graph: &QueryGraph) -> Vec<KernelKind> {
    graph.kernels().iter().map(|k| k.kind()).collect()
}

fn edge<'g>(graph: &'g QueryGraph, source: KernelKind, target: KernelKind) -> &'g Edge {
    graph
        .edges()
        .iter()
        .find(|e| {
            graph.kernel(e.source).unwrap().kind() == source
                && graph.kernel(e.target).unwrap().kind() == target
        })
        .unwrap_or_else(|| panic!("no edge {source} -> {target}"))
}

const FILTER_PLAN: &str = r#"{
    "expr": "LogicalFilter(condition=[>($0, 3)])",
    "children": [{"expr": "LogicalTableScan(table=[[t]])", "children": []}]
}"#;

#[test]
fn filter_over_scan_takes_a_concatenating_edge() {
    let graph = builder(1, 0, EngineOptions::new()).build(FILTER_PLAN).unwrap();
    assert_eq!(kinds(&graph), vec![KernelKind::Filter, KernelKind::TableScan]);
    assert_eq!(graph.edges().len(), 1);

    let e = edge(&graph, KernelKind::TableScan, KernelKind::Filter);
    let config = e.channel.config();
    assert_eq!(config.kind, CacheKind::Concatenating);
    assert_eq!(config.flow_control_bytes_threshold, 400_000_000);
    assert_eq!(config.flow_control_batches_threshold, 0);
}

#[test]
fn single_node_sort_builds_the_four_stage_pipeline() {
    let graph = builder(1, 0, EngineOptions::new())
        .build(
            r#"{
                "expr": "LogicalSort(sort0=[$0], dir0=[ASC])",
                "children": [{"expr": "LogicalTableScan(table=[[t]])", "children": []}]
            }"#,
        )
        .unwrap();
    assert_eq!(
        kinds(&graph),
        vec![
            KernelKind::Limit,
            KernelKind::MergeStream,
            KernelKind::PartitionSingleNode,
            KernelKind::SortAndSampleSingleNode,
            KernelKind::TableScan,
        ]
    );

    // Sorted runs and samples travel on parallel a/b edges.
    let a = graph
        .edges()
        .iter()
        .find(|e| e.source_port == "output_a")
        .expect("output_a edge");
    assert_eq!(a.target_port, "input_a");
    assert_eq!(a.channel.config().kind, CacheKind::Simple);
    let b = graph
        .edges()
        .iter()
        .find(|e| e.source_port == "output_b")
        .expect("output_b edge");
    assert_eq!(b.target_port, "input_b");

    let fan_out = edge(&graph, KernelKind::PartitionSingleNode, KernelKind::MergeStream);
    assert_eq!(fan_out.channel.config().kind, CacheKind::ForEach);
    assert_eq!(fan_out.channel.num_partitions(), 8);
}

#[test]
fn sort_with_limit_only_adds_no_extra_stages() {
    let graph = builder(1, 0, EngineOptions::new())
        .build(
            r#"{
                "expr": "LogicalSort(fetch=[10])",
                "children": [{"expr": "LogicalTableScan(table=[[t]])", "children": []}]
            }"#,
        )
        .unwrap();
    assert_eq!(kinds(&graph), vec![KernelKind::Limit, KernelKind::TableScan]);
}

const AGGREGATE_PLAN: &str = r#"{
    "expr": "LogicalAggregate(group=[{0}], agg#0=[SUM($1)])",
    "children": [{"expr": "LogicalTableScan(table=[[t]])", "children": []}]
}"#;

#[test]
fn aggregate_gains_distribution_stage_only_on_multi_node_clusters() {
    let single = builder(1, 0, EngineOptions::new()).build(AGGREGATE_PLAN).unwrap();
    assert_eq!(
        kinds(&single),
        vec![
            KernelKind::MergeAggregate,
            KernelKind::ComputeAggregate,
            KernelKind::TableScan,
        ]
    );

    let multi = builder(3, 0, EngineOptions::new()).build(AGGREGATE_PLAN).unwrap();
    assert_eq!(
        kinds(&multi),
        vec![
            KernelKind::MergeAggregate,
            KernelKind::DistributeAggregate,
            KernelKind::ComputeAggregate,
            KernelKind::TableScan,
        ]
    );
}

const JOIN_PLAN: &str = r#"{
    "expr": "LogicalJoin(condition=[=($0, $1)], joinType=[inner])",
    "children": [
        {"expr": "LogicalTableScan(table=[[a]])", "children": []},
        {"expr": "LogicalTableScan(table=[[b]])", "children": []}
    ]
}"#;

#[test]
fn multi_node_join_feeds_pairwise_join_through_join_partition() {
    let graph = builder(2, 0, EngineOptions::new()).build(JOIN_PLAN).unwrap();
    assert_eq!(
        kinds(&graph),
        vec![
            KernelKind::PartwiseJoin,
            KernelKind::JoinPartition,
            KernelKind::TableScan,
            KernelKind::TableScan,
        ]
    );

    for (source_port, target_port) in [("output_a", "input_a"), ("output_b", "input_b")] {
        let e = graph
            .edges()
            .iter()
            .find(|e| e.source_port == source_port)
            .unwrap_or_else(|| panic!("no {source_port} edge"));
        assert_eq!(e.target_port, target_port);
        // Defaults are MAX/MAX: no axis may block, whatever the parent
        // reports.
        let config = e.channel.config();
        assert!(!config.batches_axis_blocks());
        assert!(!config.bytes_axis_blocks());
    }

    // The scans are the join-partition kernel's lettered n-ary inputs.
    let scan_edges: Vec<&Edge> = graph
        .edges()
        .iter()
        .filter(|e| graph.kernel(e.source).unwrap().kind() == KernelKind::TableScan)
        .collect();
    assert_eq!(scan_edges.len(), 2);
    assert_eq!(scan_edges[0].target_port, "input_a");
    assert_eq!(scan_edges[1].target_port, "input_b");
}

#[test]
fn single_node_plans_never_contain_distributed_kernels() {
    let plan = r#"{
        "expr": "LogicalSort(sort0=[$0], dir0=[ASC])",
        "children": [{
            "expr": "LogicalAggregate(group=[{0}], agg#0=[SUM($1)])",
            "children": [{
                "expr": "LogicalJoin(condition=[=($0, $1)], joinType=[inner])",
                "children": [
                    {"expr": "LogicalTableScan(table=[[a]])", "children": []},
                    {"expr": "LogicalTableScan(table=[[b]])", "children": []}
                ]
            }]
        }]
    }"#;
    let graph = builder(1, 0, EngineOptions::new()).build(plan).unwrap();
    for kind in kinds(&graph) {
        assert!(!matches!(
            kind,
            KernelKind::DistributeAggregate
                | KernelKind::JoinPartition
                | KernelKind::Partition
                | KernelKind::SortAndSample
        ));
    }
    // Rewriting preserves the leaf-scan multiset.
    let scans = kinds(&graph)
        .iter()
        .filter(|k| **k == KernelKind::TableScan)
        .count();
    assert_eq!(scans, 2);
}

#[test]
fn configuring_one_flow_control_axis_disables_the_other() {
    let mut options = EngineOptions::new();
    options.set(FLOW_CONTROL_BATCHES_THRESHOLD, "4");
    let plan = r#"{
        "expr": "LogicalProject(v=[$0])",
        "children": [{
            "expr": "LogicalFilter(condition=[>($0, 0)])",
            "children": [{"expr": "LogicalTableScan(table=[[t]])", "children": []}]
        }]
    }"#;
    let graph = builder(1, 0, options).build(plan).unwrap();

    let e = edge(&graph, KernelKind::Filter, KernelKind::Projection);
    let config = e.channel.config();
    assert_eq!(config.flow_control_batches_threshold, 4);
    assert_eq!(config.flow_control_bytes_threshold, 0);
    assert!(config.batches_axis_blocks());
    assert!(!config.bytes_axis_blocks());

    // The loading cache keeps the configured batch axis alongside its own
    // byte bound.
    let scan_edge = edge(&graph, KernelKind::TableScan, KernelKind::Filter);
    assert_eq!(scan_edge.channel.config().flow_control_batches_threshold, 4);
    assert_eq!(
        scan_edge.channel.config().flow_control_bytes_threshold,
        400_000_000
    );
}

#[test]
fn bytes_only_configuration_zeroes_the_batch_axis() {
    let mut options = EngineOptions::new();
    options.set(FLOW_CONTROL_BYTES_THRESHOLD, "1048576");
    let plan = r#"{
        "expr": "LogicalProject(v=[$0])",
        "children": [{
            "expr": "LogicalFilter(condition=[>($0, 0)])",
            "children": [{"expr": "LogicalTableScan(table=[[t]])", "children": []}]
        }]
    }"#;
    let graph = builder(1, 0, options).build(plan).unwrap();
    let config = edge(&graph, KernelKind::Filter, KernelKind::Projection)
        .channel
        .config();
    assert_eq!(config.flow_control_batches_threshold, 0);
    assert_eq!(config.flow_control_bytes_threshold, 1_048_576);
}

#[test]
fn unknown_operator_tokens_fail_the_build() {
    let err = builder(1, 0, EngineOptions::new())
        .build(r#"{"expr": "LogicalWindow(window#0=[...])", "children": []}"#)
        .unwrap_err();
    assert!(matches!(err, DfqError::InvalidAlgebra(_)));

    let err = builder(1, 0, EngineOptions::new())
        .build("{not json")
        .unwrap_err();
    assert!(matches!(err, DfqError::InvalidAlgebra(_)));
}
