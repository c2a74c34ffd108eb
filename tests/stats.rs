use affinity_rs::test_support::{clique_workload, FixedGraphSource};
use affinity_rs::{
    AccessDetail, AffinityConfig, AffinityGraph, AffinityGroupFinder, EdgeKey, GraphBuilder,
    GroupFinderStats, Identity, LocalGraphBuilder, ObjectId, RunStatus,
};
use std::sync::Arc;

fn config(stop_iteration: u32) -> AffinityConfig {
    AffinityConfig::new(2000, 4, stop_iteration).unwrap()
}

#[test]
fn run_counters_stay_consistent_across_statuses() -> anyhow::Result<()> {
    let builder = LocalGraphBuilder::weighted(config(20));
    for (owner, detail) in clique_workload(&[[1, 2, 3].as_slice()]) {
        builder.update_graph(owner, &detail)?;
    }
    let finder = builder.group_finder().unwrap();

    // Two successful runs, then a cancelled (failed) one.
    assert_eq!(finder.find_affinity_groups()?.status, RunStatus::Succeeded);
    assert_eq!(finder.find_affinity_groups()?.status, RunStatus::Succeeded);
    finder.cancel();
    assert_eq!(finder.find_affinity_groups()?.status, RunStatus::Failed);

    let stats = finder.stats();
    assert_eq!(
        stats.number_runs(),
        stats.number_succeeded() + stats.number_failures() + stats.number_stopped()
    );
    assert_eq!(stats.number_runs(), 3);
    assert_eq!(stats.number_succeeded(), 2);
    assert_eq!(stats.number_failures(), 1);
    assert!(stats.avg_run_time_ms() <= stats.max_run_time_ms());
    assert!(stats.avg_iterations() <= stats.max_iterations());
    Ok(())
}

#[test]
fn stopped_runs_do_not_touch_success_aggregates() -> anyhow::Result<()> {
    let mut graph = AffinityGraph::new();
    graph.add_edge(EdgeKey::new(Identity(1), Identity(2)).unwrap(), 1);
    let config = config(5);
    let finder = AffinityGroupFinder::new(
        Arc::new(FixedGraphSource::new(graph)),
        Arc::new(GroupFinderStats::new(&config)),
        config.stop_iteration,
    );

    assert_eq!(finder.find_affinity_groups()?.status, RunStatus::Stopped);

    let stats = finder.stats();
    assert_eq!(stats.number_stopped(), 1);
    assert_eq!(stats.number_runs(), 1);
    assert_eq!(stats.number_groups(), 0);
    assert_eq!(stats.max_iterations(), 0);
    assert_eq!(stats.max_run_time_ms(), 0);
    Ok(())
}

#[test]
fn snapshots_expose_immutable_configuration() -> anyhow::Result<()> {
    let builder = LocalGraphBuilder::weighted(config(15));
    let builder_snapshot = builder.stats_snapshot();
    assert_eq!(builder_snapshot.snapshot_count, 4);
    assert_eq!(builder_snapshot.snapshot_period_ms, 2000);

    let finder = builder.group_finder().unwrap();
    let finder_snapshot = finder.stats().snapshot();
    assert_eq!(finder_snapshot.stop_iteration, 15);
    assert_eq!(finder.stop_iteration(), 15);
    Ok(())
}

#[test]
fn group_count_reflects_latest_successful_run() -> anyhow::Result<()> {
    let builder = LocalGraphBuilder::weighted(config(20));
    for (owner, detail) in clique_workload(&[[1, 2, 3].as_slice(), [4, 5, 6].as_slice()]) {
        builder.update_graph(owner, &detail)?;
    }
    let finder = builder.group_finder().unwrap();

    let result = finder.find_affinity_groups()?;
    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(finder.stats().number_groups(), 2);

    let record = finder.last_run().expect("run recorded");
    assert_eq!(record.status, RunStatus::Succeeded);
    assert_eq!(record.groups, result.groups.len());
    Ok(())
}

#[test]
fn processing_time_accumulates_with_work() -> anyhow::Result<()> {
    let builder = LocalGraphBuilder::weighted(config(10));
    let detail: AccessDetail = (0..64u64).map(ObjectId).collect();
    for owner in 0..50u64 {
        builder.update_graph(Identity(owner % 8), &detail)?;
    }
    builder.prune_task()?.run();

    let stats = builder.stats();
    assert_eq!(stats.update_count(), 50);
    assert_eq!(stats.prune_count(), 1);
    // Nanos accumulate even when the millisecond view rounds down.
    let snapshot = builder.stats_snapshot();
    assert!(snapshot.processing_time_ms == stats.processing_time_ms());
    Ok(())
}
