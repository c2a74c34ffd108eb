use affinity_rs::{
    AccessDetail, AffinityConfig, GraphBuilder, Identity, LocalGraphBuilder, ObjectId,
};
use std::sync::Arc;

fn config(snapshot_count: usize) -> AffinityConfig {
    AffinityConfig::new(1000, snapshot_count, 10).unwrap()
}

#[test]
fn concurrent_updates_lose_nothing() -> anyhow::Result<()> {
    let builder = Arc::new(LocalGraphBuilder::weighted(config(1)));
    let pairs = 4u64;
    let updates_per_thread = 200u64;

    // Thread 2t and 2t+1 share object t exclusively, so all contention is
    // confined to one edge per pair.
    let mut handles = Vec::new();
    for thread in 0..pairs * 2 {
        let builder = builder.clone();
        handles.push(std::thread::spawn(move || {
            let owner = Identity(thread);
            let detail: AccessDetail = [ObjectId(thread / 2)].into_iter().collect();
            for _ in 0..updates_per_thread {
                builder.update_graph(owner, &detail).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().expect("updater thread");
    }

    assert_eq!(
        builder.stats().update_count(),
        pairs * 2 * updates_per_thread
    );

    let graph = builder.affinity_graph()?;
    assert_eq!(graph.edge_count(), pairs as usize);
    for pair in 0..pairs {
        let weight = graph.weight(Identity(pair * 2), Identity(pair * 2 + 1));
        // Each call after the partner's first contributes one unit: between
        // M (one thread ran entirely first) and 2M-1 (perfect interleave).
        assert!(
            weight >= updates_per_thread && weight < 2 * updates_per_thread,
            "pair {pair} weight {weight} outside expected range"
        );
    }
    Ok(())
}

#[test]
fn readers_never_observe_torn_weights() -> anyhow::Result<()> {
    let builder = Arc::new(LocalGraphBuilder::weighted(config(1)));
    let writer = {
        let builder = builder.clone();
        std::thread::spawn(move || {
            let detail_a: AccessDetail = [ObjectId(1)].into_iter().collect();
            let detail_b: AccessDetail = [ObjectId(1)].into_iter().collect();
            for _ in 0..500 {
                builder.update_graph(Identity(1), &detail_a).unwrap();
                builder.update_graph(Identity(2), &detail_b).unwrap();
            }
        })
    };

    // With no pruning, every edge weight is monotonically non-decreasing;
    // a torn read would show a decrease.
    let mut previous = 0;
    while !writer.is_finished() {
        let weight = builder
            .affinity_graph()?
            .weight(Identity(1), Identity(2));
        assert!(weight >= previous, "weight went backwards: {previous} -> {weight}");
        previous = weight;
    }
    writer.join().expect("writer thread");
    Ok(())
}

#[test]
fn pruning_interleaved_with_updates_stays_consistent() -> anyhow::Result<()> {
    let snapshot_count = 2;
    let builder = Arc::new(LocalGraphBuilder::weighted(config(snapshot_count)));
    let prune = builder.prune_task()?;

    let mut updaters = Vec::new();
    for thread in 0..4u64 {
        let builder = builder.clone();
        updaters.push(std::thread::spawn(move || {
            let detail: AccessDetail = [ObjectId(0)].into_iter().collect();
            for _ in 0..300 {
                builder.update_graph(Identity(thread), &detail).unwrap();
            }
        }));
    }
    let pruner = {
        let prune = prune.clone();
        std::thread::spawn(move || {
            for _ in 0..20 {
                prune.run();
                std::thread::yield_now();
            }
        })
    };

    for handle in updaters {
        handle.join().expect("updater thread");
    }
    pruner.join().expect("pruner thread");

    // Every edge endpoint in a snapshot must be a live vertex.
    let graph = builder.affinity_graph()?;
    for (key, weight) in graph.edges() {
        assert!(weight > 0);
        assert!(graph.contains_vertex(key.lo()));
        assert!(graph.contains_vertex(key.hi()));
    }

    // Once quiescent, the whole window drains in snapshot_count rotations.
    for _ in 0..snapshot_count {
        prune.run();
    }
    assert!(builder.affinity_graph()?.is_empty());
    assert_eq!(builder.stats().prune_count(), 20 + snapshot_count as u64);
    Ok(())
}
