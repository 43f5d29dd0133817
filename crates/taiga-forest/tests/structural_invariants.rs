//! End-to-end structural invariants for the forest engine.
//!
//! These tests exercise the full pipeline — assembly, bootstrap, growth,
//! codec, routing, compression — and pin the invariants transformation must
//! preserve: deterministic addressing, codec round-trips, and leaf-routing
//! equivalence under compression.

use std::collections::BTreeMap;

use taiga_forest::{
    ActiveNode, FeatureId, FeatureRow, ForestConfig, ForestGrowthEngine, Model, NodeId, RecordId,
    TargetRow, TaskId, TrainingData, TreeId, TreeNode, VarianceSplitStrategy, compress_model,
    route_model, route_nodes,
};

fn feature(task: u32, record: u64, feature_id: u32, value: f64) -> FeatureRow {
    FeatureRow {
        task: TaskId::new(task),
        record: RecordId::new(record),
        feature: FeatureId::new(feature_id),
        value,
    }
}

fn target(task: u32, record: u64, value: f64) -> TargetRow {
    TargetRow {
        task: TaskId::new(task),
        record: RecordId::new(record),
        value,
    }
}

/// 1 task, 4 records, 2 ordinal features; targets separate on feature 1.
fn four_sample_data() -> TrainingData {
    let features = vec![
        feature(1, 1, 1, 1.0),
        feature(1, 1, 2, 5.0),
        feature(1, 2, 1, 2.0),
        feature(1, 2, 2, 6.0),
        feature(1, 3, 1, 9.0),
        feature(1, 3, 2, 7.0),
        feature(1, 4, 1, 10.0),
        feature(1, 4, 2, 8.0),
    ];
    let targets = vec![
        target(1, 1, 0.0),
        target(1, 2, 0.0),
        target(1, 3, 10.0),
        target(1, 4, 10.0),
    ];
    TrainingData::new(features, targets)
}

/// 1 task, 4 records, one constant feature: growth can only degenerate.
fn constant_feature_data() -> TrainingData {
    let features = (1..=4u64).map(|r| feature(1, r, 1, 3.0)).collect();
    let targets = vec![
        target(1, 1, 1.0),
        target(1, 2, 2.0),
        target(1, 3, 3.0),
        target(1, 4, 4.0),
    ];
    TrainingData::new(features, targets)
}

// ---------------------------------------------------------------------------
// Scenario: 2 trees, max depth 2, 4 samples, 2 ordinal features
// ---------------------------------------------------------------------------

/// With every record seeded to both trees, growth under a depth-2 ceiling
/// yields exactly one root split and two leaves per tree, and each leaf
/// value is the mean of the samples routed to it.
#[test]
fn two_trees_depth_two_scenario() {
    let data = four_sample_data();
    let tasks = data.assemble().unwrap();
    let strategy = VarianceSplitStrategy::new(2, 42);
    let engine = ForestGrowthEngine::new(&strategy, 2);

    let seeds = vec![
        ActiveNode::root(&tasks[0], TreeId::new(1), vec![0, 1, 2, 3]),
        ActiveNode::root(&tasks[0], TreeId::new(2), vec![0, 1, 2, 3]),
    ];
    let nodes = engine.grow(seeds).unwrap();

    for tree in [TreeId::new(1), TreeId::new(2)] {
        let tree_nodes: Vec<&TreeNode> = nodes.iter().filter(|n| n.tree == tree).collect();
        assert_eq!(tree_nodes.len(), 3, "one split plus two leaves");

        let roots: Vec<&&TreeNode> = tree_nodes.iter().filter(|n| n.level == 1).collect();
        assert_eq!(roots.len(), 1);
        assert!(!roots[0].is_leaf(), "the root level holds exactly one split");
        assert_eq!(roots[0].node_id, NodeId::ROOT);
        assert_eq!(roots[0].support, 4);
    }

    // Leaf values are the mean target of the records that route to the leaf.
    let assignments = route_nodes(&nodes, data.features()).unwrap();
    let targets: BTreeMap<u64, f64> = data
        .targets()
        .iter()
        .map(|t| (t.record.value(), t.value))
        .collect();

    let mut routed: BTreeMap<(TreeId, u32, NodeId), Vec<f64>> = BTreeMap::new();
    for a in &assignments {
        routed
            .entry((a.tree, a.leaf.level, a.leaf.node_id))
            .or_default()
            .push(targets[&a.record.value()]);
    }
    for a in &assignments {
        let values = &routed[&(a.tree, a.leaf.level, a.leaf.node_id)];
        let mean: f64 = values.iter().sum::<f64>() / values.len() as f64;
        assert!(
            (a.leaf.leaf_value - mean).abs() < 1e-12,
            "leaf value {} is not the routed mean {mean}",
            a.leaf.leaf_value
        );
    }
}

/// The same scenario through the public training entry point: the bootstrap
/// varies the sample multiset, but the structural bounds hold regardless.
#[test]
fn trained_forest_respects_depth_two_bounds() {
    let model = ForestConfig::new(2)
        .unwrap()
        .with_max_depth(2)
        .with_seed(42)
        .fit(&four_sample_data())
        .unwrap();
    let nodes = model.decode_nodes().unwrap();

    for tree in [TreeId::new(1), TreeId::new(2)] {
        let tree_nodes: Vec<&TreeNode> = nodes.iter().filter(|n| n.tree == tree).collect();
        assert!(!tree_nodes.is_empty());
        assert!(tree_nodes.len() <= 3);
        assert!(tree_nodes.iter().all(|n| n.level <= 2));
        assert!(
            tree_nodes.iter().filter(|n| n.level == 1 && !n.is_leaf()).count() <= 1,
            "at most one root-level split"
        );
    }
}

// ---------------------------------------------------------------------------
// Routing equivalence under compression
// ---------------------------------------------------------------------------

/// A constant feature forces degenerate chains; compression must remove
/// every sentinel while preserving each point's leaf value.
#[test]
fn compression_preserves_leaf_routing() {
    let model = ForestConfig::new(3)
        .unwrap()
        .with_max_depth(4)
        .with_seed(7)
        .fit(&constant_feature_data())
        .unwrap();

    let original_nodes = model.decode_nodes().unwrap();
    assert!(
        original_nodes.iter().any(TreeNode::is_degenerate),
        "the constant feature must have produced degenerate splits"
    );

    let compressed = compress_model(&model).unwrap();
    let compressed_nodes = compressed.decode_nodes().unwrap();

    assert!(compressed_nodes.len() <= original_nodes.len());
    assert!(compressed_nodes.iter().all(|n| !n.is_degenerate()));

    // Route a spread of probe vectors through both models.
    let probes: Vec<FeatureRow> = (1..=5u64)
        .map(|r| feature(1, r, 1, r as f64 * 2.0 - 5.0))
        .collect();
    let before = route_model(&model, &probes).unwrap();
    let after = route_model(&compressed, &probes).unwrap();

    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.record, a.record);
        assert_eq!(b.tree, a.tree);
        assert_eq!(
            b.leaf.leaf_value, a.leaf.leaf_value,
            "record {} tree {} changed leaf value under compression",
            b.record, b.tree
        );
    }
}

/// Equivalence also holds for a forest with real splits mixed in.
#[test]
fn compression_is_identity_on_clean_forests() {
    let model = ForestConfig::new(2)
        .unwrap()
        .with_max_depth(3)
        .with_seed(11)
        .fit(&four_sample_data())
        .unwrap();
    let nodes = model.decode_nodes().unwrap();

    let compressed = compress_model(&model).unwrap();
    let compressed_nodes = compressed.decode_nodes().unwrap();

    if nodes.iter().all(|n| !n.is_degenerate()) {
        assert_eq!(nodes, compressed_nodes);
    }

    let probes: Vec<FeatureRow> = (1..=6u64)
        .flat_map(|r| {
            vec![
                feature(1, r, 1, r as f64 * 1.7),
                feature(1, r, 2, 9.0 - r as f64),
            ]
        })
        .collect();
    let before = route_model(&model, &probes).unwrap();
    let after = route_model(&compressed, &probes).unwrap();
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.leaf.leaf_value, a.leaf.leaf_value);
    }
}

// ---------------------------------------------------------------------------
// Codec round-trip on a trained model
// ---------------------------------------------------------------------------

#[test]
fn codec_round_trips_a_trained_forest() {
    let model = ForestConfig::new(3)
        .unwrap()
        .with_seed(5)
        .fit(&four_sample_data())
        .unwrap();

    let nodes = model.decode_nodes().unwrap();
    let samples = model.decode_samples().unwrap();

    let re_encoded = Model::encode(model.id(), model.name(), &nodes, &samples);
    assert_eq!(re_encoded.decode_nodes().unwrap(), nodes);
    assert_eq!(re_encoded.decode_samples().unwrap(), samples);
    assert_eq!(re_encoded, model);
}

// ---------------------------------------------------------------------------
// Bootstrap bounds across unevenly-sized tasks
// ---------------------------------------------------------------------------

/// Two tasks of different sizes share one draw generated at the larger size;
/// every original id stays within the shared bound and the per-tree draw
/// count equals the largest task's sample count.
#[test]
fn shared_bootstrap_bounds_across_tasks() {
    let mut features = Vec::new();
    let mut targets = Vec::new();
    for r in 1..=6u64 {
        features.push(feature(1, r, 1, r as f64));
        targets.push(target(1, r, (r % 2) as f64));
    }
    for r in 1..=3u64 {
        features.push(feature(2, r, 4, r as f64));
        targets.push(target(2, r, r as f64));
    }
    let data = TrainingData::new(features, targets);

    let model = ForestConfig::new(4)
        .unwrap()
        .with_seed(21)
        .fit(&data)
        .unwrap();

    let samples = model.decode_samples().unwrap();
    assert_eq!(samples.len(), 4 * 6);
    for row in &samples {
        assert!(row.original >= 1 && row.original <= 6);
        assert!(row.local >= 1 && row.local <= 6);
    }

    // The larger task keeps the full draw: its roots carry all 6 slots.
    let nodes = model.decode_nodes().unwrap();
    for tree_index in 1..=4u32 {
        let root = nodes
            .iter()
            .find(|n| {
                n.task == TaskId::new(1) && n.tree == TreeId::new(tree_index) && n.level == 1
            })
            .expect("every tree has a root");
        assert_eq!(root.support, 6);
    }
}
