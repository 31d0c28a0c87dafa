//! Property tests for the pure topology and the graph transforms.

use ctm_rs::graph::is_layer_zero;
use ctm_rs::{
    Entity, EntityId, GraphAccumulator, LayerPlan, Phase, PhaseMachine, Relation,
    build_layer, build_layer_from, compute_layer_sizes,
};
use proptest::prelude::*;

/// Full tree for `k` seq-numbered inputs plus neighborhood links.
fn full_graph(k: usize, links: &[(usize, usize)]) -> GraphAccumulator {
    let sizes = compute_layer_sizes(k).unwrap();
    let mut graph = GraphAccumulator::new();
    let inputs = build_layer(&sizes, 0).unwrap();
    graph.append(
        inputs.entities.iter().cloned().map(Entity::input),
        links
            .iter()
            .map(|&(a, b)| (a % k + 1, b % k + 1))
            .filter(|(a, b)| a != b)
            .map(|(a, b)| Relation::neighborhood(EntityId::seq(a), EntityId::seq(b))),
    );
    for layer in 1..sizes.len() {
        let built = build_layer(&sizes, layer).unwrap();
        let entities = built.entities.iter().map(|id| Entity::reduction(id.clone(), layer));
        graph.append(entities, built.relations());
    }
    graph
}

proptest! {
    // ========================================================================
    // Layer sizes halve (rounding up) until exactly one remains
    // ========================================================================

    #[test]
    fn prop_layer_sizes_halve_to_one(k in 1usize..2000) {
        let sizes = compute_layer_sizes(k).unwrap();
        prop_assert_eq!(sizes[0], k);
        prop_assert_eq!(*sizes.last().unwrap(), 1);
        for w in sizes.windows(2) {
            prop_assert_eq!(w[1], w[0].div_ceil(2));
        }
        prop_assert_eq!(sizes.iter().filter(|&&s| s == 1).count(), 1);
    }

    // ========================================================================
    // Every entity feeds exactly one upper entity
    // ========================================================================

    #[test]
    fn prop_every_source_used_once(k in 2usize..300) {
        let sizes = compute_layer_sizes(k).unwrap();
        let mut total = k;
        for layer in 1..sizes.len() {
            let built = build_layer(&sizes, layer).unwrap();
            let previous = build_layer(&sizes, layer - 1).unwrap().entities;
            let used: Vec<EntityId> = built.pairings.iter().flat_map(|p| p.sources.iter().cloned()).collect();
            prop_assert_eq!(&used, &previous);
            prop_assert!(built.pairings.iter().filter(|p| p.is_solo()).count() <= 1);
            prop_assert_eq!(built.pairings.last().unwrap().is_solo(), previous.len() % 2 == 1);
            total += built.entities.len();
        }
        let plan = LayerPlan::new(k).unwrap();
        prop_assert_eq!(total, sizes.iter().sum::<usize>());
        prop_assert_eq!(plan.derived_entities() + k, total);
        prop_assert_eq!(total - k, sizes[1..].iter().sum::<usize>());
    }

    #[test]
    fn prop_named_inputs_pair_like_seq(k in 2usize..100) {
        let sizes = compute_layer_sizes(k).unwrap();
        let named: Vec<EntityId> = (1..=k).map(|i| EntityId::named(format!("Processor_{i}"))).collect();
        let from_named = build_layer_from(&sizes, 1, &named).unwrap();
        let from_seq = build_layer(&sizes, 1).unwrap();
        prop_assert_eq!(&from_named.entities, &from_seq.entities);
        let shapes = |l: &ctm_rs::BuiltLayer| l.pairings.iter().map(|p| p.sources.len()).collect::<Vec<_>>();
        prop_assert_eq!(shapes(&from_named), shapes(&from_seq));
    }

    // ========================================================================
    // Broadcast twice is the identity; neighborhoods never flip
    // ========================================================================

    #[test]
    fn prop_double_reverse_is_identity(
        k in 1usize..120,
        links in prop::collection::vec((0usize..120, 0usize..120), 0..10),
    ) {
        let mut graph = full_graph(k, &links);
        let before = graph.relations().to_vec();
        let flipped = graph.reverse_all(Relation::is_neighborhood);
        prop_assert_eq!(flipped, before.iter().filter(|r| !r.is_neighborhood()).count());
        for (now, was) in graph.relations().iter().zip(&before) {
            if was.is_neighborhood() {
                prop_assert_eq!(now, was);
            }
        }
        graph.reverse_all(Relation::is_neighborhood);
        prop_assert_eq!(graph.relations(), &before[..]);
    }

    // ========================================================================
    // Relink truncation keeps layer 0 only
    // ========================================================================

    #[test]
    fn prop_reset_keeps_layer_zero(
        k in 1usize..120,
        links in prop::collection::vec((0usize..120, 0usize..120), 0..10),
        reversed in any::<bool>(),
    ) {
        let mut graph = full_graph(k, &links);
        let inputs: Vec<Entity> = graph.layer(0).cloned().collect();
        let hood: Vec<Relation> = graph.relations().iter().filter(|r| r.is_neighborhood()).cloned().collect();
        if reversed {
            graph.reverse_all(Relation::is_neighborhood);
        }

        graph.reset_to(is_layer_zero);
        prop_assert_eq!(graph.entities(), &inputs[..]);
        prop_assert_eq!(graph.relations(), &hood[..]);
        prop_assert_eq!(graph.depth(), 0);
        for id in graph.layer_ids(0) {
            prop_assert!(graph.contains(&id));
        }
    }

    // ========================================================================
    // Phase machine runs R reduce rounds per cycle
    // ========================================================================

    #[test]
    fn prop_cycle_has_r_reduce_rounds(k in 1usize..500) {
        let plan = LayerPlan::new(k).unwrap();
        let mut machine = PhaseMachine::new();
        machine.advance(); // PREPARE
        machine.set_total_rounds(plan.reduce_rounds());

        let mut rounds = Vec::new();
        while machine.phase() != Phase::Finalize {
            if machine.phase() == Phase::Reduce {
                rounds.push(machine.round());
            }
            machine.advance();
        }
        let expected: Vec<u32> = (1..=plan.reduce_rounds()).collect();
        prop_assert_eq!(rounds, expected);
        prop_assert_eq!(plan.reduce_rounds() as usize, plan.layer_count().saturating_sub(2));
    }
}
