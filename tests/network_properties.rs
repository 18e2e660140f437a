use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use normative_network::lifecycle;
use normative_network::{
    EdgeKind, Goal, Modality, NodeState, Norm, NormId, NormativeNetwork, RangeSettings,
};

const NODES: u32 = 12;

fn norm(i: u32) -> Norm {
    Norm::new([("slot", format!("s{i}"))], Modality::Prohibition, "enter")
}

fn populated() -> NormativeNetwork {
    let mut net = NormativeNetwork::new(vec![Goal::from("g")], RangeSettings::default());
    for i in 0..NODES {
        net.add(norm(i));
    }
    net
}

fn random_pair(rng: &mut StdRng) -> (NormId, NormId) {
    (
        NormId(rng.gen_range(0..NODES)),
        NormId(rng.gen_range(0..NODES)),
    )
}

fn random_dag(seed: u64, attempts: usize) -> NormativeNetwork {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut net = populated();
    for _ in 0..attempts {
        let (child, parent) = random_pair(&mut rng);
        if child != parent && !net.is_ancestor(child, parent) {
            net.add_generalisation(child, parent);
        }
    }
    net
}

#[test]
fn guarded_generalisation_stays_acyclic() {
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut net = populated();
        for _ in 0..80 {
            let (child, parent) = random_pair(&mut rng);
            // The network refuses cycle-closing edges on its own as well.
            net.add_generalisation(child, parent);
        }
        for id in net.ids() {
            assert!(!net.is_ancestor(id, id), "seed {seed}: {id} is its own ancestor");
        }
    }
}

#[test]
fn parent_level_exceeds_every_child() {
    for seed in 0..20 {
        let net = random_dag(seed, 60);
        let edges: Vec<_> = net
            .edges()
            .into_iter()
            .filter(|e| e.kind == EdgeKind::Generalisation)
            .collect();
        assert!(!edges.is_empty());
        for edge in edges {
            assert!(
                net.generalisation_level(edge.target) >= net.generalisation_level(edge.source) + 1,
                "seed {seed}: {edge:?}"
            );
        }
    }
}

#[test]
fn substitutability_and_complementarity_are_exclusive() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut net = populated();
    for _ in 0..500 {
        let (a, b) = random_pair(&mut rng);
        match rng.gen_range(0..4) {
            0 => {
                net.add_substitutability(a, b);
            }
            1 => {
                net.add_complementarity(a, b);
            }
            2 => {
                net.remove_substitutability(a, b);
            }
            _ => {
                net.remove_complementarity(a, b);
            }
        }
        for x in net.ids() {
            for y in net.ids() {
                assert!(!(net.are_substitutable(x, y) && net.are_complementary(x, y)));
                assert_eq!(net.are_substitutable(x, y), net.are_substitutable(y, x));
            }
        }
    }
}

#[test]
fn insertion_is_idempotent() {
    let mut net = NormativeNetwork::new(vec![Goal::from("g")], RangeSettings::default());
    let first = net.add(Norm::new(
        [("color", "red"), ("pos", "left")],
        Modality::Prohibition,
        "enter",
    ));
    let second = net.add(Norm::new(
        [("pos", "left"), ("color", "red")],
        Modality::Prohibition,
        "enter",
    ));
    assert_eq!(first, second);
    assert_eq!(net.len(), 1);
}

#[test]
fn activation_never_shrinks_representation() {
    for seed in 0..20 {
        let mut net = random_dag(seed, 40);
        let mut rng = StdRng::seed_from_u64(seed + 1000);
        for _ in 0..30 {
            let id = NormId(rng.gen_range(0..NODES));
            let before = net.represented_norms().len();
            lifecycle::activate(&mut net, id);
            assert!(net.represented_norms().len() >= before, "seed {seed}");
        }
    }
}

#[test]
fn deactivating_unsupported_leaf_shrinks_representation() {
    for seed in 0..20 {
        let mut net = random_dag(seed, 40);
        let leaves: Vec<NormId> = net.ids().filter(|&id| net.is_leaf(id)).collect();
        for id in leaves {
            lifecycle::activate(&mut net, id);
        }
        let candidates: Vec<NormId> = net
            .ids()
            .filter(|&id| {
                net.is_leaf(id)
                    && net.state(id) == Some(NodeState::Active)
                    && !net.is_represented_by_ancestor(id)
            })
            .collect();
        assert!(!candidates.is_empty(), "seed {seed}");
        for id in candidates {
            let before = net.represented_norms().len();
            assert!(lifecycle::deactivate(&mut net, id, NodeState::Discarded));
            assert!(net.represented_norms().len() < before, "seed {seed}: {id}");
        }
    }
}
