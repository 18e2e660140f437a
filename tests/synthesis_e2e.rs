use normative_network::simulation::{run_simulation, SimulationConfig};
use normative_network::{Goal, Modality, StrategyPolicy, SynthesisConfig};

fn config(policy: StrategyPolicy) -> SynthesisConfig {
    SynthesisConfig {
        goals: vec![Goal::from("safety")],
        policy,
        ..SynthesisConfig::default()
    }
}

#[test]
fn junction_converges_on_warm_light_prohibition() {
    let run = run_simulation(config(StrategyPolicy::iron()), &SimulationConfig::default(), None)
        .unwrap();

    let converged_at = run.converged_at.expect("run should converge");
    assert_eq!(converged_at, run.ticks);
    assert_eq!(
        run.normative_system,
        vec!["IF color(warm) & pos(any-pos) THEN PRH(enter)".to_string()]
    );

    // The leaves generated early on are still in the network, now covered.
    assert!(run.summary.nodes > run.normative_system.len());
    let last = run.reports.last().unwrap();
    assert_eq!(last.unregulated, 0);
    assert!(last.converged);
    assert!(run.reports.iter().any(|r| !r.refinement.merges.is_empty()));
}

#[test]
fn cool_lights_are_never_regulated() {
    for policy in [
        StrategyPolicy::iron(),
        StrategyPolicy::simon(),
        StrategyPolicy::simon_plus(),
        StrategyPolicy::lion(),
    ] {
        let run = run_simulation(config(policy.clone()), &SimulationConfig::default(), None)
            .unwrap();
        assert!(!run.normative_system.is_empty(), "{policy:?}");
        for norm in &run.normative_system {
            assert!(norm.ends_with(&format!("THEN {}(enter)", Modality::Prohibition)));
            for term in ["blue", "cool", "any-color"] {
                assert!(!norm.contains(term), "{policy:?}: {norm}");
            }
        }
    }
}

#[test]
fn same_seed_reproduces_the_run() {
    let sim = SimulationConfig {
        ticks: 40,
        stop_on_convergence: false,
        ..SimulationConfig::default()
    };
    let a = run_simulation(config(StrategyPolicy::lion()), &sim, None).unwrap();
    let b = run_simulation(config(StrategyPolicy::lion()), &sim, None).unwrap();
    assert_eq!(a.ticks, 40);
    assert_eq!(a.normative_system, b.normative_system);
    assert_eq!(a.summary, b.summary);
}

#[test]
fn unregulated_conflicts_fade_once_norms_are_enforced() {
    let sim = SimulationConfig {
        ticks: 30,
        stop_on_convergence: false,
        ..SimulationConfig::default()
    };
    let run = run_simulation(config(StrategyPolicy::iron()), &sim, None).unwrap();
    let first = &run.reports[0];
    // Norms generated mid-tick already regulate later conflicts.
    assert!(first.unregulated > 0);
    assert!(first.unregulated <= first.conflicts);
    let tail: usize = run.reports[20..].iter().map(|r| r.unregulated).sum();
    assert!(tail < first.unregulated * 10);
}
