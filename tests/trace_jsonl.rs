use normative_network::simulation::{junction_synthesizer, JunctionWorld, SimulationConfig};
use normative_network::{Goal, JsonlTraceSink, SynthesisConfig, TickTrace, TraceSink};
use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct TraceRow {
    tick: u64,
    conflicts: usize,
    normative_system: Vec<String>,
}

#[test]
fn jsonl_trace_sink_writes_ticks_and_flushes_on_join() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");
    let goal = Goal::from("safety");

    let mut synth = junction_synthesizer(SynthesisConfig {
        goals: vec![goal.clone()],
        ..SynthesisConfig::default()
    })
    .unwrap();
    let mut world = JunctionWorld::new(SimulationConfig::default(), goal);

    let (sink, worker) = JsonlTraceSink::new(&path).unwrap();
    for _ in 0..2 {
        let input = world.sample_tick(&synth);
        let report = synth.step(input);
        sink.record(TickTrace::from_report(&report, synth.network()))
            .unwrap();
    }

    drop(sink);
    assert_eq!(worker.join().unwrap(), 2);

    let raw = std::fs::read_to_string(&path).unwrap();
    let rows: Vec<TraceRow> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].tick, 1);
    assert_eq!(rows[1].tick, 2);
    // Nothing is enforced before the first tick, so it sees conflicts and
    // ends with the norms generated for them.
    assert!(rows[0].conflicts > 0);
    assert!(!rows[0].normative_system.is_empty());
}
