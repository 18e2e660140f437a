use std::process::Command;

use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct DemoRun {
    ticks: u64,
    converged_at: Option<u64>,
    normative_system: Vec<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ReportRow {
    tick: u64,
    converged: bool,
}

fn normnet() -> Command {
    Command::new(env!("CARGO_BIN_EXE_normnet"))
}

#[test]
fn presets_lists_every_strategy() {
    let output = normnet().arg("presets").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for name in ["iron", "simon", "simon_plus", "lion"] {
        assert!(
            stdout.lines().any(|line| line.starts_with(&format!("{name}\t"))),
            "missing preset {name}:\n{stdout}"
        );
    }
}

#[test]
fn check_config_fills_defaults_and_rejects_bad_files() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.json");
    std::fs::write(&good, r#"{"goals": ["safety"], "preset": "lion"}"#).unwrap();

    let output = normnet()
        .args(["check-config", "--config"])
        .arg(&good)
        .output()
        .unwrap();
    assert!(output.status.success());
    let filled: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(filled["goals"], serde_json::json!(["safety"]));
    assert_eq!(filled["policy"]["detect_relations"], serde_json::json!(true));
    assert_eq!(filled["performance_range_size"], serde_json::json!(50));

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, r#"{"performance_range_size": 0}"#).unwrap();
    let status = normnet()
        .args(["check-config", "--config"])
        .arg(&bad)
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn demo_writes_reports_and_trace() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("reports.jsonl");
    let trace = dir.path().join("trace.jsonl");

    let output = normnet()
        .args(["demo", "--ticks", "200", "--seed", "11"])
        .arg("--out")
        .arg(&out)
        .arg("--trace")
        .arg(&trace)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let run: DemoRun = serde_json::from_slice(&output.stdout).unwrap();
    assert!(run.ticks >= 1 && run.ticks <= 200);
    assert!(!run.normative_system.is_empty());

    let reports: Vec<ReportRow> = std::fs::read_to_string(&out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(reports.len() as u64, run.ticks);
    assert_eq!(reports.first().map(|r| r.tick), Some(1));
    if let Some(tick) = run.converged_at {
        assert_eq!(tick, run.ticks);
        assert!(reports.last().is_some_and(|r| r.converged));
    }

    let trace_lines = std::fs::read_to_string(&trace).unwrap().lines().count();
    assert_eq!(trace_lines as u64, run.ticks);
}

#[test]
fn demo_rejects_unknown_preset() {
    let output = normnet()
        .args(["demo", "--ticks", "5", "--preset", "wolf"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("wolf"));
}
