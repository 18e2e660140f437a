use normative_network::{
    load_config_from_path, ConfigError, Dimension, GeneralisationMode, Goal, OmegaSpec,
    StrategyPolicy,
};
use tempfile::tempdir;

#[test]
fn loads_partial_config_with_overrides_and_preset() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("synthesis.json");
    std::fs::write(
        &path,
        r#"{
            "goals": ["safety", "throughput"],
            "performance_range_size": 30,
            "preset": "simon_plus",
            "omega": "represented",
            "boundaries": {
                "default": {"specialisation": 0.4, "generalisation": 0.8, "epsilon": 0.02},
                "overrides": [
                    {"dimension": "necessity", "goal": "throughput",
                     "specialisation": 0.2, "generalisation": 0.6, "epsilon": 0.0}
                ]
            }
        }"#,
    )
    .unwrap();

    let config = load_config_from_path(&path).unwrap();
    assert_eq!(config.goals, vec![Goal::from("safety"), Goal::from("throughput")]);
    assert_eq!(config.performance_range_size, 30);
    assert_eq!(config.convergence_ticks, 10);
    assert_eq!(config.omega, OmegaSpec::Represented);
    assert_eq!(config.policy, StrategyPolicy::simon_plus());
    assert_eq!(config.policy.generalisation_mode, GeneralisationMode::Deep);

    let throughput = Goal::from("throughput");
    let safety = Goal::from("safety");
    assert_eq!(
        config.boundaries.specialisation_boundary(Dimension::Necessity, &throughput),
        0.2
    );
    assert_eq!(
        config.boundaries.generalisation_boundary(Dimension::Effectiveness, &safety),
        0.8
    );
    assert_eq!(config.range_settings().capacity, 30);
}

#[test]
fn reports_missing_file_and_bad_json() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    assert!(matches!(
        load_config_from_path(&missing),
        Err(ConfigError::Io { .. })
    ));

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, "{ not json").unwrap();
    assert!(matches!(
        load_config_from_path(&broken),
        Err(ConfigError::Parse(_))
    ));

    let invalid = dir.path().join("invalid.json");
    std::fs::write(&invalid, r#"{"goals": []}"#).unwrap();
    let err = load_config_from_path(&invalid).unwrap_err();
    assert!(err.to_string().contains("goals"));
}
