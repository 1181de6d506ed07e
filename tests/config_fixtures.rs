mod common;

use factkit::{Strategy, load_company_config};

#[test]
fn loads_entity_config_with_override_sections() {
    let config = load_company_config(common::fixture_path("sample_config.json"), "ACME").unwrap();

    assert_eq!(
        config.axis_aliases["us-gaap:StatementBusinessSegmentsAxis"],
        vec!["acme:SegmentsAxis"]
    );
    assert_eq!(
        config.consolidated_members,
        vec!["us-gaap:OperatingSegmentsMember"]
    );

    // Explicit metric, one concept-alias metric, one balance-sheet rule.
    assert_eq!(config.metric_rules().count(), 3);
    assert_eq!(config.segment_rules().count(), 2);

    let avg = config
        .metric_rules()
        .find(|m| m.name == "segment_revenue_avg")
        .unwrap();
    assert_eq!(avg.strategy, Strategy::Avg);
    assert!(avg.required_dims.is_some());

    let assets = config
        .metric_rules()
        .find(|m| m.name == "us-gaap:Assets")
        .unwrap();
    assert_eq!(assets.strategy, Strategy::LatestInYear);
    assert_eq!(assets.balance_sheet_category(), Some("assets"));
}

#[test]
fn unknown_entity_falls_back_to_defaults() {
    let config = load_company_config(common::fixture_path("sample_config.json"), "OTHER").unwrap();

    // Only the default sections apply: no explicit metrics or segments.
    assert_eq!(config.segment_rules().count(), 0);
    let names: Vec<_> = config.metric_rules().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["revenues", "us-gaap:Assets"]);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_company_config(common::fixture_path("no_such_config.json"), "ACME");
    assert!(matches!(err, Err(factkit::ExtractError::Io(_))));
}
