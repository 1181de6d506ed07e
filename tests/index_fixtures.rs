mod common;

use factkit::{PeriodType, XbrlIndex};

#[test]
fn indexes_simple_instance() {
    let text = common::read_fixture("simple_instance.xml");
    let index = XbrlIndex::parse(&text).unwrap();

    assert_eq!(index.contexts().len(), 2);
    assert_eq!(index.len(), 2);

    let revenues = index.facts_for("us-gaap:Revenues");
    assert_eq!(revenues.len(), 1);
    assert_eq!(revenues[0].value, 12345.0);
    assert_eq!(revenues[0].unit, "USD");
    assert_eq!(revenues[0].period_type(), Some(PeriodType::Duration));
    assert_eq!(revenues[0].year(), Some("2024"));

    let assets = index.facts_for("us-gaap:Assets");
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].value, 67890.0);
    assert_eq!(assets[0].period_type(), Some(PeriodType::Instant));
}

#[test]
fn indexes_segmented_instance() {
    let text = common::read_fixture("segmented_instance.xml");
    let index = XbrlIndex::parse(&text).unwrap();

    assert_eq!(index.contexts().len(), 7);
    assert_eq!(index.len(), 7);

    // Thousands separators are stripped before numeric parsing.
    let revenues = index.facts_for("us-gaap:Revenues");
    assert_eq!(revenues[0].value, 100_000.0);
    assert!(revenues[0].dims.is_empty());

    let segment_revenue = index.facts_for("acme:SegmentRevenue");
    assert_eq!(segment_revenue.len(), 4);
    let q1 = segment_revenue
        .iter()
        .find(|f| f.context_id == "AutoQ1")
        .unwrap();
    assert_eq!(
        q1.dims.get("acme:SegmentsAxis").map(String::as_str),
        Some("acme:AutoMember")
    );
    assert_eq!(q1.period.date(), "2024-03-31");
}

#[test]
fn years_cover_both_period_kinds() {
    let text = common::read_fixture("segmented_instance.xml");
    let index = XbrlIndex::parse(&text).unwrap();

    let years: Vec<_> = index.years().into_iter().collect();
    assert_eq!(years, vec!["2023".to_string(), "2024".to_string()]);
}

#[test]
fn unknown_concept_has_no_facts() {
    let text = common::read_fixture("simple_instance.xml");
    let index = XbrlIndex::parse(&text).unwrap();
    assert!(index.facts_for("us-gaap:NetIncomeLoss").is_empty());
}
