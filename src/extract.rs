//! Rule engine: evaluates a [`CompanyConfig`] against an [`XbrlIndex`] to
//! produce per-year metric, segment, and balance-sheet values.
//!
//! For every rule the engine gathers candidate facts that satisfy all
//! matching predicates (dimensions, unit, period type, consolidated
//! restriction, year range) and resolves them per the rule's aggregation
//! strategy. A rule with no candidates for a year contributes nothing for
//! that year. The whole pass is synchronous and pure: the only mutable state
//! is the [`ExtractionResult`] being assembled.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::index::{Fact, XbrlIndex};
use crate::rules::{CompanyConfig, DimSpec, MetricRule, Rule, SegmentRule, Strategy, YearRange};

/// Extracted values for a single fiscal year.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct YearValues {
    /// Flat named metrics.
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
    /// Segment rule results, keyed by rule name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub segments: BTreeMap<String, f64>,
    /// Balance-sheet groupings: category → metric name → value.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub balance_sheet: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Mapping from fiscal year to extracted values, ordered by year.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExtractionResult {
    years: BTreeMap<String, YearValues>,
}

impl ExtractionResult {
    pub fn year(&self, year: &str) -> Option<&YearValues> {
        self.years.get(year)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &YearValues)> {
        self.years.iter()
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    fn year_mut(&mut self, year: &str) -> &mut YearValues {
        self.years.entry(year.to_string()).or_default()
    }

    // The two placement helpers below are the only write path into results.

    fn place_metric(&mut self, year: &str, rule: &MetricRule, value: f64) {
        let slot = self.year_mut(year);
        match rule.balance_sheet_category() {
            Some(category) => {
                slot.balance_sheet
                    .entry(category.to_string())
                    .or_default()
                    .insert(rule.name.clone(), value);
            }
            None => {
                slot.metrics.insert(rule.name.clone(), value);
            }
        }
    }

    fn place_segment(&mut self, year: &str, name: &str, value: f64) {
        self.year_mut(year)
            .segments
            .insert(name.to_string(), value);
    }
}

/// Dimension match. `None` accepts any dimensional mapping, `Some` of an
/// empty spec accepts only dimensionless facts, and a non-empty spec requires
/// every listed axis (directly or via a configured axis alias) to carry one
/// of its acceptable members. Facts may carry additional dimensions beyond
/// those required.
fn dims_match(
    fact: &Fact,
    required: Option<&DimSpec>,
    axis_aliases: &BTreeMap<String, Vec<String>>,
) -> bool {
    let Some(required) = required else {
        return true;
    };
    if required.is_empty() {
        return fact.dims.is_empty();
    }
    required.iter().all(|(axis, members)| {
        let direct = fact.dims.get(axis).is_some_and(|v| members.contains(v));
        direct
            || axis_aliases.get(axis).is_some_and(|aliases| {
                aliases
                    .iter()
                    .any(|alias| fact.dims.get(alias).is_some_and(|v| members.contains(v)))
            })
    })
}

fn unit_match(fact: &Fact, units: Option<&[String]>) -> bool {
    match units {
        None => true,
        Some(units) => units.iter().any(|u| *u == fact.unit),
    }
}

fn period_type_match(fact: &Fact, required: Option<crate::index::PeriodType>) -> bool {
    match required {
        None => true,
        Some(required) => fact.period_type() == Some(required),
    }
}

/// A fact with no dimensions at all is assumed consolidated; otherwise at
/// least one of its member values must be a declared consolidated member.
fn is_consolidated(fact: &Fact, members: &[String]) -> bool {
    if fact.dims.is_empty() {
        return true;
    }
    fact.dims.values().any(|v| members.iter().any(|m| m == v))
}

fn year_match(year: &str, range: Option<YearRange>) -> bool {
    range.is_none_or(|r| r.contains(year))
}

/// Streaming aggregation state for one (year, rule) pair.
#[derive(Debug, Clone, Default)]
struct Accumulator {
    count: usize,
    total: f64,
    max: Option<f64>,
    min: Option<f64>,
    latest_value: Option<f64>,
    latest_date: Option<String>,
}

impl Accumulator {
    fn update(&mut self, value: f64, date: &str) {
        self.count += 1;
        self.total += value;
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        // ISO dates compare correctly as strings.
        if self.latest_date.as_deref() < Some(date) {
            self.latest_date = Some(date.to_string());
            self.latest_value = Some(value);
        }
    }

    fn resolve(&self, strategy: Strategy) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        match strategy {
            Strategy::Sum => Some(self.total),
            Strategy::Avg => Some(self.total / self.count as f64),
            Strategy::Max => self.max,
            Strategy::Min => self.min,
            // pick_first is resolved by alias rank before accumulation;
            // falling through here behaves like latest_in_year.
            Strategy::LatestInYear | Strategy::PickFirst => self.latest_value,
        }
    }
}

/// Evaluates every rule in the configuration against the index and returns
/// the per-year extraction result.
pub fn extract_all(index: &XbrlIndex, config: &CompanyConfig) -> ExtractionResult {
    let mut results = ExtractionResult::default();
    for rule in &config.rules {
        match rule {
            Rule::Metric(metric) => apply_metric_rule(index, config, metric, &mut results),
            Rule::Segment(segment) => apply_segment_rule(index, config, segment, &mut results),
        }
    }
    tracing::debug!(years = results.len(), "extraction complete");
    results
}

fn metric_candidate(fact: &Fact, rule: &MetricRule, config: &CompanyConfig) -> bool {
    dims_match(fact, rule.required_dims.as_ref(), &config.axis_aliases)
        && unit_match(fact, rule.units.as_deref())
        && period_type_match(fact, rule.period_type)
        && (!rule.filter_for_consolidated || is_consolidated(fact, &config.consolidated_members))
}

fn apply_metric_rule(
    index: &XbrlIndex,
    config: &CompanyConfig,
    rule: &MetricRule,
    results: &mut ExtractionResult,
) {
    if rule.strategy == Strategy::PickFirst {
        // Alias position is the priority rank; ties at equal rank go to the
        // smallest context id so the outcome is document-order independent.
        let mut chosen: BTreeMap<String, (usize, &Fact)> = BTreeMap::new();
        for (rank, alias) in rule.aliases.iter().enumerate() {
            for fact in index.facts_for(alias) {
                if !metric_candidate(fact, rule, config) {
                    continue;
                }
                let Some(year) = fact.year() else { continue };
                if !year_match(year, rule.years) {
                    continue;
                }
                let replace = match chosen.get(year) {
                    None => true,
                    Some((best_rank, best)) => {
                        (rank, fact.context_id.as_str())
                            < (*best_rank, best.context_id.as_str())
                    }
                };
                if replace {
                    chosen.insert(year.to_string(), (rank, fact));
                }
            }
        }
        for (year, (_, fact)) in chosen {
            results.place_metric(&year, rule, fact.value);
        }
        return;
    }

    let mut accumulators: BTreeMap<String, Accumulator> = BTreeMap::new();
    for alias in &rule.aliases {
        for fact in index.facts_for(alias) {
            if !metric_candidate(fact, rule, config) {
                continue;
            }
            let Some(year) = fact.year() else { continue };
            if !year_match(year, rule.years) {
                continue;
            }
            accumulators
                .entry(year.to_string())
                .or_default()
                .update(fact.value, fact.period.date());
        }
    }
    for (year, accumulator) in accumulators {
        if let Some(value) = accumulator.resolve(rule.strategy) {
            results.place_metric(&year, rule, value);
        }
    }
}

fn apply_segment_rule(
    index: &XbrlIndex,
    config: &CompanyConfig,
    rule: &SegmentRule,
    results: &mut ExtractionResult,
) {
    let mut accumulators: BTreeMap<String, Accumulator> = BTreeMap::new();
    for fact in index.facts_for(&rule.concept) {
        if !dims_match(fact, Some(&rule.required_dims), &config.axis_aliases)
            || !unit_match(fact, rule.units.as_deref())
            || !period_type_match(fact, rule.period_type)
            || (rule.filter_for_consolidated
                && !is_consolidated(fact, &config.consolidated_members))
        {
            continue;
        }
        let Some(year) = fact.year() else { continue };
        if !year_match(year, rule.years) {
            continue;
        }
        accumulators
            .entry(year.to_string())
            .or_default()
            .update(fact.value, fact.period.date());
    }
    for (year, accumulator) in accumulators {
        if let Some(value) = accumulator.resolve(rule.strategy) {
            results.place_segment(&year, &rule.name, value);
        }
    }
}

/// Diagnostic of which rules produced no value for which target years.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MissingDataReport {
    /// Flat metric name → years with no value.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, Vec<String>>,
    /// Segment name → years with no value.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub segments: BTreeMap<String, Vec<String>>,
    /// Balance-sheet category → years with no entries at all.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub balance_sheet: BTreeMap<String, Vec<String>>,
}

impl MissingDataReport {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.segments.is_empty() && self.balance_sheet.is_empty()
    }
}

fn note_missing(map: &mut BTreeMap<String, Vec<String>>, name: &str, year: &str) {
    let years = map.entry(name.to_string()).or_default();
    if !years.iter().any(|y| y == year) {
        years.push(year.to_string());
    }
}

/// Reports which metrics, segments, and balance-sheet categories have no
/// value for which of the target years. Years outside a rule's declared
/// range are not reported for that rule. Read-only; never mutates
/// extraction state.
pub fn report_missing_data(
    result: &ExtractionResult,
    config: &CompanyConfig,
    target_years: &[String],
) -> MissingDataReport {
    let mut report = MissingDataReport::default();
    for year in target_years {
        let values = result.year(year);
        for rule in &config.rules {
            if !year_match(year, rule.years()) {
                continue;
            }
            match rule {
                Rule::Metric(metric) => match metric.balance_sheet_category() {
                    Some(category) => {
                        let present = values.is_some_and(|v| {
                            v.balance_sheet.get(category).is_some_and(|g| !g.is_empty())
                        });
                        if !present {
                            note_missing(&mut report.balance_sheet, category, year);
                        }
                    }
                    None => {
                        let present = values.is_some_and(|v| v.metrics.contains_key(&metric.name));
                        if !present {
                            note_missing(&mut report.metrics, &metric.name, year);
                        }
                    }
                },
                Rule::Segment(segment) => {
                    let present = values.is_some_and(|v| v.segments.contains_key(&segment.name));
                    if !present {
                        note_missing(&mut report.segments, &segment.name, year);
                    }
                }
            }
        }
    }
    report
}
