//! Rule configuration: the declarative description of which concepts to
//! extract, how to aggregate them, and where the results belong.
//!
//! Configurations are JSON documents with a `default` section and per-entity
//! overrides under `companies`. [`load_company_config`] deep-merges the two
//! and normalizes several legacy input shapes (flat `concept_aliases` maps,
//! list-or-object `balance_sheet_concepts`, list-or-map `segments`) into one
//! canonical, ordered list of [`Rule`]s. The loaded configuration is
//! read-only during extraction and may be shared across concurrent
//! extractions over different documents.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ExtractError, Result};
use crate::index::PeriodType;

/// Reserved category prefix routing a metric into the balance-sheet grouping.
pub const BALANCE_SHEET_PREFIX: &str = "balance_sheet.";

/// How candidate facts for a (year, rule) pair are resolved to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The candidate whose concept appears earliest in the alias list wins.
    #[default]
    PickFirst,
    Sum,
    LatestInYear,
    Max,
    Min,
    Avg,
}

/// Inclusive year range a rule applies to. Deserializes from a bare year
/// (`2020` or `"2020"`), a `"start-end"` string, or a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn single(year: i32) -> Self {
        Self {
            start: year,
            end: year,
        }
    }

    pub fn span(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Whether a derived year string falls inside the range. Strings that do
    /// not parse as years never match.
    pub fn contains(&self, year: &str) -> bool {
        year.trim()
            .parse::<i32>()
            .is_ok_and(|y| y >= self.start && y <= self.end)
    }
}

impl FromStr for YearRange {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ExtractError::InvalidYearRange(s.to_string());
        let s = s.trim();
        let range = match s.split_once('-') {
            None => Self::single(s.parse().map_err(|_| invalid())?),
            Some((start, end)) => Self::span(
                start.trim().parse().map_err(|_| invalid())?,
                end.trim().parse().map_err(|_| invalid())?,
            ),
        };
        if range.start > range.end {
            return Err(invalid());
        }
        Ok(range)
    }
}

impl<'de> Deserialize<'de> for YearRange {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Year(i32),
            Text(String),
            Span([i32; 2]),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Year(y) => Ok(Self::single(y)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Span([start, end]) if start <= end => Ok(Self::span(start, end)),
            Raw::Span([start, end]) => Err(serde::de::Error::custom(format!(
                "invalid year range: {start}-{end}"
            ))),
        }
    }
}

/// Acceptable member values for one required axis: a single member or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Members(pub Vec<String>);

impl Members {
    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|m| m == value)
    }
}

impl<'de> Deserialize<'de> for Members {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(s) => Self(vec![s]),
            Raw::Many(v) => Self(v),
        })
    }
}

/// Required-dimension constraints: axis → acceptable members.
///
/// Wrapped in `Option` on metric rules, the three states mean: `None` accepts
/// any dimensional shape, `Some` of an empty map accepts only dimensionless
/// facts, and a non-empty map is a superset match.
pub type DimSpec = BTreeMap<String, Members>;

/// Extraction rule for one named metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRule {
    pub name: String,
    /// Concept aliases in priority order; the first listed wins pick_first.
    pub aliases: Vec<String>,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub required_dims: Option<DimSpec>,
    #[serde(default)]
    pub units: Option<Vec<String>>,
    #[serde(default)]
    pub period_type: Option<PeriodType>,
    /// Optional grouping path, e.g. `balance_sheet.assets`.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub filter_for_consolidated: bool,
    #[serde(default)]
    pub years: Option<YearRange>,
}

impl MetricRule {
    /// Balance-sheet grouping suffix when the category uses the reserved
    /// prefix; `None` for flat metrics.
    pub fn balance_sheet_category(&self) -> Option<&str> {
        self.category
            .as_deref()
            .and_then(|c| c.strip_prefix(BALANCE_SHEET_PREFIX))
    }
}

fn default_segment_strategy() -> Strategy {
    Strategy::Sum
}

/// Extraction rule for one business-segment value. Unlike metric rules the
/// dimension constraints are mandatory and interpreted as "must match".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRule {
    pub name: String,
    pub concept: String,
    pub required_dims: DimSpec,
    #[serde(default)]
    pub units: Option<Vec<String>>,
    #[serde(default)]
    pub period_type: Option<PeriodType>,
    #[serde(default = "default_segment_strategy")]
    pub strategy: Strategy,
    #[serde(default)]
    pub filter_for_consolidated: bool,
    #[serde(default)]
    pub years: Option<YearRange>,
}

/// A configured extraction rule, dispatched explicitly by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Metric(MetricRule),
    Segment(SegmentRule),
}

impl Rule {
    pub fn name(&self) -> &str {
        match self {
            Rule::Metric(m) => &m.name,
            Rule::Segment(s) => &s.name,
        }
    }

    pub fn years(&self) -> Option<YearRange> {
        match self {
            Rule::Metric(m) => m.years,
            Rule::Segment(s) => s.years,
        }
    }
}

/// Canonical rule configuration for one reporting entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyConfig {
    /// Alternate axis names accepted wherever the keyed axis is required.
    pub axis_aliases: BTreeMap<String, Vec<String>>,
    /// Member labels identifying the entity-wide (consolidated) view.
    pub consolidated_members: Vec<String>,
    /// Ordered metric and segment rules.
    pub rules: Vec<Rule>,
}

impl CompanyConfig {
    pub fn metric_rules(&self) -> impl Iterator<Item = &MetricRule> {
        self.rules.iter().filter_map(|r| match r {
            Rule::Metric(m) => Some(m),
            Rule::Segment(_) => None,
        })
    }

    pub fn segment_rules(&self) -> impl Iterator<Item = &SegmentRule> {
        self.rules.iter().filter_map(|r| match r {
            Rule::Segment(s) => Some(s),
            Rule::Metric(_) => None,
        })
    }
}

/// Recursive merge of two JSON values: object keys merge depth-first, any
/// other value at a shared key is replaced wholesale by the override.
pub fn deep_merge(base: Value, over: Value) -> Value {
    match (base, over) {
        (Value::Object(mut base), Value::Object(over)) => {
            for (key, value) in over {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, over) => over,
    }
}

/// Loads a configuration file and resolves the rules for one entity key.
///
/// # Errors
///
/// Empty or malformed JSON, malformed rule shapes, and configurations that
/// yield no rules at all are fatal [`ExtractError::Config`] /
/// [`ExtractError::Json`] errors; extraction never sees partial structure.
pub fn load_company_config(path: impl AsRef<Path>, entity: &str) -> Result<CompanyConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Err(ExtractError::Config(format!(
            "empty config file: {}",
            path.display()
        )));
    }
    let doc: Value = serde_json::from_str(raw.trim())?;
    company_config_from_value(&doc, entity)
}

/// Resolves a parsed configuration document for one entity key.
pub fn company_config_from_value(doc: &Value, entity: &str) -> Result<CompanyConfig> {
    let default = doc.get("default").cloned().unwrap_or(Value::Null);
    let company = doc
        .get("companies")
        .and_then(|c| c.get(entity))
        .cloned()
        .unwrap_or(Value::Null);

    let merged = match (default, company) {
        (Value::Null, Value::Null) => {
            return Err(ExtractError::Config(format!(
                "no configuration for entity {entity} and no defaults"
            )));
        }
        (Value::Null, company) => company,
        (default, Value::Null) => default,
        (default, company) => deep_merge(default, company),
    };

    let config = parse_config(merged, entity)?;
    if config.rules.is_empty() {
        return Err(ExtractError::Config(format!(
            "configuration for entity {entity} defines no rules"
        )));
    }
    tracing::debug!(entity, rules = config.rules.len(), "loaded rule configuration");
    Ok(config)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    concept_aliases: BTreeMap<String, Vec<String>>,
    axis_aliases: BTreeMap<String, Vec<String>>,
    consolidated_members: Vec<String>,
    metrics: Vec<MetricRule>,
    segments: SegmentsShape,
    balance_sheet_concepts: BTreeMap<String, BalanceSheetGroup>,
}

/// Segments may be declared as a list of full rules or a name-keyed map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SegmentsShape {
    List(Vec<SegmentRule>),
    Map(BTreeMap<String, Value>),
}

impl Default for SegmentsShape {
    fn default() -> Self {
        SegmentsShape::List(Vec::new())
    }
}

/// Balance-sheet groupings: a legacy flat alias list, or an object carrying
/// an optional applicable-year annotation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BalanceSheetGroup {
    Aliases(Vec<String>),
    Detailed {
        aliases: Vec<String>,
        #[serde(default)]
        years: Option<YearRange>,
    },
}

fn parse_config(merged: Value, entity: &str) -> Result<CompanyConfig> {
    let raw: RawConfig = serde_json::from_value(merged)
        .map_err(|e| ExtractError::Config(format!("bad configuration for {entity}: {e}")))?;

    let mut rules: Vec<Rule> = raw.metrics.clone().into_iter().map(Rule::Metric).collect();

    // Back-compat: flat concept alias lists become pick_first metrics unless
    // an explicit metric of the same name is already defined.
    for (name, aliases) in raw.concept_aliases {
        if raw.metrics.iter().any(|m| m.name == name) {
            continue;
        }
        rules.push(Rule::Metric(MetricRule {
            name,
            aliases,
            strategy: Strategy::PickFirst,
            required_dims: None,
            units: None,
            period_type: None,
            category: None,
            filter_for_consolidated: false,
            years: None,
        }));
    }

    // Balance-sheet groupings become one latest-in-year rule per alias.
    for (category, group) in raw.balance_sheet_concepts {
        let (aliases, years) = match group {
            BalanceSheetGroup::Aliases(aliases) => (aliases, None),
            BalanceSheetGroup::Detailed { aliases, years } => (aliases, years),
        };
        for alias in aliases {
            rules.push(Rule::Metric(MetricRule {
                name: alias.clone(),
                aliases: vec![alias],
                strategy: Strategy::LatestInYear,
                required_dims: None,
                units: None,
                period_type: None,
                category: Some(format!("{BALANCE_SHEET_PREFIX}{category}")),
                filter_for_consolidated: false,
                years,
            }));
        }
    }

    match raw.segments {
        SegmentsShape::List(segments) => {
            rules.extend(segments.into_iter().map(Rule::Segment));
        }
        SegmentsShape::Map(segments) => {
            for (name, mut body) in segments {
                if let Some(obj) = body.as_object_mut() {
                    obj.entry("name").or_insert(Value::String(name.clone()));
                }
                let segment: SegmentRule = serde_json::from_value(body).map_err(|e| {
                    ExtractError::Config(format!("bad segment rule {name} for {entity}: {e}"))
                })?;
                rules.push(Rule::Segment(segment));
            }
        }
    }

    Ok(CompanyConfig {
        axis_aliases: raw.axis_aliases,
        consolidated_members: raw.consolidated_members,
        rules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn year_range_parsing() {
        assert_eq!("2020".parse::<YearRange>().unwrap(), YearRange::single(2020));
        assert_eq!(
            "2020-2022".parse::<YearRange>().unwrap(),
            YearRange::span(2020, 2022)
        );
        assert!("2022-2020".parse::<YearRange>().is_err());
        assert!("banana".parse::<YearRange>().is_err());
    }

    #[test]
    fn year_range_contains() {
        let range = YearRange::span(2020, 2022);
        assert!(range.contains("2020"));
        assert!(range.contains("2022"));
        assert!(!range.contains("2023"));
        assert!(!range.contains("not-a-year"));
    }

    #[test]
    fn year_range_deserializes_from_all_shapes() {
        let from = |v: Value| serde_json::from_value::<YearRange>(v).unwrap();
        assert_eq!(from(json!(2021)), YearRange::single(2021));
        assert_eq!(from(json!("2021")), YearRange::single(2021));
        assert_eq!(from(json!("2019-2021")), YearRange::span(2019, 2021));
        assert_eq!(from(json!([2019, 2021])), YearRange::span(2019, 2021));
    }

    #[test]
    fn members_accept_string_or_list() {
        let one: Members = serde_json::from_value(json!("acme:AutoMember")).unwrap();
        assert!(one.contains("acme:AutoMember"));
        let many: Members = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert!(many.contains("b"));
        assert!(!many.contains("c"));
    }

    #[test]
    fn deep_merge_recurses_into_objects() {
        let base = json!({"a": {"x": 1, "y": 2}, "list": [1, 2], "keep": true});
        let over = json!({"a": {"y": 3, "z": 4}, "list": [9]});
        let merged = deep_merge(base, over);
        assert_eq!(merged["a"]["x"], 1);
        assert_eq!(merged["a"]["y"], 3);
        assert_eq!(merged["a"]["z"], 4);
        // Non-object values are replaced wholesale.
        assert_eq!(merged["list"], json!([9]));
        assert_eq!(merged["keep"], true);
    }

    #[test]
    fn concept_aliases_become_pick_first_rules() {
        let doc = json!({
            "default": {
                "concept_aliases": {"revenues": ["us-gaap:Revenues"]}
            }
        });
        let config = company_config_from_value(&doc, "ACME").unwrap();
        let rule = config.metric_rules().next().unwrap();
        assert_eq!(rule.name, "revenues");
        assert_eq!(rule.strategy, Strategy::PickFirst);
        assert_eq!(rule.aliases, vec!["us-gaap:Revenues"]);
    }

    #[test]
    fn explicit_metric_shadows_concept_alias() {
        let doc = json!({
            "default": {
                "concept_aliases": {"revenues": ["us-gaap:Revenues"]},
                "metrics": [{
                    "name": "revenues",
                    "aliases": ["us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax"],
                    "strategy": "sum"
                }]
            }
        });
        let config = company_config_from_value(&doc, "ACME").unwrap();
        let rules: Vec<_> = config.metric_rules().collect();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].strategy, Strategy::Sum);
    }

    #[test]
    fn balance_sheet_legacy_and_detailed_shapes() {
        let doc = json!({
            "default": {
                "balance_sheet_concepts": {
                    "assets": ["us-gaap:Assets"],
                    "equity": {"aliases": ["us-gaap:StockholdersEquity"], "years": "2020-2022"}
                }
            }
        });
        let config = company_config_from_value(&doc, "ACME").unwrap();
        let assets = config
            .metric_rules()
            .find(|m| m.name == "us-gaap:Assets")
            .unwrap();
        assert_eq!(assets.strategy, Strategy::LatestInYear);
        assert_eq!(assets.balance_sheet_category(), Some("assets"));
        assert_eq!(assets.years, None);

        let equity = config
            .metric_rules()
            .find(|m| m.name == "us-gaap:StockholdersEquity")
            .unwrap();
        assert_eq!(equity.balance_sheet_category(), Some("equity"));
        assert_eq!(equity.years, Some(YearRange::span(2020, 2022)));
    }

    #[test]
    fn segments_accept_list_and_map_shapes() {
        let as_list = json!({
            "default": {
                "segments": [{
                    "name": "auto",
                    "concept": "us-gaap:Revenues",
                    "required_dims": {"us-gaap:StatementBusinessSegmentsAxis": "acme:AutoMember"}
                }]
            }
        });
        let config = company_config_from_value(&as_list, "ACME").unwrap();
        let segment = config.segment_rules().next().unwrap();
        assert_eq!(segment.name, "auto");
        assert_eq!(segment.strategy, Strategy::Sum);

        let as_map = json!({
            "default": {
                "segments": {
                    "auto": {
                        "concept": "us-gaap:Revenues",
                        "required_dims": {"us-gaap:StatementBusinessSegmentsAxis": "acme:AutoMember"},
                        "strategy": "max"
                    }
                }
            }
        });
        let config = company_config_from_value(&as_map, "ACME").unwrap();
        let segment = config.segment_rules().next().unwrap();
        assert_eq!(segment.name, "auto");
        assert_eq!(segment.strategy, Strategy::Max);
    }

    #[test]
    fn company_override_merges_over_default() {
        let doc = json!({
            "default": {
                "consolidated_members": ["us-gaap:OperatingSegmentsMember"],
                "concept_aliases": {"revenues": ["us-gaap:Revenues"]}
            },
            "companies": {
                "ACME": {
                    "concept_aliases": {"revenues": ["acme:TotalRevenues"]}
                }
            }
        });
        let config = company_config_from_value(&doc, "ACME").unwrap();
        assert_eq!(
            config.consolidated_members,
            vec!["us-gaap:OperatingSegmentsMember"]
        );
        let rule = config.metric_rules().next().unwrap();
        assert_eq!(rule.aliases, vec!["acme:TotalRevenues"]);
    }

    #[test]
    fn empty_configuration_is_fatal() {
        let doc = json!({});
        assert!(company_config_from_value(&doc, "ACME").is_err());

        let no_rules = json!({"default": {"consolidated_members": []}});
        assert!(company_config_from_value(&no_rules, "ACME").is_err());
    }
}
