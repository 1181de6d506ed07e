//! XBRL instance document indexing.
//!
//! An XBRL instance document is a flat bag of tagged numeric data points
//! ("facts"), each referencing a reusable `<context>` element that describes
//! the reporting period and any dimensional qualifiers (business segment,
//! product line, and so on). This module turns raw instance XML into an
//! [`XbrlIndex`]: contexts are parsed once, every candidate fact element is
//! resolved against them, and the resulting facts are deduplicated by
//! (concept, period, dimensions).
//!
//! Malformed individual elements — missing `contextRef`, non-numeric text,
//! references to unknown contexts — are skipped rather than failing the whole
//! document. Only XML that cannot be parsed at all is a fatal error.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Local names of structural XBRL elements. These carry namespace prefixes
/// like fact elements do, but never represent reported values.
const STRUCTURAL_ELEMENTS: &[&str] = &[
    "xbrl",
    "schemaref",
    "context",
    "entity",
    "identifier",
    "period",
    "startdate",
    "enddate",
    "instant",
    "segment",
    "scenario",
    "explicitmember",
    "typedmember",
    "unit",
    "measure",
    "divide",
    "unitnumerator",
    "unitdenominator",
];

/// Namespace prefixes whose elements are always structural.
const STRUCTURAL_PREFIXES: &[&str] = &["link", "xbrldi"];

/// Whether a fact covers a date range or a single point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Duration,
    Instant,
}

/// Reporting period of a context, normalized to a uniform two-slot shape.
///
/// Instant periods are stored as `("", date)`; duration periods as
/// `(start, end)` with either slot possibly empty. This shape is the single
/// source of truth for distinguishing instant from duration facts: a key is
/// an instant when only its second slot is filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PeriodKey {
    pub start: String,
    pub end: String,
}

impl PeriodKey {
    pub fn instant(date: impl Into<String>) -> Self {
        Self {
            start: String::new(),
            end: date.into(),
        }
    }

    pub fn duration(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// True for contexts that declared no period at all.
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.end.is_empty()
    }

    /// Period classification, or `None` for an empty key. Facts without a
    /// period never satisfy a period-type constraint.
    pub fn period_type(&self) -> Option<PeriodType> {
        if self.is_empty() {
            None
        } else if self.start.is_empty() {
            Some(PeriodType::Instant)
        } else {
            Some(PeriodType::Duration)
        }
    }

    /// The date used for year derivation and latest-in-year ordering:
    /// the end (or instant) slot when present, otherwise the start slot.
    pub fn date(&self) -> &str {
        if self.end.is_empty() {
            &self.start
        } else {
            &self.end
        }
    }

    /// Four-digit fiscal year prefix of the preferred date slot.
    pub fn year(&self) -> Option<&str> {
        self.date().get(..4).filter(|y| !y.is_empty())
    }
}

/// A reusable period/dimension descriptor referenced by facts via
/// `contextRef`. Parsed once per document and never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    pub period: PeriodKey,
    /// Dimensional axis → explicit member, from the context's
    /// segment/scenario substructure.
    pub dims: BTreeMap<String, String>,
}

/// One tagged numeric data point, with its context already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    /// Namespace-qualified concept name, e.g. `us-gaap:Revenues`.
    pub concept: String,
    /// Numeric value, with any declared power-of-ten scale applied.
    pub value: f64,
    pub unit: String,
    pub decimals: Option<String>,
    pub period: PeriodKey,
    pub dims: BTreeMap<String, String>,
    pub context_id: String,
}

impl Fact {
    pub fn year(&self) -> Option<&str> {
        self.period.year()
    }

    pub fn period_type(&self) -> Option<PeriodType> {
        self.period.period_type()
    }

    fn key(&self) -> FactKey {
        FactKey {
            concept: self.concept.clone(),
            period: self.period.clone(),
            dims: self.dims.clone(),
        }
    }
}

/// Uniqueness key for a fact within one document. When two tagged elements
/// resolve to the same key, the later one overwrites the earlier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactKey {
    pub concept: String,
    pub period: PeriodKey,
    pub dims: BTreeMap<String, String>,
}

/// Structured index of all contexts and facts in one instance document.
///
/// Built once via [`XbrlIndex::parse`] and read-only afterwards. The rule
/// engine consumes facts through [`XbrlIndex::facts_for`], which groups facts
/// by concept so each rule only inspects the concepts it names.
#[derive(Debug, Clone, Default)]
pub struct XbrlIndex {
    contexts: HashMap<String, Context>,
    facts: HashMap<FactKey, Fact>,
    by_concept: HashMap<String, Vec<Fact>>,
}

impl XbrlIndex {
    /// Parses instance document text into an index.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Xml`](crate::ExtractError::Xml) when the text
    /// is not well-formed XML. Individually malformed elements are skipped,
    /// not fatal.
    pub fn parse(text: &str) -> Result<Self> {
        let contexts = index_contexts(text)?;
        tracing::debug!(contexts = contexts.len(), "indexed contexts");

        let facts = index_facts(text, &contexts)?;

        let mut by_concept: HashMap<String, Vec<Fact>> = HashMap::new();
        for fact in facts.values() {
            by_concept
                .entry(fact.concept.clone())
                .or_default()
                .push(fact.clone());
        }
        // Deterministic iteration order within each concept group; also the
        // tie-break order for pick-first candidate selection.
        for group in by_concept.values_mut() {
            group.sort_by(|a, b| a.context_id.cmp(&b.context_id));
        }

        tracing::info!(
            contexts = contexts.len(),
            facts = facts.len(),
            concepts = by_concept.len(),
            "indexed XBRL instance"
        );

        Ok(Self {
            contexts,
            facts,
            by_concept,
        })
    }

    pub fn contexts(&self) -> &HashMap<String, Context> {
        &self.contexts
    }

    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.values()
    }

    pub fn get(&self, key: &FactKey) -> Option<&Fact> {
        self.facts.get(key)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// All facts reported for a concept, sorted by context id.
    pub fn facts_for(&self, concept: &str) -> &[Fact] {
        self.by_concept
            .get(concept)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The set of fiscal years represented in the index, derived from the
    /// end-preferred slot of each fact's period key.
    pub fn years(&self) -> BTreeSet<String> {
        self.facts
            .values()
            .filter_map(|f| f.year())
            .map(str::to_string)
            .collect()
    }
}

fn local_of(name: QName<'_>) -> String {
    String::from_utf8_lossy(name.local_name().into_inner()).into_owned()
}

fn prefix_of(name: QName<'_>) -> Option<String> {
    name.prefix()
        .map(|p| String::from_utf8_lossy(p.into_inner()).into_owned())
}

/// Case-insensitive attribute lookup. Malformed attributes are ignored.
fn attr_value(element: &BytesStart<'_>, name: &str) -> Option<String> {
    for attr in element.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.into_inner());
        if key.eq_ignore_ascii_case(name) {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

/// Reads the trimmed text content of an element, consuming up to its end tag.
fn element_text(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<String> {
    let end = start.to_end().into_owned();
    let text = reader.read_text(end.name())?;
    Ok(text.trim().to_string())
}

/// First pass: map context id → period key and dimensional members.
fn index_contexts(text: &str) -> Result<HashMap<String, Context>> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut out = HashMap::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) if local_of(e.name()).eq_ignore_ascii_case("context") => {
                let id = attr_value(&e, "id");
                let context = read_context_body(&mut reader)?;
                // A context without an id can never be referenced.
                if let Some(id) = id {
                    out.insert(id, context);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Consumes the body of a `<context>` element, collecting the period dates
/// and any explicit dimensional members under segment/scenario.
fn read_context_body(reader: &mut Reader<&[u8]>) -> Result<Context> {
    let mut start_date = String::new();
    let mut end_date = String::new();
    let mut instant = String::new();
    let mut dims = BTreeMap::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = local_of(e.name());
                if local.eq_ignore_ascii_case("startDate") {
                    start_date = element_text(reader, &e)?;
                } else if local.eq_ignore_ascii_case("endDate") {
                    end_date = element_text(reader, &e)?;
                } else if local.eq_ignore_ascii_case("instant") {
                    instant = element_text(reader, &e)?;
                } else if local.eq_ignore_ascii_case("explicitMember") {
                    let axis = attr_value(&e, "dimension").unwrap_or_default();
                    let member = element_text(reader, &e)?;
                    // Entries missing either axis or member text are dropped.
                    if !axis.is_empty() && !member.is_empty() {
                        dims.insert(axis, member);
                    }
                }
            }
            Event::End(e) if local_of(e.name()).eq_ignore_ascii_case("context") => break,
            Event::Eof => {
                return Err(crate::ExtractError::Xml(
                    "unterminated context element".to_string(),
                ));
            }
            _ => {}
        }
    }

    let period = if !instant.is_empty() {
        PeriodKey::instant(instant)
    } else {
        PeriodKey {
            start: start_date,
            end: end_date,
        }
    };

    Ok(Context { period, dims })
}

/// Second pass: scan every namespace-qualified non-structural element as a
/// candidate fact, resolving its context and applying the declared scale.
fn index_facts(
    text: &str,
    contexts: &HashMap<String, Context>,
) -> Result<HashMap<FactKey, Fact>> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut facts: HashMap<FactKey, Fact> = HashMap::new();
    let mut skipped_no_context_ref = 0usize;
    let mut skipped_no_text = 0usize;
    let mut skipped_not_numeric = 0usize;
    let mut skipped_unknown_context = 0usize;

    loop {
        let element = match reader.read_event()? {
            Event::Start(e) => e,
            Event::Eof => break,
            _ => continue,
        };

        let name = element.name();
        let Some(prefix) = prefix_of(name) else {
            // Unprefixed elements are structural in extracted instances.
            continue;
        };
        let local = local_of(name);
        if STRUCTURAL_PREFIXES
            .iter()
            .any(|p| prefix.eq_ignore_ascii_case(p))
            || STRUCTURAL_ELEMENTS
                .iter()
                .any(|s| local.eq_ignore_ascii_case(s))
        {
            continue;
        }

        let Some(context_id) = attr_value(&element, "contextRef") else {
            skipped_no_context_ref += 1;
            continue;
        };
        let unit = attr_value(&element, "unitRef").unwrap_or_default();
        let decimals = attr_value(&element, "decimals");
        let scale = attr_value(&element, "scale");

        let text_content = element_text(&mut reader, &element)?;
        if text_content.is_empty() {
            skipped_no_text += 1;
            continue;
        }
        let Ok(mut value) = text_content.replace(',', "").parse::<f64>() else {
            skipped_not_numeric += 1;
            continue;
        };
        let Some(context) = contexts.get(&context_id) else {
            skipped_unknown_context += 1;
            continue;
        };

        if let Some(scale) = scale {
            if let Ok(power) = scale.trim().parse::<i32>() {
                if power != 0 {
                    value *= 10f64.powi(power);
                }
            }
        }

        let fact = Fact {
            concept: format!("{prefix}:{local}"),
            value,
            unit,
            decimals,
            period: context.period.clone(),
            dims: context.dims.clone(),
            context_id,
        };
        facts.insert(fact.key(), fact);
    }

    tracing::debug!(
        facts = facts.len(),
        skipped_no_context_ref,
        skipped_no_text,
        skipped_not_numeric,
        skipped_unknown_context,
        "fact scan complete"
    );
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
            xmlns:us-gaap="http://fasb.org/us-gaap/2024-01-31"
            xmlns:xbrldi="http://xbrl.org/2006/xbrldi">
  <xbrli:context id="D2024">
    <xbrli:entity>
      <xbrli:identifier scheme="http://www.sec.gov/CIK">0000000000</xbrli:identifier>
    </xbrli:entity>
    <xbrli:period>
      <xbrli:startDate>2024-01-01</xbrli:startDate>
      <xbrli:endDate>2024-12-31</xbrli:endDate>
    </xbrli:period>
  </xbrli:context>
  <xbrli:context id="I2024">
    <xbrli:entity>
      <xbrli:identifier scheme="http://www.sec.gov/CIK">0000000000</xbrli:identifier>
    </xbrli:entity>
    <xbrli:period>
      <xbrli:instant>2024-12-31</xbrli:instant>
    </xbrli:period>
  </xbrli:context>
  <xbrli:unit id="USD">
    <xbrli:measure>iso4217:USD</xbrli:measure>
  </xbrli:unit>
  <us-gaap:Revenues contextRef="D2024" unitRef="USD" decimals="0">12,345</us-gaap:Revenues>
  <us-gaap:Assets contextRef="I2024" unitRef="USD" decimals="0">67890</us-gaap:Assets>
</xbrli:xbrl>"#;

    #[test]
    fn indexes_contexts_and_facts() {
        let index = XbrlIndex::parse(MINIMAL).unwrap();
        assert_eq!(index.contexts().len(), 2);
        assert_eq!(index.len(), 2);

        let revenues = index.facts_for("us-gaap:Revenues");
        assert_eq!(revenues.len(), 1);
        assert_eq!(revenues[0].value, 12345.0);
        assert_eq!(revenues[0].unit, "USD");
        assert_eq!(revenues[0].period_type(), Some(PeriodType::Duration));
        assert_eq!(revenues[0].period.date(), "2024-12-31");

        let assets = index.facts_for("us-gaap:Assets");
        assert_eq!(assets[0].period_type(), Some(PeriodType::Instant));
        assert_eq!(assets[0].period, PeriodKey::instant("2024-12-31"));
    }

    #[test]
    fn years_derived_from_end_slot() {
        let index = XbrlIndex::parse(MINIMAL).unwrap();
        let years = index.years();
        assert_eq!(years.len(), 1);
        assert!(years.contains("2024"));
    }

    #[test]
    fn structural_elements_are_not_facts() {
        let index = XbrlIndex::parse(MINIMAL).unwrap();
        assert!(index.facts_for("xbrli:identifier").is_empty());
        assert!(index.facts_for("xbrli:measure").is_empty());
    }

    #[test]
    fn parse_is_idempotent() {
        let a = XbrlIndex::parse(MINIMAL).unwrap();
        let b = XbrlIndex::parse(MINIMAL).unwrap();
        assert_eq!(a.len(), b.len());
        for fact in a.facts() {
            let twin = b.get(&fact.key()).expect("fact present in both indexes");
            assert_eq!(twin.value, fact.value);
        }
    }

    #[test]
    fn malformed_document_is_fatal() {
        assert!(XbrlIndex::parse("<a><b></c></a>").is_err());
    }

    #[test]
    fn duplicate_key_takes_last_value() {
        let xml = r#"<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
                                 xmlns:us-gaap="http://fasb.org/us-gaap/2024-01-31">
          <xbrli:context id="c1">
            <xbrli:period><xbrli:instant>2024-12-31</xbrli:instant></xbrli:period>
          </xbrli:context>
          <us-gaap:Assets contextRef="c1" unitRef="USD">100</us-gaap:Assets>
          <us-gaap:Assets contextRef="c1" unitRef="USD">200</us-gaap:Assets>
        </xbrli:xbrl>"#;
        let index = XbrlIndex::parse(xml).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.facts_for("us-gaap:Assets")[0].value, 200.0);
    }

    #[test]
    fn scale_attribute_multiplies_value() {
        let xml = r#"<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
                                 xmlns:us-gaap="http://fasb.org/us-gaap/2024-01-31">
          <xbrli:context id="c1">
            <xbrli:period><xbrli:instant>2024-12-31</xbrli:instant></xbrli:period>
          </xbrli:context>
          <us-gaap:Assets contextRef="c1" unitRef="USD" scale="3">5</us-gaap:Assets>
          <us-gaap:Liabilities contextRef="c1" unitRef="USD" scale="0">7</us-gaap:Liabilities>
        </xbrli:xbrl>"#;
        let index = XbrlIndex::parse(xml).unwrap();
        assert_eq!(index.facts_for("us-gaap:Assets")[0].value, 5000.0);
        assert_eq!(index.facts_for("us-gaap:Liabilities")[0].value, 7.0);
    }

    #[test]
    fn anomalous_elements_are_skipped_not_fatal() {
        let xml = r#"<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
                                 xmlns:us-gaap="http://fasb.org/us-gaap/2024-01-31">
          <xbrli:context id="c1">
            <xbrli:period><xbrli:instant>2024-12-31</xbrli:instant></xbrli:period>
          </xbrli:context>
          <us-gaap:NoRef unitRef="USD">1</us-gaap:NoRef>
          <us-gaap:Blank contextRef="c1" unitRef="USD">  </us-gaap:Blank>
          <us-gaap:Words contextRef="c1" unitRef="USD">not a number</us-gaap:Words>
          <us-gaap:Ghost contextRef="missing" unitRef="USD">3</us-gaap:Ghost>
          <us-gaap:Good contextRef="c1" unitRef="USD">42</us-gaap:Good>
        </xbrli:xbrl>"#;
        let index = XbrlIndex::parse(xml).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.facts_for("us-gaap:Good")[0].value, 42.0);
    }

    #[test]
    fn dimensions_collected_from_segment_and_scenario() {
        let xml = r#"<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
                                 xmlns:xbrldi="http://xbrl.org/2006/xbrldi"
                                 xmlns:us-gaap="http://fasb.org/us-gaap/2024-01-31">
          <xbrli:context id="seg">
            <xbrli:entity>
              <xbrli:segment>
                <xbrldi:explicitMember dimension="us-gaap:StatementBusinessSegmentsAxis">acme:AutoMember</xbrldi:explicitMember>
              </xbrli:segment>
            </xbrli:entity>
            <xbrli:period><xbrli:instant>2024-12-31</xbrli:instant></xbrli:period>
          </xbrli:context>
          <xbrli:context id="scen">
            <xbrli:period><xbrli:instant>2024-12-31</xbrli:instant></xbrli:period>
            <xbrli:scenario>
              <xbrldi:explicitMember dimension="us-gaap:ProductOrServiceAxis">acme:WidgetMember</xbrldi:explicitMember>
            </xbrli:scenario>
          </xbrli:context>
          <us-gaap:Revenues contextRef="seg" unitRef="USD">10</us-gaap:Revenues>
          <us-gaap:Revenues contextRef="scen" unitRef="USD">20</us-gaap:Revenues>
        </xbrli:xbrl>"#;
        let index = XbrlIndex::parse(xml).unwrap();
        let facts = index.facts_for("us-gaap:Revenues");
        assert_eq!(facts.len(), 2);
        let seg = facts.iter().find(|f| f.context_id == "seg").unwrap();
        assert_eq!(
            seg.dims.get("us-gaap:StatementBusinessSegmentsAxis"),
            Some(&"acme:AutoMember".to_string())
        );
        let scen = facts.iter().find(|f| f.context_id == "scen").unwrap();
        assert_eq!(
            scen.dims.get("us-gaap:ProductOrServiceAxis"),
            Some(&"acme:WidgetMember".to_string())
        );
    }

    #[test]
    fn context_without_period_never_matches_a_period_type() {
        let xml = r#"<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
                                 xmlns:us-gaap="http://fasb.org/us-gaap/2024-01-31">
          <xbrli:context id="c1">
            <xbrli:entity>
              <xbrli:identifier scheme="s">x</xbrli:identifier>
            </xbrli:entity>
          </xbrli:context>
          <us-gaap:Assets contextRef="c1" unitRef="USD">1</us-gaap:Assets>
        </xbrli:xbrl>"#;
        let index = XbrlIndex::parse(xml).unwrap();
        let fact = &index.facts_for("us-gaap:Assets")[0];
        assert!(fact.period.is_empty());
        assert_eq!(fact.period_type(), None);
        assert_eq!(fact.year(), None);
        assert!(index.years().is_empty());
    }
}
