//! # factkit - XBRL fact indexing and rule-based metric extraction
//!
//! factkit turns XBRL-tagged SEC EDGAR filings into per-year financial
//! metrics. It indexes an instance document into structured facts, then
//! evaluates a declarative per-entity rule configuration against that index
//! to assemble named metrics, business-segment values, and categorized
//! balance-sheet line items.
//!
//! ## Features
//!
//! - **Fact indexing** - Contexts, periods, and dimensional qualifiers
//!   resolved into a deduplicated fact index
//! - **Rule engine** - Alias priority, dimensional filtering, unit and
//!   period-type constraints, consolidated-view restriction, year ranges,
//!   and six aggregation strategies
//! - **Missing-data reporting** - A read-only diagnostic of which rules
//!   produced no value for which years
//! - **EDGAR client** (`client` feature) - Rate-limited retrieval of ticker
//!   mappings, filing listings, and instance documents, with an explicit
//!   file-backed ticker cache
//!
//! The extraction core is synchronous and pure; only the client is async.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use factkit::{FilingOperations, SecClient, TickerCache, XbrlIndex};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), factkit::ExtractError> {
//!     let config = factkit::load_company_config("config/rules.json", "PGR")?;
//!
//!     let cache = TickerCache::load(".cache/tickers.json")?;
//!     let client = SecClient::new("YourAppName contact@example.com", cache)?;
//!
//!     let cik = client.company_cik("PGR").await?;
//!     let filings = client.filings(&cik, "10-K", 5).await?;
//!     let xml_url = client.instance_document_url(&filings[0].filing_url).await?;
//!     let text = client.fetch_instance(&xml_url).await?;
//!
//!     let index = XbrlIndex::parse(&text)?;
//!     let results = factkit::extract_all(&index, &config);
//!     for (year, values) in results.iter() {
//!         println!("{year}: {values:?}");
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod extract;
mod index;
mod rules;

// Client modules (network collaborators)
#[cfg(feature = "client")]
mod cache;
#[cfg(feature = "client")]
mod client;
#[cfg(feature = "client")]
mod config;
#[cfg(feature = "client")]
mod traits;

pub use error::{ExtractError, Result};
pub use extract::{
    ExtractionResult, MissingDataReport, YearValues, extract_all, report_missing_data,
};
pub use index::{Context, Fact, FactKey, PeriodKey, PeriodType, XbrlIndex};
pub use rules::{
    BALANCE_SHEET_PREFIX, CompanyConfig, DimSpec, Members, MetricRule, Rule, SegmentRule,
    Strategy, YearRange, company_config_from_value, deep_merge, load_company_config,
};

#[cfg(feature = "client")]
pub use cache::TickerCache;
#[cfg(feature = "client")]
pub use client::{Filing, SecClient};
#[cfg(feature = "client")]
pub use config::{ClientConfig, EdgarUrls};
#[cfg(feature = "client")]
pub use traits::FilingOperations;

/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
