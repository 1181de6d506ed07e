//! Trait definition for the filing-retrieval collaborator.
//!
//! The extraction core is pure and synchronous; everything that talks to the
//! network is grouped behind [`FilingOperations`] so callers can substitute a
//! mock (or a cache-backed replay) when driving the core in tests.

use async_trait::async_trait;

use crate::client::Filing;
use crate::error::Result;

/// Operations for resolving an entity and retrieving its XBRL instance
/// documents from EDGAR.
///
/// Implemented by [`SecClient`](crate::SecClient). All operations are
/// read-only lookups against SEC endpoints; failures surface as retryable
/// request errors, never as extraction errors.
#[async_trait]
pub trait FilingOperations {
    /// Resolves a ticker symbol to its Central Index Key.
    async fn company_cik(&self, ticker: &str) -> Result<String>;
    /// Lists recent filings of one form type for a CIK, newest first.
    async fn filings(&self, cik: &str, form: &str, count: usize) -> Result<Vec<Filing>>;
    /// Locates the XBRL instance document link on a filing index page.
    async fn instance_document_url(&self, filing_url: &str) -> Result<String>;
    /// Fetches the raw instance document text.
    async fn fetch_instance(&self, url: &str) -> Result<String>;
}
