use std::time::Duration;

/// Configuration for the SEC client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// User agent string for HTTP requests
    pub user_agent: String,
    /// Rate limit in requests per second
    pub rate_limit: u32,
    /// HTTP request timeout
    pub timeout: Duration,
    /// Base URLs for the EDGAR services used by this crate
    pub base_urls: EdgarUrls,
}

/// Base URLs for the EDGAR services used by this crate
#[derive(Debug, Clone)]
pub struct EdgarUrls {
    /// Site root, used to absolutize relative document links
    pub base: String,
    /// Browse endpoint serving the Atom filing listings
    pub browse: String,
    /// Files endpoint serving the company ticker table
    pub files: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "factkit/0.1.0".to_string(),
            rate_limit: 10,
            timeout: Duration::from_secs(30),
            base_urls: EdgarUrls::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a new ClientConfig with custom settings
    pub fn new(
        user_agent: impl Into<String>,
        rate_limit: u32,
        timeout: Duration,
        base_urls: Option<EdgarUrls>,
    ) -> Self {
        Self {
            user_agent: user_agent.into(),
            rate_limit,
            timeout,
            base_urls: base_urls.unwrap_or_default(),
        }
    }
}

impl Default for EdgarUrls {
    fn default() -> Self {
        Self {
            base: "https://www.sec.gov".to_string(),
            browse: "https://www.sec.gov/cgi-bin/browse-edgar".to_string(),
            files: "https://www.sec.gov/files".to_string(),
        }
    }
}
