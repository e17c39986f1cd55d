//! Single page retrieval

use std::time::Duration;

use async_trait::async_trait;
use rhapi_common::types::{Item, PagePayload};
use tracing::{debug, warn};

/// Why a page fetch produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// The worker answered with a non-success HTTP status
    Status(u16),
    /// No complete answer within the per-page timeout
    Timeout,
    /// The body was not a valid page payload
    Malformed,
    /// Connection refused, reset, or similar
    Transport,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::Status(code) => write!(f, "status {code}"),
            FetchFailure::Timeout => f.write_str("timeout"),
            FetchFailure::Malformed => f.write_str("malformed payload"),
            FetchFailure::Transport => f.write_str("transport error"),
        }
    }
}

/// Result of fetching one page.
///
/// `exhausted` is set when the page produced no items, whether because it
/// was empty or because the fetch failed; `failure` tells the two apart.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub page: u32,
    pub exhausted: bool,
    pub items: Vec<Item>,
    pub version: Option<String>,
    pub failure: Option<FetchFailure>,
}

impl FetchOutcome {
    /// A page the worker served successfully (possibly empty)
    pub fn served(page: u32, items: Vec<Item>, version: Option<String>) -> Self {
        Self {
            page,
            exhausted: items.is_empty(),
            items,
            version,
            failure: None,
        }
    }

    pub fn failed(page: u32, failure: FetchFailure) -> Self {
        Self {
            page,
            exhausted: true,
            items: Vec::new(),
            version: None,
            failure: Some(failure),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Source of catalog pages.
///
/// Implementations never return errors: every failure is folded into an
/// exhausted [`FetchOutcome`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, page: u32) -> FetchOutcome;
}

/// Fetches pages from the worker's HTTP interface (`GET <data_url>?page=N`)
pub struct HttpPageFetcher {
    client: reqwest::Client,
    data_url: String,
    timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new(data_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rhapi/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            data_url: data_url.into(),
            timeout,
        })
    }

    fn classify(page: u32, error: &reqwest::Error) -> FetchOutcome {
        let failure = if error.is_timeout() {
            FetchFailure::Timeout
        } else {
            FetchFailure::Transport
        };
        warn!(page, error = %error, %failure, "Page fetch failed");
        FetchOutcome::failed(page, failure)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, page: u32) -> FetchOutcome {
        let response = match self
            .client
            .get(&self.data_url)
            .query(&[("page", page)])
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Self::classify(page, &e),
        };

        let status = response.status();
        if !status.is_success() {
            warn!(page, %status, "Worker returned error status for page");
            return FetchOutcome::failed(page, FetchFailure::Status(status.as_u16()));
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return Self::classify(page, &e),
        };

        match PagePayload::decode(&body) {
            Ok(decoded) => {
                if decoded.skipped > 0 {
                    warn!(page, skipped = decoded.skipped, "Dropped items without an id");
                }
                debug!(page, items = decoded.items.len(), "Page fetched");
                FetchOutcome::served(page, decoded.items, decoded.version)
            },
            Err(e) => {
                warn!(page, error = %e, "Malformed page payload");
                FetchOutcome::failed(page, FetchFailure::Malformed)
            },
        }
    }
}
