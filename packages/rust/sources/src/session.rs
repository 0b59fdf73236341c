//! Stateful page session used for the detail pages and the group index.
//!
//! The detail host sets cookies on its first response and serves an
//! "initializing" interstitial to clients that do not return them, so every
//! page load goes through one long-lived session.

use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::Client;
use tracing::{debug, info};

use companyinfo_shared::{CompanyInfoError, DetailConfig, HttpConfig, Result};

use crate::http::{check_status, classify_send_error, client_builder};

/// Marker text of the interstitial page shown before cookies are set.
const INITIALIZING_MARKER: &str = "初始化中";

/// A page-loading session scoped to one run.
#[allow(async_fn_in_trait)]
pub trait BrowserSession {
    /// Load `url` and return the rendered HTML.
    async fn load(&self, url: &str) -> Result<String>;

    /// Release the session. Loads after `close` fail.
    async fn close(&self);
}

/// Cookie-keeping HTTP session with a browser user agent.
pub struct HttpSession {
    client: Client,
    closed: AtomicBool,
}

impl HttpSession {
    pub fn new(http: &HttpConfig, detail: &DetailConfig) -> Result<Self> {
        let client = client_builder(
            &http.user_agent,
            detail.page_timeout(),
            http.accept_invalid_certs,
        )
        .cookie_store(true)
        .build()
        .map_err(|e| CompanyInfoError::Network(format!("failed to build session client: {e}")))?;

        Ok(Self {
            client,
            closed: AtomicBool::new(false),
        })
    }
}

impl BrowserSession for HttpSession {
    async fn load(&self, url: &str) -> Result<String> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(CompanyInfoError::Network(format!("{url}: session closed")));
        }
        debug!(%url, "loading page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_send_error(url, e))?;
        check_status(url, response.status())?;

        let html = response
            .text()
            .await
            .map_err(|e| classify_send_error(url, e))?;

        if html.contains(INITIALIZING_MARKER) {
            return Err(CompanyInfoError::Transient(format!(
                "{url}: page still initializing"
            )));
        }
        Ok(html)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::Relaxed) {
            info!("page session closed");
        }
    }
}
