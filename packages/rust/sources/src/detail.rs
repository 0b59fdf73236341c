//! Per-security detail pages: business description, related concepts and
//! market capitalisation.
//!
//! Field labels on the detail page move around between site revisions, so
//! each field is tried against several label patterns in order and a miss is
//! simply `None`.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use companyinfo_shared::text::{non_blank, normalize_concepts};
use companyinfo_shared::{DetailConfig, DetailFields, GroupMap, Result, SecurityId};

use crate::groups::fetch_group_map;
use crate::session::BrowserSession;

const MAIN_BUSINESS: &str = "主要業務";
const RELATED_CONCEPTS: &str = "相關概念";
/// Plain market-cap labels tried after the unit-suffixed forms.
const MARKET_CAP_LABELS: [&str; 3] = ["市值", "目前市值", "總市值"];

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static MAIN_BUSINESS_PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?is)<nobr>{MAIN_BUSINESS}</nobr>.*?<p[^>]*>(.*?)</p>")).unwrap()
});

/// `市值` optionally followed by a parenthesised unit, e.g. `市值 (億)`.
static MARKET_CAP_WITH_UNIT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)<nobr>\s*市值(?:\s*\([^<]*\))?\s*</nobr>.*?<td[^>]*>(.*?)</td>",
        r"(?is)>市值(?:\s*\([^<]*\))?</td>\s*<td[^>]*>(.*?)</td>",
        r"(?is)>市值(?:\s*\([^<]*\))?</nobr>.*?<td[^>]*>(.*?)</td>",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Generic label → value-cell patterns for every label this module reads.
static LABEL_PATTERNS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    [MAIN_BUSINESS, RELATED_CONCEPTS]
        .into_iter()
        .chain(MARKET_CAP_LABELS)
        .map(|label| (label, label_patterns(label)))
        .collect()
});

fn label_patterns(label: &str) -> Vec<Regex> {
    let l = regex::escape(label);
    [
        format!(r"(?is)<nobr>{l}</nobr>.*?<td[^>]*>(.*?)</td>"),
        format!(r"(?is)>{l}</td>\s*<td[^>]*>(.*?)</td>"),
        format!(r"(?is)>{l}</nobr>.*?<td[^>]*>(.*?)</td>"),
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Extract the three detail fields from a page.
pub fn parse_detail(html: &str) -> DetailFields {
    let main_business = first_capture(html, std::slice::from_ref(&*MAIN_BUSINESS_PARAGRAPH))
        .or_else(|| labelled(html, MAIN_BUSINESS));

    let related_concepts =
        labelled(html, RELATED_CONCEPTS).and_then(|raw| normalize_concepts(&raw));

    let market_cap = first_capture(html, &MARKET_CAP_WITH_UNIT)
        .or_else(|| MARKET_CAP_LABELS.iter().find_map(|l| labelled(html, l)));

    DetailFields {
        main_business,
        related_concepts,
        market_cap,
    }
}

fn labelled(html: &str, label: &str) -> Option<String> {
    let (_, patterns) = LABEL_PATTERNS.iter().find(|(l, _)| *l == label)?;
    first_capture(html, patterns)
}

/// First pattern that matches and yields a non-blank value.
fn first_capture(html: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|re| {
        let caps = re.captures(html)?;
        clean_cell(&caps[1])
    })
}

fn clean_cell(raw: &str) -> Option<String> {
    let text = TAG.replace_all(raw, "");
    non_blank(&text.replace("&nbsp;", " "))
}

// ---------------------------------------------------------------------------
// DetailSource
// ---------------------------------------------------------------------------

/// Per-identifier detail fetches and the bulk group index, behind one session.
#[allow(async_fn_in_trait)]
pub trait DetailSource {
    /// One attempt at loading and parsing an identifier's detail page.
    async fn fetch_detail(&self, id: &SecurityId) -> Result<DetailFields>;

    /// identifier → group names. Degrades to an empty map.
    async fn group_map(&self) -> GroupMap;

    /// Release the underlying session.
    async fn close(&self);
}

/// [`DetailSource`] backed by a [`BrowserSession`].
pub struct WebDetailSource<S> {
    session: S,
    config: DetailConfig,
}

impl<S: BrowserSession> WebDetailSource<S> {
    pub fn new(session: S, config: DetailConfig) -> Self {
        Self { session, config }
    }
}

impl<S: BrowserSession> DetailSource for WebDetailSource<S> {
    #[instrument(skip_all, fields(id = %id))]
    async fn fetch_detail(&self, id: &SecurityId) -> Result<DetailFields> {
        let html = self.session.load(&self.config.detail_url(id.as_str())).await?;
        let fields = parse_detail(&html);
        debug!(
            main_business = fields.main_business.is_some(),
            related_concepts = fields.related_concepts.is_some(),
            market_cap = fields.market_cap.is_some(),
            "parsed detail page"
        );
        Ok(fields)
    }

    async fn group_map(&self) -> GroupMap {
        fetch_group_map(&self.session, &self.config).await
    }

    async fn close(&self) {
        self.session.close().await;
    }
}
