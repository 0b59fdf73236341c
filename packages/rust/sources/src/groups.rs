//! Business-group membership index.
//!
//! The group list page links to one page per group; each group page lists its
//! member securities in `#tblStockList`.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use companyinfo_shared::text::append_groups;
use companyinfo_shared::{DetailConfig, GroupMap, SecurityId};

use crate::session::BrowserSession;

/// `MARKET_CAT=集團股`, percent-encoded as it appears in resolved URLs.
const GROUP_MARKET_MARKER: &str = "MARKET_CAT=%E9%9B%86%E5%9C%98%E8%82%A1";
const INDUSTRY_MARKER: &str = "INDUSTRY_CAT";

static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static MEMBER_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("table#tblStockList a[href*='StockDetail.asp?STOCK_ID=']").unwrap()
});

/// `(group name, group page)` links from the group list page, sorted by name.
pub fn parse_group_links(html: &str, base: &Url) -> Vec<(String, Url)> {
    let doc = Html::parse_document(html);
    let mut links = BTreeSet::new();

    for el in doc.select(&LINK_SEL) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        let name = el.text().collect::<String>().trim().to_string();
        if name.is_empty()
            || !resolved.as_str().contains(GROUP_MARKET_MARKER)
            || !resolved.as_str().contains(INDUSTRY_MARKER)
        {
            continue;
        }
        links.insert((name, resolved));
    }

    links.into_iter().collect()
}

/// Member identifiers listed on one group page, in page order, each once.
pub fn parse_group_members(html: &str, base: &Url) -> Vec<SecurityId> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    doc.select(&MEMBER_SEL)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter_map(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "STOCK_ID")
                .map(|(_, v)| SecurityId::new(&v))
        })
        .filter(|id| !id.as_str().is_empty() && seen.insert(id.clone()))
        .collect()
}

/// Walk every group page and build identifier → comma-delimited group names.
///
/// A failing list page yields an empty map; a failing group page is skipped.
#[instrument(skip_all, fields(url = %config.group_list_url))]
pub async fn fetch_group_map<S: BrowserSession>(session: &S, config: &DetailConfig) -> GroupMap {
    let mut map = GroupMap::new();

    let base = match Url::parse(&config.group_list_url) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "invalid group list URL");
            return map;
        }
    };
    let list_html = match session.load(base.as_str()).await {
        Ok(html) => html,
        Err(e) => {
            warn!(error = %e, "group list page failed, continuing without groups");
            return map;
        }
    };

    let links = parse_group_links(&list_html, &base);
    info!(groups = links.len(), "mapping group members");

    for (i, (name, url)) in links.iter().enumerate() {
        match session.load(url.as_str()).await {
            Ok(html) => {
                let members = parse_group_members(&html, url);
                debug!(group = %name, members = members.len(), "group page parsed");
                for id in members {
                    let merged = append_groups(map.get(&id).map(String::as_str), name);
                    if let Some(merged) = merged {
                        map.insert(id, merged);
                    }
                }
            }
            Err(e) => warn!(group = %name, error = %e, "skipping group page"),
        }

        if i + 1 < links.len() {
            tokio::time::sleep(config.group_delay()).await;
        }
    }

    info!(securities = map.len(), "group map built");
    map
}
