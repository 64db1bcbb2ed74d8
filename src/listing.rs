use std::collections::HashSet;

use tracing::{info, warn};

use crate::parser::html;
use crate::site::Site;

/// Detail-page links from a listing page, deduplicated in first-seen order.
///
/// A page without the listing container yields an empty list rather than an
/// error, so "no links" stays distinct from a failed fetch.
pub fn collect(page: &str, site: Site) -> Vec<String> {
    let doc = html::parse(page);
    if html::select_first(&doc, site.listing_container()).is_none() {
        warn!(%site, container = site.listing_container(), "listing container not found");
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let links: Vec<String> = html::select_all(&doc, site.listing_selector())
        .into_iter()
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .filter(|href| seen.insert(href.clone()))
        .collect();

    info!(%site, links = links.len(), "collected detail links");
    links
}
