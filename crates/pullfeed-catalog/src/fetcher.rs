//! CatalogFetcher: turns upstream records into [`Release`]s.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use pullfeed_core::{Publisher, PullFeedError, Release, ReleaseFormat, Result};

use crate::source::{CatalogSource, DetailsRequest, ReleaseDetails, ReleaseSummary};

/// Fetches and normalizes one publisher's weekly releases.
pub struct CatalogFetcher {
    source: Arc<dyn CatalogSource>,
    details_chunk: usize,
}

impl CatalogFetcher {
    pub fn new(source: Arc<dyn CatalogSource>, details_chunk: usize) -> Self {
        Self {
            source,
            details_chunk: details_chunk.max(1),
        }
    }

    /// Listing failure is a fetch error. Bad records and failed detail chunks are
    /// skipped; an empty week is a valid result.
    pub async fn fetch(&self, publisher: &Publisher) -> Result<Vec<Release>> {
        let raw = self
            .source
            .releases(publisher.source_id)
            .await
            .map_err(|e| PullFeedError::Fetch {
                publisher: publisher.id,
                cause: e.to_string(),
            })?;

        let mut summaries: HashMap<u64, ReleaseSummary> = HashMap::with_capacity(raw.len());
        let mut requests = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_value::<ReleaseSummary>(item) {
                Ok(s) => {
                    if !summaries.contains_key(&s.id) {
                        requests.push(DetailsRequest::from(&s));
                        summaries.insert(s.id, s);
                    }
                }
                Err(e) => tracing::warn!("⚠️ [{}] skipping release row: {e}", publisher.name),
            }
        }

        let mut releases = Vec::with_capacity(requests.len());
        let mut skipped = 0usize;
        for chunk in requests.chunks(self.details_chunk) {
            let items = match self.source.details(chunk).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(
                        "⚠️ [{}] details lookup failed for {} releases: {e}",
                        publisher.name,
                        chunk.len()
                    );
                    skipped += chunk.len();
                    continue;
                }
            };
            for item in items {
                if let Some(err) = item.get("error") {
                    tracing::debug!("[{}] upstream dropped a record: {err}", publisher.name);
                    skipped += 1;
                    continue;
                }
                let details = match serde_json::from_value::<ReleaseDetails>(item) {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("⚠️ [{}] undecodable detail record: {e}", publisher.name);
                        skipped += 1;
                        continue;
                    }
                };
                match normalize(details, &summaries, publisher) {
                    Some(release) => releases.push(release),
                    None => skipped += 1,
                }
            }
        }

        tracing::info!(
            "📚 [{}] fetched {} releases ({} skipped)",
            publisher.name,
            releases.len(),
            skipped
        );
        Ok(releases)
    }
}

/// Merge a detail record with its listing row. `None` when the record has no
/// usable title or date.
fn normalize(
    details: ReleaseDetails,
    summaries: &HashMap<u64, ReleaseSummary>,
    publisher: &Publisher,
) -> Option<Release> {
    let summary = summaries.get(&details.id);

    let title = details
        .title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| summary.map(|s| s.title.clone()))?;
    let release_date = details
        .release_date
        .as_deref()
        .and_then(parse_date)
        .or_else(|| summary.and_then(|s| s.date.as_deref()).and_then(parse_date))?;

    let mut creators: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for credit in details.creators {
        let name = credit.name.trim();
        if name.is_empty() {
            continue;
        }
        for role in credit.role.split(',').map(str::trim).filter(|r| !r.is_empty()) {
            creators
                .entry(title_case(role))
                .or_default()
                .insert(name.to_string());
        }
    }

    Some(Release {
        id: details.id,
        publisher: publisher.id,
        title: title.trim().to_string(),
        description: details
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        creators,
        format: details
            .format
            .as_deref()
            .map(ReleaseFormat::from_label)
            .unwrap_or(ReleaseFormat::Issue),
        release_date,
        price: details.price.or_else(|| summary.and_then(|s| s.price)),
        page_count: details.pages.filter(|&p| p > 0),
        cover_image_url: details
            .cover_image
            .or_else(|| summary.and_then(|s| s.cover_image.clone())),
        detail_url: details.url.or_else(|| summary.and_then(|s| s.url.clone())),
    })
}

/// Accepts `2026-10-14` and RFC 3339 timestamps.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let day = s.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
