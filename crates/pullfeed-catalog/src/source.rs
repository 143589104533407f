//! Upstream catalog service (League of Comic Geeks proxy).
//!
//! Two calls: a release listing per publisher, then a batched details lookup
//! keyed by `{comicId, title slug, variantId}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Failure talking to the catalog service.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// One row of the weekly release listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSummary {
    pub id: u64,
    pub title: String,
    /// Slug used by the details endpoint.
    pub title_path: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub variant_id: Option<String>,
}

/// Details lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsRequest {
    pub comic_id: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
}

impl From<&ReleaseSummary> for DetailsRequest {
    fn from(s: &ReleaseSummary) -> Self {
        Self {
            comic_id: s.id,
            title: s.title_path.clone(),
            variant_id: s.variant_id.clone(),
        }
    }
}

/// Detail record. Everything except `id` may be missing on partial records.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDetails {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub creators: Vec<CreatorCredit>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatorCredit {
    pub name: String,
    #[serde(default)]
    pub role: String,
}

/// Raw catalog access. Implementations return undecoded detail items so the
/// fetcher can drop bad records one by one.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn releases(&self, source_id: u32) -> Result<Vec<serde_json::Value>, SourceError>;

    async fn details(&self, batch: &[DetailsRequest])
    -> Result<Vec<serde_json::Value>, SourceError>;
}

/// HTTP implementation over reqwest.
pub struct HttpCatalogSource {
    client: reqwest::Client,
    api_url: String,
}

impl HttpCatalogSource {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pullfeed/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn decode(resp: reqwest::Response) -> Result<Vec<serde_json::Value>, SourceError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        let body: serde_json::Value = resp.json().await?;
        match body {
            serde_json::Value::Array(items) => Ok(items),
            other => Err(SourceError::Decode(format!(
                "expected array, got {}",
                kind_of(&other)
            ))),
        }
    }
}

fn kind_of(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn releases(&self, source_id: u32) -> Result<Vec<serde_json::Value>, SourceError> {
        let url = format!("{}/comic/releases", self.api_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("publisher", source_id.to_string()),
                ("issue", "true".into()),
                ("annual", "true".into()),
                ("digital", "true".into()),
                ("variant", "false".into()),
                ("trade", "true".into()),
                ("hardcover", "true".into()),
            ])
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn details(
        &self,
        batch: &[DetailsRequest],
    ) -> Result<Vec<serde_json::Value>, SourceError> {
        let url = format!("{}/comic/details", self.api_url);
        let resp = self.client.post(&url).json(batch).send().await?;
        Self::decode(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_decode() {
        let v = serde_json::json!({
            "id": 42, "title": "Batman #150", "titlePath": "batman-150",
            "publisher": "DC Comics", "date": "2026-10-14T00:00:00Z",
            "price": 4.99, "coverImage": "https://img/1.jpg", "url": "https://x/1",
            "pulls": 1200, "community": 4
        });
        let s: ReleaseSummary = serde_json::from_value(v).unwrap();
        assert_eq!(s.id, 42);
        assert_eq!(s.title_path, "batman-150");
        let req = DetailsRequest::from(&s);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"comicId": 42, "title": "batman-150"})
        );
    }

    #[test]
    fn test_details_tolerates_missing_fields() {
        let d: ReleaseDetails = serde_json::from_value(serde_json::json!({"id": 7})).unwrap();
        assert!(d.title.is_none());
        assert!(d.creators.is_empty());
    }
}
