//! Kitsu anime catalog client.
//!
//! Kitsu serves JSON:API documents and needs no API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{TitleHit, TitleSearch, TitleSearchError};
use crate::config::KitsuConfig;
use crate::metrics::observe_external;

const JSON_API: &str = "application/vnd.api+json";

/// Kitsu API client.
pub struct KitsuClient {
    client: Client,
    base_url: String,
}

impl KitsuClient {
    pub fn new(config: &KitsuConfig) -> Result<Self, TitleSearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn search_anime(&self, query: &str, limit: u32) -> Result<Vec<TitleHit>, TitleSearchError> {
        let url = format!("{}/anime", self.base_url);

        debug!("Kitsu search: query='{}'", query);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, JSON_API)
            .query(&[("filter[text]", query.to_string()), ("page[limit]", limit.to_string())])
            .send()
            .await?;

        let status = response.status();
        if status == 429 {
            return Err(TitleSearchError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TitleSearchError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let document: KitsuDocument = response.json().await.map_err(|e| {
            TitleSearchError::ParseError(format!("Failed to parse anime search response: {}", e))
        })?;

        Ok(document.data.into_iter().map(TitleHit::from).collect())
    }
}

#[async_trait]
impl TitleSearch for KitsuClient {
    fn name(&self) -> &str {
        "kitsu"
    }

    async fn search_titles(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<TitleHit>, TitleSearchError> {
        let started = Instant::now();
        let result = self.search_anime(query, limit).await;
        observe_external("kitsu", "search", started.elapsed().as_secs_f64(), result.is_ok());
        result
    }
}

// Kitsu API response types

#[derive(Debug, Deserialize)]
struct KitsuDocument {
    #[serde(default)]
    data: Vec<KitsuAnime>,
}

#[derive(Debug, Deserialize)]
struct KitsuAnime {
    id: String,
    #[serde(default)]
    attributes: KitsuAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KitsuAttributes {
    canonical_title: Option<String>,
}

impl From<KitsuAnime> for TitleHit {
    fn from(anime: KitsuAnime) -> Self {
        TitleHit {
            id: anime.id,
            canonical_title: anime.attributes.canonical_title.unwrap_or_default(),
        }
    }
}
