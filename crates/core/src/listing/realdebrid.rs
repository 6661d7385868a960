//! Real-Debrid downloads API client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{DownloadRecord, ListingError, ListingSource};
use crate::config::RealDebridConfig;
use crate::metrics::observe_external;

/// Real-Debrid client. The account credential is passed per call.
pub struct RealDebridClient {
    client: Client,
    base_url: String,
    limit: u32,
}

impl RealDebridClient {
    pub fn new(config: &RealDebridConfig) -> Result<Self, ListingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limit: config.listing_limit,
        })
    }

    async fn fetch(&self, credential: &str) -> Result<Vec<DownloadRecord>, ListingError> {
        let url = format!("{}/downloads", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("limit", self.limit.to_string())])
            .bearer_auth(credential)
            .send()
            .await?;

        let status = response.status();
        if status == 401 || status == 403 {
            return Err(ListingError::Unauthorized);
        }
        if status == 429 {
            return Err(ListingError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ListingError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let entries: Vec<RdDownload> = response.json().await.map_err(|e| {
            ListingError::ParseError(format!("Failed to parse downloads response: {}", e))
        })?;

        Ok(entries.into_iter().filter_map(RdDownload::into_record).collect())
    }
}

#[async_trait]
impl ListingSource for RealDebridClient {
    fn name(&self) -> &str {
        "realdebrid"
    }

    async fn list_downloads(&self, credential: &str) -> Result<Vec<DownloadRecord>, ListingError> {
        let started = Instant::now();
        let result = self.fetch(credential).await;
        observe_external(
            "realdebrid",
            "downloads",
            started.elapsed().as_secs_f64(),
            result.is_ok(),
        );

        if let Ok(records) = &result {
            debug!(count = records.len(), "Fetched Real-Debrid downloads");
        }
        result
    }
}

// Real-Debrid API response types

#[derive(Debug, Deserialize)]
struct RdDownload {
    filename: Option<String>,
    download: Option<String>,
    generated: Option<String>,
}

impl RdDownload {
    /// Entries missing a filename or link are not playable.
    fn into_record(self) -> Option<DownloadRecord> {
        match (self.filename, self.download) {
            (Some(filename), Some(url)) if !filename.is_empty() && !url.is_empty() => {
                Some(DownloadRecord {
                    filename,
                    url,
                    added_at: self
                        .generated
                        .as_deref()
                        .and_then(|g| DateTime::parse_from_rfc3339(g).ok())
                        .map(|g| g.with_timezone(&Utc)),
                })
            }
            _ => None,
        }
    }
}
