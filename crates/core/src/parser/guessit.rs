//! OpenSubtitles guessit client.
//!
//! Requires an OpenSubtitles API key. Calls are rate limited locally.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::rate_limiter::RateLimiter;
use super::{ExtractError, FilenameExtractor, ParsedFilename};
use crate::config::GuessitConfig;
use crate::metrics::observe_external;

const USER_AGENT: &str = "CarboneStremio/1.0";

/// Remote filename parser.
pub struct GuessitClient {
    client: Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
}

impl GuessitClient {
    pub fn new(config: &GuessitConfig) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            limiter: RateLimiter::new(config.requests_per_second),
        })
    }

    async fn guess(&self, filename: &str) -> Result<Option<ParsedFilename>, ExtractError> {
        self.limiter.acquire().await;

        let url = format!("{}/utilities/guessit", self.base_url);
        debug!("Guessit lookup: filename='{}'", filename);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("Api-Key", &self.api_key)
            .query(&[("filename", filename)])
            .send()
            .await?;

        let status = response.status();
        if status == 429 {
            return Err(ExtractError::RateLimited {
                retry_after_ms: 1000,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let guess: GuessitResponse = response.json().await.map_err(|e| {
            ExtractError::ParseError(format!("Failed to parse guessit response: {}", e))
        })?;

        Ok(guess.into_parsed(filename))
    }
}

#[async_trait]
impl FilenameExtractor for GuessitClient {
    async fn parse(&self, filename: &str) -> Result<Option<ParsedFilename>, ExtractError> {
        let started = Instant::now();
        let result = self.guess(filename).await;
        observe_external(
            "opensubtitles",
            "guessit",
            started.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        result
    }
}

// Guessit API response types

#[derive(Debug, Deserialize)]
struct GuessitResponse {
    title: Option<String>,
    season: Option<SeasonField>,
    episode: Option<EpisodeField>,
    subtitle_language: Option<LanguageField>,
}

/// Guessit reports multi-episode files as a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EpisodeField {
    Single(u32),
    Many(Vec<u32>),
}

impl EpisodeField {
    fn lowest(self) -> Option<u32> {
        match self {
            EpisodeField::Single(n) => Some(n),
            EpisodeField::Many(list) => list.into_iter().min(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeasonField {
    Single(u32),
    Many(Vec<u32>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LanguageField {
    Single(String),
    Many(Vec<String>),
}

impl GuessitResponse {
    fn into_parsed(self, filename: &str) -> Option<ParsedFilename> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let episode = self.episode.and_then(EpisodeField::lowest)?;
        let season = match self.season {
            Some(SeasonField::Single(n)) => n,
            Some(SeasonField::Many(list)) => list.into_iter().min().unwrap_or(1),
            None => 1,
        };
        let subtitle_language = match self.subtitle_language {
            Some(LanguageField::Single(lang)) => lang,
            Some(LanguageField::Many(langs)) => langs.join(", "),
            None => String::new(),
        };

        Some(ParsedFilename {
            title,
            season,
            episode,
            subtitle_language,
            filename: Some(filename.to_string()),
        })
    }
}
