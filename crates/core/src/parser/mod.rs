//! Filename metadata extraction.
//!
//! `CompositeExtractor` is what the engine uses: a memoized local heuristic
//! with a rate-limited OpenSubtitles guessit fallback bounded by a timeout.

mod composite;
mod guessit;
mod heuristic;
mod rate_limiter;

pub use composite::CompositeExtractor;
pub use guessit::GuessitClient;
pub use heuristic::HeuristicExtractor;
pub use rate_limiter::{RateLimiter, TokenBucket};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured guess for one filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFilename {
    pub title: String,
    pub season: u32,
    /// Multi-episode files report their lowest episode.
    pub episode: u32,
    /// Empty when no subtitle language was detected.
    pub subtitle_language: String,
    /// Normalized filename the record was parsed from.
    pub filename: Option<String>,
}

impl ParsedFilename {
    /// Display title for a stream built from this record.
    pub fn display_title(&self) -> String {
        match &self.filename {
            Some(filename) => format!("{}\n  {}", filename, self.subtitle_language),
            None => format!(
                "{} Ep{}\n  {}",
                self.title, self.episode, self.subtitle_language
            ),
        }
    }
}

/// Errors from filename extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Rate limited, retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Extraction timed out after {0}ms")]
    Timeout(u64),
}

/// Extracts series metadata from a download filename.
#[async_trait]
pub trait FilenameExtractor: Send + Sync {
    /// `Ok(None)` when the filename carries no usable title and episode.
    async fn parse(&self, filename: &str) -> Result<Option<ParsedFilename>, ExtractError>;
}

static CAPITULO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Capitulo_)\d+-\((\d+)\)").unwrap());

/// Rewrite `Capitulo_<n>-(<real>)` to `Capitulo_<real>`.
pub fn normalize_filename(filename: &str) -> String {
    CAPITULO.replace(filename, "${1}${2}").into_owned()
}
