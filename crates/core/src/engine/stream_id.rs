use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// External request key: `prefix:seriesId:episode`, e.g. `kitsu:8203:2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub prefix: String,
    pub series_id: String,
    pub episode: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamIdError {
    #[error("Expected prefix:series:episode, got '{0}'")]
    Malformed(String),

    #[error("Invalid episode number in '{0}'")]
    InvalidEpisode(String),
}

impl StreamId {
    pub fn parse(raw: &str) -> Result<Self, StreamIdError> {
        let parts: Vec<&str> = raw.split(':').collect();
        let [prefix, series_id, episode] = parts.as_slice() else {
            return Err(StreamIdError::Malformed(raw.to_string()));
        };
        if series_id.is_empty() {
            return Err(StreamIdError::Malformed(raw.to_string()));
        }
        let episode = episode
            .parse()
            .map_err(|_| StreamIdError::InvalidEpisode(raw.to_string()))?;

        Ok(Self {
            prefix: (*prefix).to_string(),
            series_id: (*series_id).to_string(),
            episode,
        })
    }
}

impl FromStr for StreamId {
    type Err = StreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.prefix, self.series_id, self.episode)
    }
}

/// First 16 hex characters of the credential's SHA-256.
pub fn credential_fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Stream cache key shared by requests and precache tasks.
///
/// The raw credential never appears in the key.
pub fn stream_key(series_id: &str, episode: u32, credential: &str) -> String {
    format!(
        "{}:{}:{}",
        series_id,
        episode,
        credential_fingerprint(credential)
    )
}
