//! Local regex heuristics for common release naming schemes.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};

use super::{ExtractError, FilenameExtractor, ParsedFilename};

static EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(mkv|mp4|avi|m4v|webm|mov|ts|wmv|flv)$").unwrap());
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[._]+").unwrap());
static BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// Episode markers, tried in order.
static SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bS(\d{1,2})\s?E(\d{1,4})(?:\s?-\s?E?(\d{1,4}))?\b").unwrap()
});
static CROSS_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})x(\d{1,4})\b").unwrap());
static EPISODE_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:episode|episodio|capitulo|ep|e)\s?(\d{1,4})\b").unwrap()
});
static DASH_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s-\s(\d{1,4})(?:v\d)?\b").unwrap());

static SEASON_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s(?:season\s?(\d{1,2})|s(\d{1,2})|(\d{1,2})(?:st|nd|rd|th)\sseason)$")
        .unwrap()
});

static SUBTITLE_LANGUAGES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bVOSTFR\b|\bSUBFRENCH\b|\[FRE\]|\[FRA\]", "fr"),
        (r"(?i)\bVOSE\b|\bSUB\s?ESP\b|\bESP\s?SUB\b|\[SPA\]|\[ESP\]", "es"),
        (r"(?i)\bENG(?:LISH)?\s?SUBS?\b|\[ENG\]", "en"),
        (r"(?i)\bSUB\s?ITA\b|\[ITA\]", "it"),
        (r"(?i)\bLEGENDADO\b|\bPT-?BR\b|\[POR\]", "pt"),
        (r"(?i)\bMULTI\s?-?\s?SUBS?\b", "multi"),
    ]
    .into_iter()
    .map(|(pattern, lang)| (Regex::new(pattern).unwrap(), lang))
    .collect()
});

/// Regex-based extractor. Never performs I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse `filename`, or `None` when no title and episode can be found.
    pub fn extract(&self, filename: &str) -> Option<ParsedFilename> {
        let stem = EXTENSION.replace(filename, "");
        let spaced = SEPARATORS.replace_all(&stem, " ");
        let subtitle_language = detect_language(&spaced);

        let stripped = BRACKETS.replace_all(&spaced, " ");
        let cleaned = WHITESPACE.replace_all(stripped.trim(), " ").into_owned();

        let (start, season, episode) = find_episode(&cleaned)?;

        let mut title = clean_title(&cleaned[..start]);
        let season = match season {
            Some(season) => season,
            None => match split_season_suffix(&title) {
                Some((rest, season)) => {
                    title = rest;
                    season
                }
                None => 1,
            },
        };

        if title.is_empty() {
            return None;
        }

        Some(ParsedFilename {
            title,
            season,
            episode,
            subtitle_language,
            filename: Some(filename.to_string()),
        })
    }
}

#[async_trait]
impl FilenameExtractor for HeuristicExtractor {
    async fn parse(&self, filename: &str) -> Result<Option<ParsedFilename>, ExtractError> {
        Ok(self.extract(filename))
    }
}

/// Offset where the episode marker starts, plus season (if the marker has
/// one) and the lowest episode number.
fn find_episode(text: &str) -> Option<(usize, Option<u32>, u32)> {
    if let Some(caps) = SEASON_EPISODE.captures(text) {
        let first = number(&caps, 2)?;
        let episode = number(&caps, 3).map_or(first, |last| first.min(last));
        return Some((start_of(&caps), number(&caps, 1), episode));
    }
    if let Some(caps) = CROSS_EPISODE.captures(text) {
        return Some((start_of(&caps), number(&caps, 1), number(&caps, 2)?));
    }
    if let Some(caps) = EPISODE_WORD.captures(text) {
        return Some((start_of(&caps), None, number(&caps, 1)?));
    }
    if let Some(caps) = DASH_EPISODE.captures(text) {
        return Some((start_of(&caps), None, number(&caps, 1)?));
    }
    None
}

fn split_season_suffix(title: &str) -> Option<(String, u32)> {
    let caps = SEASON_SUFFIX.captures(title)?;
    let season = number(&caps, 1)
        .or_else(|| number(&caps, 2))
        .or_else(|| number(&caps, 3))?;
    Some((clean_title(&title[..start_of(&caps)]), season))
}

fn detect_language(text: &str) -> String {
    SUBTITLE_LANGUAGES
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, lang)| (*lang).to_string())
        .unwrap_or_default()
}

fn clean_title(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '-')
        .to_string()
}

fn number(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group).and_then(|m| m.as_str().parse().ok())
}

fn start_of(caps: &Captures<'_>) -> usize {
    caps.get(0).map_or(0, |m| m.start())
}
