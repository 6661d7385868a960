//! Testing utilities and mock implementations of the collaborator traits.
//!
//! The mocks let the resolution engine run end to end without the listing
//! service, the title catalog or the remote filename parser.
//!
//! # Example
//!
//! ```rust,ignore
//! use carbone_core::testing::{fixtures, MockExtractor, MockListingSource, MockTitleSearch};
//!
//! let listing = MockListingSource::new();
//! let extractor = MockExtractor::heuristic();
//! let search = MockTitleSearch::new();
//!
//! listing.set_records(fixtures::listing(&[("Show.S01E02.mkv", "https://dl/1")])).await;
//!
//! // Build a ResolutionEngine from the mocks...
//! ```

mod mock_extractor;
mod mock_listing;
mod mock_title_search;

pub use mock_extractor::MockExtractor;
pub use mock_listing::MockListingSource;
pub use mock_title_search::MockTitleSearch;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};

    use crate::listing::DownloadRecord;
    use crate::matcher::StreamCandidate;
    use crate::parser::ParsedFilename;

    /// A download record without a timestamp.
    pub fn record(filename: &str, url: &str) -> DownloadRecord {
        DownloadRecord::new(filename, url)
    }

    /// A download record added `days_ago` days before 2024-06-01.
    pub fn dated_record(filename: &str, url: &str, days_ago: i64) -> DownloadRecord {
        DownloadRecord::new(filename, url).added_at(reference_date() - chrono::Duration::days(days_ago))
    }

    /// Records for `(filename, url)` pairs, in order.
    pub fn listing(entries: &[(&str, &str)]) -> Vec<DownloadRecord> {
        entries
            .iter()
            .map(|(filename, url)| record(filename, url))
            .collect()
    }

    /// The candidate the matcher builds for a heuristic parse of `filename`
    /// with no subtitle language.
    pub fn candidate(filename: &str, url: &str) -> StreamCandidate {
        StreamCandidate {
            title: format!("{}\n  ", filename),
            url: url.to_string(),
        }
    }

    /// A parse result with no filename or subtitle language.
    pub fn parsed(title: &str, season: u32, episode: u32) -> ParsedFilename {
        ParsedFilename {
            title: title.to_string(),
            season,
            episode,
            subtitle_language: String::new(),
            filename: None,
        }
    }

    fn reference_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .unwrap_or_default()
    }
}
