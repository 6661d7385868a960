//! Matching download filenames against a requested episode.
//!
//! The listing is scanned in fixed-size batches. Records within a batch are
//! evaluated concurrently; batches run strictly in order, and scanning stops
//! once the early-exit threshold is reached. Results therefore depend on the
//! listing order: the first matches found win, not necessarily every match.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MatcherConfig;
use crate::identity::IdentityResolver;
use crate::listing::DownloadRecord;
use crate::metrics::MetricsRecorder;
use crate::parser::FilenameExtractor;

/// One playable stream for an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCandidate {
    pub title: String,
    pub url: String,
}

pub struct StreamMatcher {
    extractor: Arc<dyn FilenameExtractor>,
    identity: Arc<IdentityResolver>,
    metrics: Arc<MetricsRecorder>,
    batch_size: usize,
    early_exit_threshold: usize,
}

impl StreamMatcher {
    pub fn new(
        extractor: Arc<dyn FilenameExtractor>,
        identity: Arc<IdentityResolver>,
        metrics: Arc<MetricsRecorder>,
        config: &MatcherConfig,
    ) -> Self {
        Self {
            extractor,
            identity,
            metrics,
            batch_size: config.batch_size.max(1),
            early_exit_threshold: config.early_exit_threshold.max(1),
        }
    }

    pub fn early_exit_threshold(&self) -> usize {
        self.early_exit_threshold
    }

    /// Candidates for `episode` of `series_id`, at most the early-exit threshold.
    pub async fn match_listing(
        &self,
        listing: &[DownloadRecord],
        series_id: &str,
        episode: u32,
    ) -> Vec<StreamCandidate> {
        let timer = self.metrics.start_timer();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut candidates = Vec::new();
        let mut processed = 0u64;
        let mut duplicates = 0u64;

        for batch in listing.chunks(self.batch_size) {
            let batch_timer = self.metrics.start_timer();

            let fresh: Vec<&DownloadRecord> = batch
                .iter()
                .filter(|record| {
                    let first = seen.insert(record.filename.as_str());
                    if !first {
                        duplicates += 1;
                    }
                    first
                })
                .collect();
            processed += fresh.len() as u64;

            let evaluations = fresh
                .iter()
                .map(|record| self.evaluate(record, series_id, episode));
            let matches: Vec<StreamCandidate> =
                join_all(evaluations).await.into_iter().flatten().collect();

            self.metrics.record(
                "batch",
                batch_timer.elapsed_ms(),
                &[
                    ("batchSize", fresh.len() as u64),
                    ("batchMatches", matches.len() as u64),
                ],
            );

            candidates.extend(matches);
            if candidates.len() >= self.early_exit_threshold {
                debug!(
                    series_id,
                    episode,
                    found = candidates.len(),
                    "Early exit after reaching match threshold"
                );
                break;
            }
        }

        candidates.truncate(self.early_exit_threshold);

        self.metrics.record(
            "matching",
            timer.elapsed_ms(),
            &[
                ("filesProcessed", processed),
                ("filesMatched", candidates.len() as u64),
                ("duplicates", duplicates),
            ],
        );
        candidates
    }

    /// Match one record. Any failure means "no match for this record".
    async fn evaluate(
        &self,
        record: &DownloadRecord,
        series_id: &str,
        episode: u32,
    ) -> Option<StreamCandidate> {
        let timer = self.metrics.start_timer();
        let parsed = match self.extractor.parse(&record.filename).await {
            Ok(Some(parsed)) => {
                self.metrics.record("parse", timer.elapsed_ms(), &[("parsed", 1)]);
                parsed
            }
            Ok(None) => {
                self.metrics
                    .record("parse", timer.elapsed_ms(), &[("unparsable", 1)]);
                return None;
            }
            Err(e) => {
                debug!(filename = %record.filename, error = %e, "Filename parse failed");
                self.metrics.record("parse", timer.elapsed_ms(), &[("errors", 1)]);
                return None;
            }
        };

        if parsed.episode != episode {
            return None;
        }

        let resolved = self.identity.resolve(&parsed.title, parsed.season).await?;
        if resolved != series_id {
            return None;
        }

        Some(StreamCandidate {
            title: parsed.display_title(),
            url: record.url.clone(),
        })
    }
}
