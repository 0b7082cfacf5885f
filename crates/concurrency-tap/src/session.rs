//! Capture session lifecycle and per-response handling.
//!
//! A session owns the store handle and everything that must live for exactly
//! one run. Responses are handled one at a time by the owner of the session;
//! because the store only ever inserts absent keys, the final contents do not
//! depend on the order responses arrive in.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::config::TapConfig;
use crate::export;
use crate::extract::Extractor;
use crate::filter::ResponseFilter;
use crate::normalize::{capture_instant, Normalizer, Rejection};
use crate::parser::{self, DecodeError};
use crate::store::PointStore;
use crate::types::{RawResponse, TapError, TapResult};

/// Session phases, in the only order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Navigating,
    Capturing,
    Draining,
    Exporting,
    Closed,
}

impl SessionPhase {
    /// Phases in which captured responses are still processed.
    pub fn accepts_responses(self) -> bool {
        matches!(self, Self::Navigating | Self::Capturing | Self::Draining)
    }
}

/// Why a response was not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    PhaseClosed,
    Filtered,
    RepeatUrl,
}

/// What happened to a single response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Skipped(SkipReason),
    Undecodable(DecodeError),
    Processed {
        candidates: usize,
        inserted: usize,
        duplicates: usize,
        rejected: usize,
    },
}

/// Per-stage counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub responses_seen: u64,
    pub filtered_out: u64,
    pub repeat_urls: u64,
    pub undecodable: u64,
    pub candidates: u64,
    pub rejected_missing: u64,
    pub rejected_not_numeric: u64,
    pub rejected_below_threshold: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub store_failures: u64,
}

impl SessionStats {
    fn record_rejection(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Missing => self.rejected_missing += 1,
            Rejection::NotNumeric => self.rejected_not_numeric += 1,
            Rejection::BelowThreshold(_) => self.rejected_below_threshold += 1,
        }
    }
}

/// Owns the store and per-run state for one capture session.
pub struct CaptureSession {
    store: PointStore,
    filter: ResponseFilter,
    extractor: Extractor,
    normalizer: Normalizer,
    skip_seen_urls: bool,
    seen_urls: HashSet<String>,
    stats: SessionStats,
    phase: SessionPhase,
}

impl CaptureSession {
    /// Start a session over an already opened store.
    pub fn open(store: PointStore, config: &TapConfig) -> Self {
        Self {
            store,
            filter: ResponseFilter::from_config(config),
            extractor: Extractor::from_config(config),
            normalizer: Normalizer::from_config(config),
            skip_seen_urls: config.skip_seen_urls,
            seen_urls: HashSet::new(),
            stats: SessionStats::default(),
            phase: SessionPhase::Idle,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn store(&self) -> &PointStore {
        &self.store
    }

    pub fn filter(&self) -> &ResponseFilter {
        &self.filter
    }

    /// Number of distinct URLs that passed the filter.
    pub fn distinct_urls(&self) -> usize {
        self.seen_urls.len()
    }

    /// Move forward to `next`. Backward or repeated transitions are refused.
    pub fn advance(&mut self, next: SessionPhase) -> TapResult<()> {
        if next <= self.phase {
            return Err(TapError::Phase {
                from: self.phase,
                to: next,
            });
        }
        tracing::info!("session phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Handle one response, stamping stored points with the current time.
    pub fn handle_response(&mut self, response: &RawResponse) -> ResponseOutcome {
        let captured_at = capture_instant(Utc::now());
        self.handle_response_at(response, &captured_at)
    }

    /// Handle one response with an explicit capture instant.
    ///
    /// Failures are contained here: the outcome says what happened and the
    /// session stays usable.
    pub fn handle_response_at(&mut self, response: &RawResponse, captured_at: &str) -> ResponseOutcome {
        if !self.phase.accepts_responses() {
            return ResponseOutcome::Skipped(SkipReason::PhaseClosed);
        }
        self.stats.responses_seen += 1;

        if !self.filter.should_inspect(response) {
            self.stats.filtered_out += 1;
            return ResponseOutcome::Skipped(SkipReason::Filtered);
        }

        let url = &response.head.url;
        let first_visit = self.seen_urls.insert(url.clone());
        if self.skip_seen_urls && !first_visit {
            self.stats.repeat_urls += 1;
            return ResponseOutcome::Skipped(SkipReason::RepeatUrl);
        }

        tracing::debug!(
            "inspecting {} [status {}, {}]",
            url,
            response.head.status,
            response.head.content_type.as_deref().unwrap_or("no content-type")
        );

        let payload = match parser::parse(&response.body, response.head.content_type.as_deref()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!("skipping {url}: {e}");
                self.stats.undecodable += 1;
                return ResponseOutcome::Undecodable(e);
            }
        };

        let candidates = self.extractor.extract(&payload);
        let (mut inserted, mut duplicates, mut rejected) = (0, 0, 0);

        for candidate in &candidates {
            let point = match self.normalizer.normalize(candidate, captured_at) {
                Ok(point) => point,
                Err(rejection) => {
                    self.stats.record_rejection(rejection);
                    rejected += 1;
                    continue;
                }
            };
            match self.store.upsert_if_absent(&point) {
                Ok(true) => inserted += 1,
                Ok(false) => duplicates += 1,
                Err(e) => {
                    self.stats.store_failures += 1;
                    tracing::warn!("failed to store point {}: {e}", point.timestamp);
                }
            }
        }

        self.stats.candidates += candidates.len() as u64;
        self.stats.inserted += inserted as u64;
        self.stats.duplicates += duplicates as u64;

        if inserted > 0 {
            tracing::info!("stored {inserted} new point(s) from {url}");
        } else {
            tracing::debug!(
                "{url}: {} candidate(s), {duplicates} duplicate(s), {rejected} rejected",
                candidates.len()
            );
        }

        ResponseOutcome::Processed {
            candidates: candidates.len(),
            inserted,
            duplicates,
            rejected,
        }
    }

    /// Export the whole store once, then close the session.
    pub fn export_to<W: Write>(&mut self, writer: W) -> TapResult<usize> {
        self.ensure_exporting()?;
        let rows = export::export(&self.store, writer)?;
        self.advance(SessionPhase::Closed)?;
        Ok(rows)
    }

    /// Export the whole store to a file once, then close the session.
    pub fn export_to_path(&mut self, path: &Path) -> TapResult<usize> {
        self.ensure_exporting()?;
        let rows = export::export_to_path(&self.store, path)?;
        tracing::info!("wrote {rows} row(s) to {}", path.display());
        self.advance(SessionPhase::Closed)?;
        Ok(rows)
    }

    fn ensure_exporting(&self) -> TapResult<()> {
        match self.phase {
            SessionPhase::Exporting => Ok(()),
            SessionPhase::Closed => Err(TapError::AlreadyExported),
            from => Err(TapError::Phase {
                from,
                to: SessionPhase::Closed,
            }),
        }
    }

    /// Tear down the session and hand back the store.
    pub fn into_store(self) -> PointStore {
        self.store
    }
}
