//! Drives one capture session from store initialization to snapshot export.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;

use concurrency_tap::{CaptureSession, PointStore, SessionPhase, SessionStats, TapConfig};

use crate::capture::{CaptureBackend, CaptureEvent, CapturePlan};
use crate::config::CaptureSettings;

const EVENT_BUFFER: usize = 256;

/// Result of a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub stats: SessionStats,
    pub distinct_urls: usize,
    pub stored_points: usize,
    pub snapshot_rows: usize,
    pub snapshot_path: PathBuf,
    /// Transport failure reported by the backend, if any.
    pub transport_error: Option<String>,
}

/// Run a full session: open the store, capture, drain, export.
///
/// Only store initialization and snapshot writing can fail this call.
/// Browser and navigation failures are logged and recorded in the summary.
pub async fn run_session<B>(
    mut backend: B,
    settings: &CaptureSettings,
    config: &TapConfig,
) -> Result<SessionSummary>
where
    B: CaptureBackend + 'static,
{
    let store = PointStore::open(&settings.db_path)
        .with_context(|| format!("failed to open store: {}", settings.db_path.display()))?;
    let mut session = CaptureSession::open(store, config);
    tracing::info!(
        "store {} holds {} point(s)",
        settings.db_path.display(),
        session.store().count()?
    );

    let plan = CapturePlan {
        url: settings.url.clone(),
        navigation_timeout: settings.navigation_timeout(),
        settle_window: settings.settle_window(),
    };
    let prefilter = session.filter().clone();
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);

    session.advance(SessionPhase::Navigating)?;
    let capture = tokio::spawn(async move { backend.capture(plan, prefilter, tx).await });

    let mut transport_error = None;
    while let Some(event) = rx.recv().await {
        match event {
            CaptureEvent::Navigated(result) => {
                if let Err(e) = result {
                    transport_error = Some(e);
                }
                if session.phase() == SessionPhase::Navigating {
                    session.advance(SessionPhase::Capturing)?;
                }
            }
            CaptureEvent::Response(response) => {
                session.handle_response(&response);
            }
            CaptureEvent::WindowClosed => break,
        }
    }

    session.advance(SessionPhase::Draining)?;
    let drained = tokio::time::timeout(settings.drain_timeout(), async {
        let mut flushed = 0usize;
        while let Some(event) = rx.recv().await {
            if let CaptureEvent::Response(response) = event {
                session.handle_response(&response);
                flushed += 1;
            }
        }
        flushed
    })
    .await;
    match drained {
        Ok(flushed) => tracing::debug!("drained {flushed} late response(s)"),
        Err(_) => {
            tracing::warn!(
                "drain timed out after {}ms, dropping responses still in flight",
                settings.drain_timeout_ms
            );
            capture.abort();
        }
    }

    match capture.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!("capture failed: {e:#}");
            transport_error.get_or_insert_with(|| format!("{e:#}"));
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => {
            tracing::warn!("capture task panicked: {e}");
            transport_error.get_or_insert_with(|| e.to_string());
        }
    }

    session.advance(SessionPhase::Exporting)?;
    let snapshot_rows = session
        .export_to_path(&settings.snapshot_path)
        .with_context(|| format!("failed to write snapshot: {}", settings.snapshot_path.display()))?;

    Ok(SessionSummary {
        stats: session.stats().clone(),
        distinct_urls: session.distinct_urls(),
        stored_points: session.store().count()?,
        snapshot_rows,
        snapshot_path: settings.snapshot_path.clone(),
        transport_error,
    })
}

/// Export the existing store without capturing.
pub fn export_only(settings: &CaptureSettings, config: &TapConfig) -> Result<usize> {
    let store = PointStore::open(&settings.db_path)
        .with_context(|| format!("failed to open store: {}", settings.db_path.display()))?;
    let mut session = CaptureSession::open(store, config);
    session.advance(SessionPhase::Exporting)?;
    let rows = session
        .export_to_path(&settings.snapshot_path)
        .with_context(|| format!("failed to write snapshot: {}", settings.snapshot_path.display()))?;
    Ok(rows)
}
