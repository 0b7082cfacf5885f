//! Capture backends: load a page and forward the network responses it produces.
//!
//! A backend owns the browser. It pushes [`CaptureEvent`]s into a channel and
//! the session side consumes them with a single writer.

pub mod chromium;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use concurrency_tap::{RawResponse, ResponseFilter};

/// What to load and how long to listen.
#[derive(Debug, Clone)]
pub struct CapturePlan {
    pub url: String,
    pub navigation_timeout: Duration,
    /// Listening time after navigation settles.
    pub settle_window: Duration,
}

/// Messages from a backend to the session.
#[derive(Debug)]
pub enum CaptureEvent {
    /// Navigation finished. `Err` carries a transport failure; capture continues.
    Navigated(std::result::Result<(), String>),
    /// A response. Bodies are only fetched for responses the prefilter wants;
    /// the rest arrive with an empty body so they are still counted.
    Response(RawResponse),
    /// The capture window is over. Responses already in flight may still follow.
    WindowClosed,
}

/// A browser engine that can run one capture window.
#[async_trait]
pub trait CaptureBackend: Send {
    /// Navigate to `plan.url`, forward responses for the settle window, then stop.
    ///
    /// Returning `Err` is a transport failure: the session logs it and still
    /// exports whatever was committed.
    async fn capture(
        &mut self,
        plan: CapturePlan,
        prefilter: ResponseFilter,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<()>;
}
