//! Chromium capture backend using chromiumoxide network events.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFinished, EventResponseReceived, GetResponseBodyParams, RequestId, ResourceType,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};

use concurrency_tap::{RawResponse, ResourceKind, ResponseFilter, ResponseHead};

use super::{CaptureBackend, CaptureEvent, CapturePlan};

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Headless Chromium capture backend.
pub struct ChromiumCapture {
    chromium_path: Option<PathBuf>,
    user_agent: String,
}

impl ChromiumCapture {
    pub fn new(chromium_path: Option<PathBuf>, user_agent: impl Into<String>) -> Self {
        Self {
            chromium_path,
            user_agent: user_agent.into(),
        }
    }

    async fn launch(&self) -> Result<(Browser, tokio::task::JoinHandle<()>)> {
        let chrome_path = find_chromium(self.chromium_path.as_deref())
            .context("Chromium not found. Set CTAP_CHROMIUM_PATH or install Chrome.")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={}", self.user_agent))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("browser handler: {e}");
                }
            }
        });

        Ok((browser, handler_task))
    }
}

#[async_trait]
impl CaptureBackend for ChromiumCapture {
    async fn capture(
        &mut self,
        plan: CapturePlan,
        prefilter: ResponseFilter,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<()> {
        let (mut browser, handler_task) = self.launch().await?;

        let result = capture_page(&browser, &plan, prefilter, &events).await;
        let _ = events.send(CaptureEvent::WindowClosed).await;

        if let Err(e) = browser.close().await {
            tracing::warn!("failed to close browser: {e}");
        }
        let _ = browser.wait().await;
        handler_task.abort();

        result
    }
}

async fn capture_page(
    browser: &Browser,
    plan: &CapturePlan,
    prefilter: ResponseFilter,
    events: &mpsc::Sender<CaptureEvent>,
) -> Result<()> {
    let page = browser
        .new_page("about:blank")
        .await
        .context("failed to create new page")?;

    // Listeners go in before navigation so no early response is missed.
    let responses = page.event_listener::<EventResponseReceived>().await?;
    let finished = page.event_listener::<EventLoadingFinished>().await?;

    let (stop_tx, stop_rx) = oneshot::channel();
    let pump = tokio::spawn(pump_events(
        page.clone(),
        prefilter,
        events.clone(),
        responses,
        finished,
        stop_rx,
    ));

    tracing::info!("navigating to {}", plan.url);
    let navigation = tokio::time::timeout(plan.navigation_timeout, async {
        page.goto(plan.url.as_str()).await?;
        page.wait_for_navigation().await?;
        anyhow::Ok(())
    })
    .await;

    let outcome = match navigation {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("navigation failed: {e:#}")),
        Err(_) => Err(format!(
            "navigation timed out after {}ms",
            plan.navigation_timeout.as_millis()
        )),
    };
    if let Err(e) = &outcome {
        tracing::warn!("{e}");
    }
    let _ = events.send(CaptureEvent::Navigated(outcome)).await;

    tracing::info!("page loaded, listening for {}ms", plan.settle_window.as_millis());
    tokio::time::sleep(plan.settle_window).await;

    let _ = stop_tx.send(());
    let _ = pump.await;
    let _ = page.close().await;
    Ok(())
}

/// Pair response heads with their loading-finished events and fetch bodies.
async fn pump_events(
    page: Page,
    prefilter: ResponseFilter,
    events: mpsc::Sender<CaptureEvent>,
    mut responses: chromiumoxide::listeners::EventStream<EventResponseReceived>,
    mut finished: chromiumoxide::listeners::EventStream<EventLoadingFinished>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut pending: HashMap<RequestId, ResponseHead> = HashMap::new();

    loop {
        tokio::select! {
            _ = &mut stop => break,
            Some(event) = responses.next() => {
                let head = response_head(&event);
                if prefilter.wants_body(&head) {
                    pending.insert(event.request_id.clone(), head);
                } else {
                    let _ = events.send(CaptureEvent::Response(RawResponse::new(head, String::new()))).await;
                }
            }
            Some(event) = finished.next() => {
                let Some(head) = pending.remove(&event.request_id) else {
                    continue;
                };
                let page = page.clone();
                let events = events.clone();
                let request_id = event.request_id.clone();
                tokio::spawn(async move {
                    match fetch_body(&page, request_id).await {
                        Ok(body) => {
                            let _ = events.send(CaptureEvent::Response(RawResponse::new(head, body))).await;
                        }
                        Err(e) => tracing::debug!("body unavailable for {}: {e:#}", head.url),
                    }
                });
            }
            else => break,
        }
    }
}

async fn fetch_body(page: &Page, request_id: RequestId) -> Result<String> {
    let reply = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .context("getResponseBody failed")?;

    if reply.result.base64_encoded {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&reply.result.body)
            .context("invalid base64 body")?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        Ok(reply.result.body.clone())
    }
}

fn response_head(event: &EventResponseReceived) -> ResponseHead {
    let response = &event.response;
    let content_type = response
        .headers
        .inner()
        .as_object()
        .and_then(|headers| {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
                .and_then(|(_, value)| value.as_str())
                .map(String::from)
        })
        .or_else(|| Some(response.mime_type.clone()).filter(|m| !m.is_empty()));

    ResponseHead {
        url: response.url.clone(),
        content_type,
        resource_kind: resource_kind(&event.r#type),
        status: u16::try_from(response.status).unwrap_or(0),
    }
}

fn resource_kind(kind: &ResourceType) -> ResourceKind {
    match kind {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::Xhr => ResourceKind::Xhr,
        ResourceType::Fetch => ResourceKind::Fetch,
        _ => ResourceKind::Other,
    }
}
