//! concurrency-tap: capture a dashboard's network traffic in headless
//! Chromium and persist the concurrency series it carries.

pub mod capture;
pub mod config;
pub mod runner;

pub use capture::chromium::ChromiumCapture;
pub use capture::{CaptureBackend, CaptureEvent, CapturePlan};
pub use config::{CaptureSettings, Overrides};
pub use runner::{export_only, run_session, SessionSummary};
