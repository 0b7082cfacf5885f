//! concurrency-tap: heuristic extraction of concurrency time series from
//! captured dashboard traffic, with a durable first-write-wins store and a
//! flat-file snapshot.

pub mod config;
pub mod export;
pub mod extract;
pub mod filter;
pub mod normalize;
pub mod parser;
pub mod session;
pub mod store;
pub mod types;

pub use config::{AliasPolicy, FilterPolicy, TapConfig};
pub use export::{export, export_to_path, snapshot_rows};
pub use extract::Extractor;
pub use filter::ResponseFilter;
pub use normalize::{capture_instant, Normalizer, Rejection};
pub use parser::{parse, DecodeError};
pub use session::{CaptureSession, ResponseOutcome, SessionPhase, SessionStats, SkipReason};
pub use store::PointStore;
pub use types::*;
