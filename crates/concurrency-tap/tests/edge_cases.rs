//! End-to-end behavior of the capture pipeline through the session API.

use serde_json::{json, Value};

use concurrency_tap::{
    CaptureSession, PointStore, RawResponse, ResourceKind, ResponseHead, ResponseOutcome,
    SessionPhase, TapConfig,
};

// ─────────────────────── helpers ───────────────────────

const AT: &str = "2024-06-01T12:00:00.000000";

fn response(url: &str, body: &str) -> RawResponse {
    RawResponse::new(
        ResponseHead {
            url: url.to_string(),
            content_type: Some("application/json; charset=utf-8".to_string()),
            resource_kind: ResourceKind::Xhr,
            status: 200,
        },
        body,
    )
}

fn capturing_session(store: PointStore) -> CaptureSession {
    let mut session = CaptureSession::open(store, &TapConfig::default());
    session.advance(SessionPhase::Navigating).unwrap();
    session.advance(SessionPhase::Capturing).unwrap();
    session
}

fn memory_session() -> CaptureSession {
    capturing_session(PointStore::open_in_memory().unwrap())
}

fn replay(responses: &[RawResponse]) -> Vec<(String, i64, String)> {
    let mut session = memory_session();
    for r in responses {
        session.handle_response_at(r, AT);
    }
    dump(&session)
}

fn dump(session: &CaptureSession) -> Vec<(String, i64, String)> {
    session
        .store()
        .list_all()
        .unwrap()
        .into_iter()
        .map(|p| (p.timestamp, p.value, p.captured_at))
        .collect()
}

fn pair_series(n: i64) -> Value {
    Value::Array((1..=n).map(|i| json!([i, 4000 + i * 1000])).collect())
}

fn permutations(n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for rest in permutations(n - 1) {
        for pos in 0..=rest.len() {
            let mut p = rest.clone();
            p.insert(pos, n - 1);
            out.push(p);
        }
    }
    out
}

fn sample_responses() -> Vec<RawResponse> {
    vec![
        response("https://dash/api/chart", &json!({"meta": {}, "chartData": pair_series(12)}).to_string()),
        response("https://dash/api/points", &json!({"data": pair_series(3)}).to_string()),
        response(
            "https://dash/api/latest",
            &json!({"AsOfHour": "2024-06-01T11:00", "PlatformConcurrent": 7_500_000}).to_string(),
        ),
        response("https://dash/api/broken", "not json"),
    ]
}

// ═══════════════════════════════════════════════════════
// PIPELINE PROPERTIES
// ═══════════════════════════════════════════════════════

#[test]
fn test_replay_is_idempotent() {
    let responses = sample_responses();
    let once = replay(&responses);

    let mut doubled = responses.clone();
    doubled.extend(responses);
    assert_eq!(replay(&doubled), once);
    assert_eq!(once.len(), 13);
}

#[test]
fn test_arrival_order_does_not_matter() {
    let responses = sample_responses();
    let expected = replay(&responses);

    for order in permutations(responses.len()) {
        let shuffled: Vec<RawResponse> = order.iter().map(|&i| responses[i].clone()).collect();
        assert_eq!(replay(&shuffled), expected, "order {order:?}");
    }
}

#[test]
fn test_threshold_boundary() {
    let mut session = memory_session();
    session.handle_response_at(&response("u1", r#"{"x": "low", "y": 1000}"#), AT);
    session.handle_response_at(&response("u2", r#"{"x": "high", "y": 1001}"#), AT);

    let stored = dump(&session);
    assert_eq!(stored, vec![("high".to_string(), 1001, AT.to_string())]);
    assert_eq!(session.stats().rejected_below_threshold, 1);
}

#[test]
fn test_deep_list_under_unrecognized_key() {
    let mut session = memory_session();
    let body = json!({"meta": {}, "chartData": pair_series(12)}).to_string();
    let outcome = session.handle_response_at(&response("https://dash/x", &body), AT);

    assert_eq!(
        outcome,
        ResponseOutcome::Processed {
            candidates: 12,
            inserted: 12,
            duplicates: 0,
            rejected: 0
        }
    );
}

#[test]
fn test_both_strategies_dedup_in_store() {
    let mut session = memory_session();
    let body = json!({"points": pair_series(12)}).to_string();
    let outcome = session.handle_response_at(&response("https://dash/x", &body), AT);

    assert!(matches!(outcome, ResponseOutcome::Processed { candidates: 24, inserted: 12, duplicates: 12, .. }));
    assert_eq!(session.store().count().unwrap(), 12);
}

#[test]
fn test_falsy_alias_falls_through() {
    let mut session = memory_session();
    let body = r#"{"x": 0, "time": "2024-01-01T00:00Z", "y": 8000}"#;
    session.handle_response_at(&response("https://dash/x", body), AT);

    let point = session.store().get("2024-01-01T00:00Z").unwrap().unwrap();
    assert_eq!(point.value, 8000);
    assert_eq!(session.store().count().unwrap(), 1);
}

#[test]
fn test_export_order_is_lexicographic() {
    let mut session = memory_session();
    for ts in ["b", "a", "10", "2"] {
        let body = json!({"x": ts, "y": 5000}).to_string();
        session.handle_response_at(&response(&format!("https://dash/{ts}"), &body), AT);
    }
    session.advance(SessionPhase::Draining).unwrap();
    session.advance(SessionPhase::Exporting).unwrap();

    let mut out = Vec::new();
    assert_eq!(session.export_to(&mut out).unwrap(), 4);
    let text = String::from_utf8(out).unwrap();
    let keys: Vec<&str> = text
        .lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap())
        .collect();
    assert_eq!(keys, ["10", "2", "a", "b"]);
    assert!(text.starts_with("timestamp,user_count,fetched_at\r\n"));
}

#[test]
fn test_malformed_body_does_not_stop_session() {
    let mut session = memory_session();
    let outcome = session.handle_response_at(&response("https://dash/bad", "not json"), AT);
    assert!(matches!(outcome, ResponseOutcome::Undecodable(_)));
    assert_eq!(session.phase(), SessionPhase::Capturing);

    session.handle_response_at(&response("https://dash/ok", r#"{"x": "t", "y": 3000}"#), AT);
    assert_eq!(session.store().count().unwrap(), 1);
}

#[test]
fn test_first_write_wins_across_responses() {
    let mut session = memory_session();
    session.handle_response_at(&response("https://dash/1", r#"{"x": "T1", "y": 5000}"#), "first");
    session.handle_response_at(&response("https://dash/2", r#"{"x": "T1", "y": 9000}"#), "second");

    let point = session.store().get("T1").unwrap().unwrap();
    assert_eq!(point.value, 5000);
    assert_eq!(point.captured_at, "first");
}

// ═══════════════════════════════════════════════════════
// DURABILITY
// ═══════════════════════════════════════════════════════

#[test]
fn test_store_grows_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("points.db");
    let csv = dir.path().join("snapshot.csv");

    let mut first = capturing_session(PointStore::open(&db).unwrap());
    first.handle_response_at(&response("https://dash/a", r#"{"x": "T1", "y": 5000}"#), "run-1");
    drop(first);

    let mut second = capturing_session(PointStore::open(&db).unwrap());
    second.handle_response_at(&response("https://dash/a", r#"{"x": "T1", "y": 6000}"#), "run-2");
    second.handle_response_at(&response("https://dash/b", r#"{"x": "T2", "y": 6000}"#), "run-2");
    second.advance(SessionPhase::Exporting).unwrap();
    assert_eq!(second.export_to_path(&csv).unwrap(), 2);

    let text = std::fs::read_to_string(&csv).unwrap();
    assert_eq!(
        text,
        "timestamp,user_count,fetched_at\r\nT1,5000,run-1\r\nT2,6000,run-2\r\n"
    );
}

#[test]
fn test_unwritable_store_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    assert!(PointStore::open(dir.path()).is_err());
}
