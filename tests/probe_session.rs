//! Probe session behavior against a scripted transport on a paused clock.

mod harness;

use std::time::Duration;

use futures::StreamExt;
use harness::{FakeConnector, PeerAction, drain, names};
use proptest::prelude::*;
use serde_json::{Value, json};
use wsprobe::{
    Deadline, Error, Harness, Parsed, ProbeSpec, Schedule, SessionEvent, Target, Transcript,
};

fn target() -> Target {
    Target::new("ws://fake/ws?userId={subject}", "42")
}

fn schedule(entries: &[(i64, Value)]) -> Schedule {
    Schedule::new(
        entries
            .iter()
            .map(|(delay, payload)| ProbeSpec::new(*delay, payload.clone())),
    )
    .unwrap()
}

fn deadline(ms: u64) -> Deadline {
    Deadline::from_millis(ms).unwrap()
}

fn sent(events: &[SessionEvent]) -> Vec<Value> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Sent { payload } => Some(payload.clone()),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Canonical scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_silent_peer_hits_deadline() {
    let connector = FakeConnector::silent();
    let harness = Harness::new(connector.clone());

    let events = drain(harness.run(
        target(),
        schedule(&[(0, json!({"type": "hello"}))]),
        deadline(50),
    ))
    .await;

    assert_eq!(
        events,
        [
            SessionEvent::Opened,
            SessionEvent::Sent {
                payload: json!({"type": "hello"})
            },
            SessionEvent::DeadlineExceeded,
            SessionEvent::Closed {
                code: 1000,
                reason: "deadline exceeded".into()
            },
        ]
    );
    assert_eq!(connector.closes(), [(1000, "deadline exceeded".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_peer_close_cancels_deadline() {
    let connector = FakeConnector::scripted([
        (10, PeerAction::Text(r#"{"type":"ack"}"#.into())),
        (20, PeerAction::Close(1000, "done".into())),
    ]);
    let harness = Harness::new(connector);

    let events = drain(harness.run(target(), Schedule::empty(), deadline(100))).await;

    assert_eq!(names(&events), ["opened", "received", "closed"]);
    match &events[1] {
        SessionEvent::Received(frame) => {
            assert_eq!(frame.parsed, Parsed::Json(json!({"type": "ack"})));
            assert_eq!(frame.elapsed_ms, 10);
        }
        other => panic!("expected Received, got {other:?}"),
    }
    assert_eq!(
        events[2],
        SessionEvent::Closed {
            code: 1000,
            reason: "done".into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_delays_fire_in_delay_order() {
    let connector = FakeConnector::silent();
    let harness = Harness::new(connector.clone());

    let events = drain(harness.run(
        target(),
        schedule(&[(10, json!({"type": "A"})), (5, json!({"type": "B"}))]),
        deadline(100),
    ))
    .await;

    assert_eq!(sent(&events), [json!({"type": "B"}), json!({"type": "A"})]);
    assert_eq!(connector.sent_texts(), [r#"{"type":"B"}"#, r#"{"type":"A"}"#]);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_endpoint_yields_single_error() {
    let connector = FakeConnector::unreachable("connection refused");
    let harness = Harness::new(connector.clone());

    let events = drain(harness.run(
        target(),
        schedule(&[(0, json!({"type": "hello"}))]),
        deadline(1000),
    ))
    .await;

    assert_eq!(events.len(), 1);
    assert!(
        matches!(&events[0], SessionEvent::Error { message } if message.contains("refused"))
    );
    assert!(connector.sent_texts().is_empty());
}

// =============================================================================
// Deadline
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_deadline_while_connecting() {
    let connector = FakeConnector::silent().with_connect_delay(Duration::from_millis(200));
    let harness = Harness::new(connector.clone());

    let events = drain(harness.run(target(), Schedule::empty(), deadline(50))).await;

    assert_eq!(names(&events), ["deadline_exceeded", "closed"]);
    assert!(connector.closes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_wins_tie_with_probe() {
    let harness = Harness::new(FakeConnector::silent());

    let events = drain(harness.run(
        target(),
        schedule(&[(0, json!({"type": "first"})), (50, json!({"type": "tied"}))]),
        deadline(50),
    ))
    .await;

    assert_eq!(sent(&events), [json!({"type": "first"})]);
    assert_eq!(
        names(&events),
        ["opened", "sent", "deadline_exceeded", "closed"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_deadline_counts_from_connection_attempt() {
    let connector = FakeConnector::silent().with_connect_delay(Duration::from_millis(30));
    let harness = Harness::new(connector);

    // Open at 30ms, deadline at 50ms: only the 10ms probe fits.
    let events = drain(harness.run(
        target(),
        schedule(&[(10, json!({"type": "in"})), (25, json!({"type": "out"}))]),
        deadline(50),
    ))
    .await;

    assert_eq!(sent(&events), [json!({"type": "in"})]);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_write_cannot_outlive_deadline() {
    let connector = FakeConnector::scripted([(5, PeerAction::StallWrites)]);
    let harness = Harness::new(connector.clone());
    let started = tokio::time::Instant::now();

    let events = drain(harness.run(
        target(),
        schedule(&[(10, json!({"type": "stuck"})), (20, json!({"type": "never"}))]),
        deadline(300),
    ))
    .await;

    assert_eq!(names(&events), ["opened", "deadline_exceeded", "closed"]);
    assert_eq!(started.elapsed(), Duration::from_millis(300));
    assert!(connector.sent_texts().is_empty());
    assert!(connector.closes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_caller_close_ends_at_deadline() {
    let connector = FakeConnector::scripted([(5, PeerAction::StallWrites)]);
    let harness = Harness::new(connector.clone());
    let started = tokio::time::Instant::now();
    let mut stream = harness.run(target(), Schedule::empty(), deadline(200));
    let handle = stream.handle();

    assert_eq!(stream.next_event().await, Some(SessionEvent::Opened));
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.close();

    let rest: Vec<_> = stream.collect().await;
    assert_eq!(names(&rest), ["deadline_exceeded", "closed"]);
    assert_eq!(started.elapsed(), Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_unrepresentable_deadline_does_not_panic() {
    let connector = FakeConnector::silent();
    let harness = Harness::new(connector.clone());
    let mut stream = harness.run(
        target(),
        Schedule::empty(),
        Deadline::new(Duration::MAX).unwrap(),
    );
    let handle = stream.handle();

    assert_eq!(stream.next_event().await, Some(SessionEvent::Opened));
    handle.close();

    let rest: Vec<_> = stream.collect().await;
    assert_eq!(names(&rest), ["closed"]);
    assert_eq!(connector.closes(), [(1000, "closed by caller".to_string())]);
}

fn sent_count_case(delays: Vec<u64>, deadline_ms: u64) -> usize {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    runtime.block_on(async {
        let entries: Vec<_> = delays
            .iter()
            .map(|d| (*d as i64, json!({"type": "probe"})))
            .collect();
        let harness = Harness::new(FakeConnector::silent());
        let events = drain(harness.run(target(), schedule(&entries), deadline(deadline_ms))).await;
        assert_eq!(events.last().map(SessionEvent::name), Some("closed"));
        sent(&events).len()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_sent_count_matches_delays_before_deadline(
        delays in prop::collection::vec(0u64..200, 0..8),
        deadline_ms in 1u64..200,
    ) {
        let expected = delays.iter().filter(|d| **d < deadline_ms).count();
        prop_assert_eq!(sent_count_case(delays, deadline_ms), expected);
    }
}

// =============================================================================
// Inbound frames
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_malformed_json_is_not_fatal() {
    let harness = Harness::new(FakeConnector::scripted([
        (5, PeerAction::Text("not json".into())),
        (10, PeerAction::Text(r#"{"type":"ride_accepted","rideId":1}"#.into())),
        (20, PeerAction::Close(1000, "bye".into())),
    ]));

    let transcript =
        Transcript::collect(harness.run(target(), Schedule::empty(), deadline(100))).await;

    assert_eq!(transcript.received().len(), 2);
    assert_eq!(transcript.parse_errors().len(), 1);
    assert_eq!(transcript.parse_errors()[0].raw, "not json");
    assert_eq!(transcript.of_type("ride_accepted").len(), 1);
    assert_eq!(transcript.close(), Some((1000, "bye")));
}

#[tokio::test(start_paused = true)]
async fn test_binary_frames_are_received() {
    let harness = Harness::new(FakeConnector::scripted([
        (1, PeerAction::Binary(br#"{"type":"bin"}"#.to_vec())),
        (2, PeerAction::Close(1000, String::new())),
    ]));

    let transcript =
        Transcript::collect(harness.run(target(), Schedule::empty(), deadline(100))).await;

    let frames = transcript.received();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].binary);
    assert_eq!(frames[0].kind(), Some("bin"));
}

#[tokio::test(start_paused = true)]
async fn test_close_without_status_reports_1005() {
    let harness = Harness::new(FakeConnector::scripted([(5, PeerAction::CloseEmpty)]));
    let transcript =
        Transcript::collect(harness.run(target(), Schedule::empty(), deadline(100))).await;
    assert_eq!(transcript.close(), Some((1005, "")));
}

#[tokio::test(start_paused = true)]
async fn test_stream_end_without_close_reports_1006() {
    let harness = Harness::new(FakeConnector::scripted([(5, PeerAction::Drop)]));
    let transcript =
        Transcript::collect(harness.run(target(), Schedule::empty(), deadline(100))).await;
    assert_eq!(transcript.close(), Some((1006, "")));
    assert!(!transcript.deadline_exceeded());
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_mid_session() {
    let harness = Harness::new(FakeConnector::scripted([(
        5,
        PeerAction::Fail(Error::ProtocolViolation("bad frame".into())),
    )]));

    let events = drain(harness.run(
        target(),
        schedule(&[(10, json!({"type": "late"}))]),
        deadline(100),
    ))
    .await;

    assert_eq!(names(&events), ["opened", "error"]);
}

// =============================================================================
// Sends
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_refused_send_is_skipped() {
    let harness = Harness::new(FakeConnector::scripted([(5, PeerAction::StopAccepting)]));

    let events = drain(harness.run(
        target(),
        schedule(&[(0, json!({"type": "ok"})), (10, json!({"type": "refused"}))]),
        deadline(50),
    ))
    .await;

    assert_eq!(
        names(&events),
        ["opened", "sent", "send_skipped", "deadline_exceeded", "closed"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_is_an_error() {
    let harness = Harness::new(FakeConnector::scripted([(5, PeerAction::BreakWrites)]));

    let events = drain(harness.run(
        target(),
        schedule(&[(10, json!({"type": "doomed"})), (20, json!({"type": "never"}))]),
        deadline(100),
    ))
    .await;

    assert_eq!(names(&events), ["opened", "error"]);
    assert!(
        matches!(&events[1], SessionEvent::Error { message } if message.contains("broken pipe"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_target_subject_is_interpolated() {
    let connector = FakeConnector::silent();
    let harness = Harness::new(connector.clone());
    drain(harness.run(target(), Schedule::empty(), deadline(10))).await;
    assert_eq!(connector.log().lock().unwrap().urls, ["ws://fake/ws?userId=42"]);
}

// =============================================================================
// Session handle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_caller_close_is_idempotent() {
    let connector = FakeConnector::silent();
    let harness = Harness::new(connector.clone());
    let mut stream = harness.run(target(), Schedule::empty(), deadline(1000));
    let handle = stream.handle();

    assert_eq!(stream.next_event().await, Some(SessionEvent::Opened));
    handle.close();
    handle.close();

    let rest: Vec<_> = stream.collect().await;
    assert_eq!(
        rest,
        [SessionEvent::Closed {
            code: 1000,
            reason: "closed by caller".into()
        }]
    );
    assert_eq!(connector.closes().len(), 1);

    handle.close();
    assert!(handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_close_after_peer_close_emits_nothing() {
    let harness = Harness::new(FakeConnector::scripted([(5, PeerAction::Close(1001, "away".into()))]));
    let stream = harness.run(target(), Schedule::empty(), deadline(100));
    let handle = stream.handle();

    let events = drain(stream).await;
    handle.close();

    let closes = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Closed { .. }))
        .count();
    assert_eq!(closes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_ad_hoc_send_while_open() {
    let connector = FakeConnector::silent();
    let harness = Harness::new(connector.clone());
    let mut stream = harness.run(target(), Schedule::empty(), deadline(100));
    let handle = stream.handle();

    assert_eq!(stream.next_event().await, Some(SessionEvent::Opened));
    handle.send(json!({"type": "adhoc"})).unwrap();

    assert_eq!(
        stream.next_event().await,
        Some(SessionEvent::Sent {
            payload: json!({"type": "adhoc"})
        })
    );
    assert_eq!(connector.sent_texts(), [r#"{"type":"adhoc"}"#]);
}

#[tokio::test(start_paused = true)]
async fn test_ad_hoc_send_before_open_is_skipped() {
    let connector = FakeConnector::silent().with_connect_delay(Duration::from_millis(20));
    let harness = Harness::new(connector.clone());
    let stream = harness.run(target(), Schedule::empty(), deadline(50));
    stream.handle().send(json!({"type": "early"})).unwrap();

    let events = drain(stream).await;
    assert_eq!(
        names(&events),
        ["send_skipped", "opened", "deadline_exceeded", "closed"]
    );
    assert!(connector.sent_texts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ad_hoc_send_after_end_is_dropped() {
    let harness = Harness::new(FakeConnector::silent());
    let stream = harness.run(target(), Schedule::empty(), deadline(10));
    let handle = stream.handle();
    drain(stream).await;

    assert_eq!(handle.send(json!({"type": "late"})), Ok(()));
}

#[tokio::test(start_paused = true)]
async fn test_ad_hoc_send_validates_payload() {
    let harness = Harness::new(FakeConnector::silent());
    let stream = harness.run(target(), Schedule::empty(), deadline(10));
    assert!(matches!(
        stream.handle().send(json!({"no_type": true})),
        Err(Error::InvalidPayload(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_stream_closes_transport() {
    let connector = FakeConnector::silent();
    let harness = Harness::new(connector.clone());
    let mut stream = harness.run(target(), Schedule::empty(), deadline(10_000));
    let handle = stream.handle();

    assert_eq!(stream.next_event().await, Some(SessionEvent::Opened));
    drop(stream);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(connector.closes(), [(1000, "closed by caller".to_string())]);
    assert!(handle.is_finished());
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_negative_delay_rejected_before_connecting() {
    let result = Schedule::new([
        ProbeSpec::new(0, json!({"type": "ok"})),
        ProbeSpec::new(-1, json!({"type": "bad"})),
    ]);
    assert!(matches!(result, Err(Error::InvalidSchedule { index: 1, .. })));
}

#[test]
fn test_zero_deadline_rejected() {
    assert_eq!(Deadline::from_millis(0), Err(Error::InvalidDeadline));
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_independent() {
    let connector = FakeConnector::silent();
    let harness = Harness::new(connector.clone());

    let a = harness.run(target(), schedule(&[(0, json!({"type": "a"}))]), deadline(20));
    let b = harness.run(
        Target::new("ws://fake/ws?userId={subject}", "7"),
        schedule(&[(0, json!({"type": "b"}))]),
        deadline(40),
    );
    let (a, b) = tokio::join!(drain(a), drain(b));

    assert_eq!(sent(&a), [json!({"type": "a"})]);
    assert_eq!(sent(&b), [json!({"type": "b"})]);
    assert_eq!(connector.closes().len(), 2);
}
