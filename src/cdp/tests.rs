//! Session-level tests
//!
//! Drive a full [`CdpSession`] over the in-memory mock transport, playing the
//! debuggee with [`MockPeer`].

use super::client::CdpClient;
use super::connection::CdpSession;
use super::mock::{default_response, mock_transport, MockPeer};
use super::transport::{Frame, FrameSink, FrameStream, Transport};
use super::types::SessionState;
use crate::config::Config;
use crate::domains::page::ImageFormat;
use crate::domains::runtime::EvaluationResult;
use crate::Error;
use futures::channel::mpsc;
use futures::{Sink, StreamExt};
use serde_json::json;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn open_session() -> (Arc<CdpSession>, MockPeer) {
    let (transport, peer) = mock_transport();
    let session = CdpSession::open(transport, &Config::default());
    (session, peer)
}

#[tokio::test]
async fn test_command_success() {
    let (session, peer) = open_session();
    assert_eq!(session.state(), SessionState::Open);
    peer.serve();

    let result = assert_ok!(session.send_command("Network.enable", json!({})).await);
    assert_eq!(result, json!({}));
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_remote_error_surfaces_code_and_message() {
    let (session, peer) = open_session();
    peer.serve();

    let err = assert_err!(
        session
            .send_command("Page.navigate", json!({ "url": "not-a-url" }))
            .await
    );
    match err {
        Error::RemoteCommand { code, message, .. } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "Invalid URL");
        }
        other => panic!("Expected remote command error, got {:?}", other),
    }
    assert!(session.is_open());
}

#[tokio::test]
async fn test_unsolicited_event_without_subscriber_is_discarded() {
    let (session, peer) = open_session();
    peer.emit("Page.loadEventFired", json!({ "timestamp": 1.0 }));
    peer.serve();

    assert_ok!(session.send_command("Page.enable", json!({})).await);
    assert!(session.is_open());
}

#[tokio::test]
async fn test_concurrent_commands_correlate_out_of_order() {
    let (session, mut peer) = open_session();

    let calls = (0..10).map(|n| {
        let session = Arc::clone(&session);
        async move { session.send_command("Test.echo", json!({ "n": n })).await }
    });

    let responder = async move {
        let mut commands = Vec::new();
        for _ in 0..10 {
            commands.push(peer.next_command().await.unwrap());
        }
        // Answer evens in reverse, then odds in order
        commands.sort_by_key(|c| (c.id % 2, std::cmp::Reverse(c.id)));
        for command in &commands {
            peer.respond(command.id, command.params.clone().unwrap());
        }
        peer
    };

    let (results, _peer) = tokio::join!(futures::future::join_all(calls), responder);

    for (n, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap()["n"], n);
    }
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_unknown_response_id_is_ignored() {
    let (session, peer) = open_session();
    peer.respond(999, json!({ "stray": true }));
    peer.serve();

    let result = assert_ok!(session.send_command("Page.enable", json!({})).await);
    assert_eq!(result, json!({}));
    assert!(session.is_open());
}

#[tokio::test]
async fn test_transport_failure_fails_pending_and_ends_subscriptions() {
    let (session, mut peer) = open_session();
    let mut events = session.subscribe("Page.loadEventFired");

    let call = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send_command("Page.navigate", json!({ "url": "https://example.com" })).await }
    });

    // Wait until the command is on the wire, i.e. registered
    let command = peer.next_command().await.unwrap();
    assert_eq!(command.method, "Page.navigate");
    peer.fail("connection reset");

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_transport(), "unexpected error: {}", err);

    assert!(events.next().await.is_none());
    session.closed().await;
    assert_eq!(session.state(), SessionState::Closed);

    let err = assert_err!(session.send_command("Page.enable", json!({})).await);
    assert!(matches!(err, Error::NotConnected(SessionState::Closed)));
}

#[tokio::test]
async fn test_peer_hang_up_closes_session() {
    let (session, mut peer) = open_session();
    let mut all = session.subscribe_all();

    peer.emit("Page.loadEventFired", json!({ "timestamp": 1.0 }));
    peer.hang_up();

    // Queued events are still delivered before the stream ends
    assert_eq!(all.next().await.unwrap().method, "Page.loadEventFired");
    assert!(all.next().await.is_none());

    session.closed().await;
    assert!(!session.is_open());
}

#[tokio::test]
async fn test_close_is_idempotent_and_rejects_new_commands() {
    let (session, peer) = open_session();
    peer.serve();

    assert_ok!(session.close().await);
    assert_ok!(session.close().await);
    assert_eq!(session.state(), SessionState::Closed);

    let err = assert_err!(session.send_command("Page.enable", json!({})).await);
    assert_eq!(err.to_string(), "Not connected: session is closed");
}

#[tokio::test]
async fn test_timeout_removes_pending_entry() {
    let (session, mut peer) = open_session();

    let err = assert_err!(
        session
            .send_command_with_timeout("Page.enable", json!({}), None, Some(Duration::from_millis(50)))
            .await
    );
    assert!(err.is_timeout());
    assert_eq!(session.pending_count(), 0);

    // A late answer is discarded and the session keeps working
    let late = peer.next_command().await.unwrap();
    peer.respond(late.id, json!({}));
    peer.serve();

    assert_ok!(session.send_command("Page.enable", json!({})).await);
    assert!(session.is_open());
}

#[tokio::test]
async fn test_dropped_call_removes_pending_entry() {
    let (session, _peer) = open_session();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        session.send_command("Page.enable", json!({})),
    )
    .await;

    assert!(abandoned.is_err());
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_events_arrive_in_order() {
    let (session, peer) = open_session();
    let mut all = session.subscribe_all();

    peer.emit("Network.requestWillBeSent", json!({ "requestId": "1" }));
    peer.emit("Network.responseReceived", json!({ "requestId": "1" }));
    peer.emit("Network.loadingFinished", json!({ "requestId": "1" }));

    let methods = all.by_ref().take(3).map(|e| e.method).collect::<Vec<_>>().await;
    assert_eq!(
        methods,
        [
            "Network.requestWillBeSent",
            "Network.responseReceived",
            "Network.loadingFinished"
        ]
    );
}

#[tokio::test]
async fn test_malformed_response_fails_only_that_call() {
    let (session, mut peer) = open_session();

    let call = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send_command("Page.enable", json!({})).await }
    });

    let command = peer.next_command().await.unwrap();
    peer.send_json(json!({ "id": command.id, "result": {}, "error": { "code": 1, "message": "both" } }));

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Protocol(_)), "unexpected error: {}", err);
    assert!(session.is_open());

    peer.serve();
    assert_ok!(session.send_command("Page.enable", json!({})).await);
}

#[tokio::test]
async fn test_undecodable_frame_reported_as_protocol_violation() {
    let (session, peer) = open_session();
    let mut violations = session.protocol_errors();

    peer.send_raw("this is not json");
    peer.send_json(json!({ "params": {} }));

    let first = violations.recv().await.unwrap();
    assert!(first.reason.contains("Invalid JSON"), "reason: {}", first.reason);
    assert_eq!(first.frame, "this is not json");

    let second = violations.recv().await.unwrap();
    assert!(second.reason.contains("neither an id nor a method"));

    peer.serve();
    assert_ok!(session.send_command("Page.enable", json!({})).await);
}

#[tokio::test]
async fn test_typed_domain_calls() {
    let (session, peer) = open_session();
    peer.serve();
    let client = CdpClient::new(session);

    let page = client.page().unwrap();
    assert_ok!(page.enable().await);

    let navigated = assert_ok!(page.navigate("https://example.com").await);
    assert_eq!(navigated.frame_id, "test-frame");

    let png = assert_ok!(page.capture_screenshot(ImageFormat::Png).await);
    assert_eq!(&png[..4], b"\x89PNG");

    let runtime = client.runtime().unwrap();
    let value = assert_ok!(runtime.evaluate("document.title", false).await);
    assert_eq!(value, EvaluationResult::String("test-result".to_string()));

    let targets = assert_ok!(client.target().unwrap().get_targets().await);
    assert_eq!(targets[0].target_id, "test-target-1");
}

#[tokio::test]
async fn test_script_exception_is_reported() {
    let (session, peer) = open_session();
    peer.serve_with(|command| {
        Some(json!({
            "id": command.id,
            "result": {
                "result": { "type": "object", "subtype": "error" },
                "exceptionDetails": {
                    "exceptionId": 1,
                    "text": "Uncaught",
                    "exception": { "type": "object", "description": "ReferenceError: nope is not defined" }
                }
            }
        }))
    });
    let client = CdpClient::new(session);

    let err = assert_err!(client.runtime().unwrap().evaluate("nope", false).await);
    assert!(matches!(err, Error::ScriptExecutionFailed(ref msg) if msg.starts_with("ReferenceError")));
}

#[tokio::test]
async fn test_domain_is_created_once_under_concurrent_access() {
    let (session, peer) = open_session();
    let client = CdpClient::new(Arc::clone(&session));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                let page = client.page().unwrap();
                let stream = page.on_load_event_fired();
                (page, stream)
            })
        })
        .collect();

    let mut pages = Vec::new();
    let mut streams = Vec::new();
    for task in tasks {
        let (page, stream) = task.await.unwrap();
        pages.push(page);
        streams.push(stream);
    }

    assert!(pages.iter().all(|p| Arc::ptr_eq(p, &pages[0])));
    assert_eq!(client.domains().len(), 1);
    assert_eq!(session.events().subscriber_count("Page.loadEventFired"), 1);

    peer.emit("Page.loadEventFired", json!({ "timestamp": 42.5 }));
    for stream in &mut streams {
        let event = stream.next().await.unwrap();
        assert_eq!(event.timestamp, 42.5);
    }
}

#[tokio::test]
async fn test_attached_target_routes_commands_and_events() {
    let (session, mut peer) = open_session();
    let client = CdpClient::new(session);

    let attach = tokio::spawn({
        let client = client.clone();
        async move { client.attach_to_target("T1").await }
    });

    let command = peer.next_command().await.unwrap();
    assert_eq!(command.method, "Target.attachToTarget");
    assert_eq!(command.params.clone().unwrap(), json!({ "targetId": "T1", "flatten": true }));
    peer.send_json(default_response(&command).unwrap());

    let child = attach.await.unwrap().unwrap();
    assert_eq!(child.handle().session_id(), Some("session-T1"));
    assert!(Arc::ptr_eq(child.session(), client.session()));

    let child_page = child.page().unwrap();
    let enable = tokio::spawn(async move { child_page.enable().await });
    let command = peer.next_command().await.unwrap();
    assert_eq!(command.session_id.as_deref(), Some("session-T1"));
    peer.send_json(default_response(&command).unwrap());
    assert_ok!(enable.await.unwrap());

    // Separate registries, separate domain instances
    assert!(!Arc::ptr_eq(&client.page().unwrap(), &child.page().unwrap()));

    let mut child_events = child.handle().subscribe("Page.loadEventFired");
    let mut root_events = client.handle().subscribe("Page.loadEventFired");

    peer.emit_to("session-T1", "Page.loadEventFired", json!({ "timestamp": 1.0 }));
    peer.emit("Page.loadEventFired", json!({ "timestamp": 2.0 }));

    let event = child_events.next().await.unwrap();
    assert_eq!(event.session_id.as_deref(), Some("session-T1"));
    assert_eq!(event.params.unwrap()["timestamp"], 1.0);

    let event = root_events.next().await.unwrap();
    assert!(event.session_id.is_none());
    assert_eq!(event.params.unwrap()["timestamp"], 2.0);
}

/// Outbound half that never accepts a frame
struct StalledSink;

impl Sink<Frame> for StalledSink {
    type Error = Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<crate::Result<()>> {
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, _frame: Frame) -> crate::Result<()> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<crate::Result<()>> {
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<crate::Result<()>> {
        Poll::Pending
    }
}

/// Transport whose writes block forever; inbound frames come from the returned sender
struct StalledTransport {
    inbound: mpsc::UnboundedReceiver<crate::Result<Frame>>,
}

impl Transport for StalledTransport {
    fn split(self) -> (FrameSink, FrameStream) {
        (Box::pin(StalledSink), Box::pin(self.inbound))
    }
}

fn open_stalled_session() -> (Arc<CdpSession>, mpsc::UnboundedSender<crate::Result<Frame>>) {
    let (inject, inbound) = mpsc::unbounded();
    let session = CdpSession::open(StalledTransport { inbound }, &Config::default());
    (session, inject)
}

#[tokio::test]
async fn test_timeout_covers_blocked_write() {
    let (session, _inject) = open_stalled_session();

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        session.send_command_with_timeout("Page.enable", json!({}), None, Some(Duration::from_millis(100))),
    )
    .await
    .expect("command with a 100ms timeout is still waiting");

    let err = assert_err!(outcome);
    assert!(err.is_timeout(), "unexpected error: {}", err);
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_transport_failure_releases_blocked_writers() {
    let (session, inject) = open_stalled_session();

    let calls: Vec<_> = (0..3)
        .map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .send_command_with_timeout("Page.enable", json!({}), None, None)
                    .await
            })
        })
        .collect();

    // One call holds the sink, the others queue behind it
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.pending_count(), 3);

    inject.unbounded_send(Err(Error::transport("boom"))).unwrap();

    for call in calls {
        let outcome = tokio::time::timeout(Duration::from_secs(2), call)
            .await
            .expect("blocked command did not resolve after transport failure");
        let err = outcome.unwrap().unwrap_err();
        assert!(err.is_transport(), "unexpected error: {}", err);
    }

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.pending_count(), 0);
}
