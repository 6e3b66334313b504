//! Command/reply correlation against a mock endpoint.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

use webdriver_bidi::{ConnectionOptions, Error};

use common::{MockEndpoint, STEP_TIMEOUT, error, event, id_of, success};

// ============================================================================
// Concurrency and Ordering
// ============================================================================

#[tokio::test]
async fn test_concurrent_commands_each_get_their_own_reply() -> Result<()> {
    common::init_logging();
    let mock =
        MockEndpoint::with_responder(|command| vec![success(id_of(command), json!({ "echo": id_of(command) }))])
            .await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let mut handles = Vec::new();
    for _ in 0..50 {
        let connection = connection.clone();
        handles.push(tokio::spawn(async move {
            let command = connection.command("script.evaluate", json!({}))?;
            let id = command.id.as_u64();
            let result: Value = connection.send_and_wait(command, STEP_TIMEOUT).await?;
            Ok::<_, Error>((id, result))
        }));
    }

    for handle in handles {
        let (id, result) = handle.await??;
        assert_eq!(result["echo"].as_u64(), Some(id));
    }
    assert_eq!(connection.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_completion_follows_arrival_order() -> Result<()> {
    let mut mock = MockEndpoint::start().await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let first = {
        let connection = connection.clone();
        let command = connection.command("browsingContext.navigate", json!({ "url": "a" }))?;
        tokio::spawn(async move { connection.send_and_wait::<Value>(command, STEP_TIMEOUT).await })
    };
    let first_id = id_of(&mock.next_command().await?);

    let second = {
        let connection = connection.clone();
        let command = connection.command("browsingContext.navigate", json!({ "url": "b" }))?;
        tokio::spawn(async move { connection.send_and_wait::<Value>(command, STEP_TIMEOUT).await })
    };
    let second_id = id_of(&mock.next_command().await?);
    assert!(first_id < second_id);

    mock.send(success(second_id, json!({ "url": "b" })))?;
    let second_result = timeout(STEP_TIMEOUT, second).await???;
    assert_eq!(second_result["url"], "b");
    assert!(!first.is_finished());

    mock.send(success(first_id, json!({ "url": "a" })))?;
    let first_result = timeout(STEP_TIMEOUT, first).await???;
    assert_eq!(first_result["url"], "a");
    Ok(())
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test]
async fn test_transient_errors_are_invisible_under_retry_policy() -> Result<()> {
    let mut mock = MockEndpoint::start().await?;
    let connection = mock
        .connect(ConnectionOptions::new().with_retry(3, Duration::from_millis(5000)))
        .await?;

    let command = connection.command("browsingContext.navigate", json!({ "url": "x" }))?;
    let waiter = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.send_and_wait::<Value>(command, STEP_TIMEOUT).await })
    };

    let original = mock.next_command().await?;
    let id = id_of(&original);

    mock.send(error(id, "unknown error", "busy"))?;
    let resend = mock.next_command().await?;
    assert_eq!(resend, original);

    mock.send(error(id, "unknown error", "still busy"))?;
    let resend = mock.next_command().await?;
    assert_eq!(resend, original);

    mock.send(success(id, json!({ "navigation": "n1" })))?;
    let result = timeout(STEP_TIMEOUT, waiter).await???;
    assert_eq!(result["navigation"], "n1");

    mock.expect_silence(Duration::from_millis(100)).await?;
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_yield_exactly_one_error() -> Result<()> {
    let mut mock = MockEndpoint::start().await?;
    let connection = mock
        .connect(ConnectionOptions::new().with_retry(1, Duration::from_millis(5)))
        .await?;

    let command = connection.command("script.callFunction", json!({}))?;
    let waiter = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.send_and_wait::<Value>(command, STEP_TIMEOUT).await })
    };

    let id = id_of(&mock.next_command().await?);
    mock.send(error(id, "unknown error", "first"))?;

    // One resend: count had headroom.
    assert_eq!(id_of(&mock.next_command().await?), id);

    // Both bounds now spent.
    sleep(Duration::from_millis(20)).await;
    mock.send(error(id, "unknown error", "final"))?;

    let err = timeout(STEP_TIMEOUT, waiter).await??.expect_err("terminal error");
    match err {
        Error::Protocol { error, message, .. } => {
            assert_eq!(error, "unknown error");
            assert_eq!(message, "final");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }

    mock.expect_silence(Duration::from_millis(100)).await?;
    assert_eq!(connection.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_error_is_terminal_without_retry_policy() -> Result<()> {
    let mut mock = MockEndpoint::start().await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let command = connection.command("session.new", json!({}))?;
    let waiter = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.send_and_wait::<Value>(command, STEP_TIMEOUT).await })
    };

    let id = id_of(&mock.next_command().await?);
    mock.send(json!({
        "id": id,
        "type": "error",
        "error": "session not created",
        "message": "already exists",
        "stacktrace": "at line 1"
    }))?;

    let err = timeout(STEP_TIMEOUT, waiter).await??.expect_err("protocol error");
    assert!(err.is_protocol_error());
    assert!(!err.is_timeout());
    assert!(matches!(err, Error::Protocol { stacktrace: Some(ref trace), .. } if trace == "at line 1"));

    mock.expect_silence(Duration::from_millis(100)).await?;
    Ok(())
}

// ============================================================================
// Timeout and Cancellation
// ============================================================================

#[tokio::test]
async fn test_timeout_removes_entry_and_late_reply_is_dropped() -> Result<()> {
    let mut mock = MockEndpoint::start().await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let command = connection.command("browsingContext.captureScreenshot", json!({}))?;
    let err = connection
        .send_and_wait::<Value>(command, Duration::from_millis(200))
        .await
        .expect_err("no reply");

    let Error::RequestTimeout {
        command_id,
        method,
        timeout_ms,
    } = err
    else {
        panic!("expected timeout");
    };
    assert_eq!(method, "browsingContext.captureScreenshot");
    assert_eq!(timeout_ms, 200);
    assert_eq!(connection.pending_count(), 0);

    let timed_out = mock.next_command().await?;
    assert_eq!(id_of(&timed_out), command_id.as_u64());

    // Late reply for the expired id must not reach the next caller.
    mock.send(success(command_id.as_u64(), json!({ "late": true })))?;

    let next = connection.command("session.status", json!({}))?;
    let waiter = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.send_and_wait::<Value>(next, STEP_TIMEOUT).await })
    };
    let next_id = id_of(&mock.next_command().await?);
    mock.send(success(next_id, json!({ "ready": true })))?;

    let result = timeout(STEP_TIMEOUT, waiter).await???;
    assert_eq!(result, json!({ "ready": true }));
    Ok(())
}

#[tokio::test]
async fn test_dropped_waiter_removes_entry() -> Result<()> {
    let mut mock = MockEndpoint::start().await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let command = connection.command("script.evaluate", json!({}))?;
    let waiter = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.send_and_wait::<Value>(command, STEP_TIMEOUT).await })
    };

    mock.next_command().await?;
    assert_eq!(connection.pending_count(), 1);

    waiter.abort();
    let _ = waiter.await;
    assert_eq!(connection.pending_count(), 0);
    Ok(())
}

// ============================================================================
// Result Shapes
// ============================================================================

#[tokio::test]
async fn test_raw_reply_is_returned_verbatim() -> Result<()> {
    let mut mock = MockEndpoint::start().await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let command = connection.command("browsingContext.getTree", json!({}))?;
    let waiter = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.send_and_wait_raw(command, STEP_TIMEOUT).await })
    };

    let id = id_of(&mock.next_command().await?);
    let frame = format!(r#"{{"type":"success","id":{id},"result":{{"contexts":[]}}}}"#);
    mock.send_text(frame.clone())?;

    let raw = timeout(STEP_TIMEOUT, waiter).await???;
    assert_eq!(raw, frame);
    Ok(())
}

#[tokio::test]
async fn test_typed_result_and_shape_mismatch() -> Result<()> {
    #[derive(Debug, Deserialize)]
    struct Status {
        ready: bool,
    }

    let mock = MockEndpoint::with_responder(|command| match command["method"].as_str() {
        Some("session.status") => vec![success(id_of(command), json!({ "ready": true, "message": "" }))],
        _ => vec![success(id_of(command), json!("not an object"))],
    })
    .await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let status: Status = connection
        .send_and_wait(connection.command("session.status", json!({}))?, STEP_TIMEOUT)
        .await?;
    assert!(status.ready);

    let err = connection
        .send_and_wait::<Status>(connection.command("browser.getUserContexts", json!({}))?, STEP_TIMEOUT)
        .await
        .expect_err("shape mismatch");
    assert!(matches!(err, Error::Json(_)));
    Ok(())
}

// ============================================================================
// Events vs Replies
// ============================================================================

#[tokio::test]
async fn test_event_frame_is_never_matched_to_a_command() -> Result<()> {
    let mut mock = MockEndpoint::start().await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let (event_tx, event_rx) = oneshot::channel();
    let event_tx = Mutex::new(Some(event_tx));
    let _subscription = connection.on_event("log.entryAdded", move |event| {
        if let Some(tx) = event_tx.lock().take() {
            let _ = tx.send(event.params.clone());
        }
    });

    let command = connection.command("script.evaluate", json!({}))?;
    let waiter = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.send_and_wait::<Value>(command, STEP_TIMEOUT).await })
    };
    let id = id_of(&mock.next_command().await?);

    mock.send(event("log.entryAdded", json!({ "level": "info", "text": "hello" })))?;
    let params = timeout(STEP_TIMEOUT, event_rx).await??;
    assert_eq!(params["text"], "hello");

    assert!(!waiter.is_finished());
    assert_eq!(connection.pending_count(), 1);

    mock.send(success(id, json!({ "value": 2 })))?;
    let result = timeout(STEP_TIMEOUT, waiter).await???;
    assert_eq!(result["value"], 2);
    Ok(())
}

// ============================================================================
// Lower-level Sends
// ============================================================================

#[tokio::test]
async fn test_send_with_callback_delivers_once() -> Result<()> {
    let mut mock = MockEndpoint::start().await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let calls = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = oneshot::channel();
    let command = connection.command("session.status", json!({}))?;
    let id = {
        let calls = Arc::clone(&calls);
        connection.send_with_callback(
            command,
            Box::new(move |outcome| {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.send(outcome.map(|reply| reply.response.is_success()));
            }),
        )?
    };

    assert_eq!(id_of(&mock.next_command().await?), id.as_u64());
    mock.send(success(id.as_u64(), json!({})))?;
    mock.send(success(id.as_u64(), json!({})))?;

    assert!(timeout(STEP_TIMEOUT, done_rx).await???);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_fire_and_forget_is_not_tracked() -> Result<()> {
    let mut mock = MockEndpoint::start().await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let command = connection.command("input.performActions", json!({ "actions": [] }))?;
    connection.send_fire_and_forget(command)?;

    let received = mock.next_command().await?;
    assert_eq!(received["method"], "input.performActions");
    assert_eq!(connection.pending_count(), 0);
    assert_eq!(connection.traffic().messages_sent, 1);
    Ok(())
}
