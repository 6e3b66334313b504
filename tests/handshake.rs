//! Session handshake against a mock endpoint.

mod common;

use anyhow::Result;
use serde_json::json;

use webdriver_bidi::{ConnectionOptions, Error, SessionId};

use common::{MockEndpoint, error, id_of, success};

#[tokio::test]
async fn test_session_id_from_remote() -> Result<()> {
    common::init_logging();
    let mock = MockEndpoint::with_responder(|command| {
        let id = id_of(command);
        match command["method"].as_str() {
            Some("session.status") => vec![success(id, json!({ "ready": true, "message": "ready" }))],
            Some("session.new") => {
                assert_eq!(command["params"]["capabilities"]["alwaysMatch"]["browserName"], "firefox");
                vec![success(id, json!({ "sessionId": "abc-123", "capabilities": {} }))]
            }
            _ => vec![error(id, "unknown command", "unexpected")],
        }
    })
    .await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let session_id = connection.establish_session(Some("firefox")).await?;

    assert_eq!(session_id.as_str(), "abc-123");
    assert!(!session_id.is_synthetic());
    assert_eq!(connection.session_id(), Some(session_id));
    Ok(())
}

#[tokio::test]
async fn test_unsupported_negotiation_falls_back_to_synthetic_id() -> Result<()> {
    let mock = MockEndpoint::with_responder(|command| {
        vec![error(id_of(command), "unknown command", "not supported")]
    })
    .await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let session_id = connection.establish_session(None).await?;

    assert!(session_id.is_synthetic());
    assert!(session_id.as_str().starts_with("bidi-"));
    assert_eq!(session_id.as_str().len(), "bidi-".len() + 8);
    assert_eq!(connection.session_id(), Some(session_id));
    Ok(())
}

#[tokio::test]
async fn test_missing_session_id_falls_back_to_synthetic_id() -> Result<()> {
    let mock = MockEndpoint::with_responder(|command| {
        let id = id_of(command);
        match command["method"].as_str() {
            Some("session.new") => {
                assert_eq!(command["params"], json!({ "capabilities": {} }));
                vec![success(id, json!({}))]
            }
            _ => vec![success(id, json!({ "ready": false, "message": "busy" }))],
        }
    })
    .await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let session_id = connection.establish_session(None).await?;
    assert!(session_id.is_synthetic());
    Ok(())
}

#[tokio::test]
async fn test_handshake_on_closed_connection_fails() -> Result<()> {
    let mock = MockEndpoint::start().await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;
    connection.shutdown();

    let err = connection.establish_session(None).await.expect_err("closed");
    assert!(matches!(err, Error::ConnectionClosed));
    assert!(connection.session_id().is_none());
    Ok(())
}

#[tokio::test]
async fn test_reconnect_adopts_existing_id_without_traffic() -> Result<()> {
    let mut mock = MockEndpoint::start().await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    connection.reconnect(SessionId::new("existing-session"));

    assert_eq!(connection.session_id(), Some(SessionId::new("existing-session")));
    assert_eq!(connection.traffic().messages_sent, 0);
    mock.expect_silence(std::time::Duration::from_millis(100)).await?;
    Ok(())
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe_with_fallback() -> Result<()> {
    let mock = MockEndpoint::with_responder(|command| {
        let id = id_of(command);
        let params = &command["params"];
        match command["method"].as_str() {
            Some("session.subscribe") => {
                assert_eq!(params["events"], json!(["log.entryAdded"]));
                assert_eq!(params["contexts"], json!(["ctx-1"]));
                vec![success(id, json!({ "subscription": "sub-9" }))]
            }
            // Older endpoints only unsubscribe by event name.
            Some("session.unsubscribe") if params.get("subscriptions").is_some() => {
                vec![error(id, "invalid argument", "subscriptions not supported")]
            }
            Some("session.unsubscribe") => {
                assert_eq!(params["events"], json!(["log.entryAdded"]));
                vec![success(id, json!({}))]
            }
            _ => vec![error(id, "unknown command", "unexpected")],
        }
    })
    .await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let subscription = connection
        .subscribe(["log.entryAdded"], Some(vec!["ctx-1".to_string()]))
        .await?;
    assert_eq!(subscription.id, "sub-9");

    connection.unsubscribe(&subscription).await?;
    Ok(())
}

#[tokio::test]
async fn test_subscribe_without_id_uses_command_id() -> Result<()> {
    let mock = MockEndpoint::with_responder(|command| vec![success(id_of(command), json!({}))]).await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let subscription = connection.subscribe(["network"], None).await?;

    assert!(subscription.id.parse::<u64>().is_ok());
    assert!(subscription.contexts.is_none());
    Ok(())
}

#[tokio::test]
async fn test_session_status_and_end() -> Result<()> {
    let mock = MockEndpoint::with_responder(|command| {
        let id = id_of(command);
        match command["method"].as_str() {
            Some("session.status") => vec![success(id, json!({ "ready": true, "message": "ok" }))],
            _ => vec![success(id, json!({}))],
        }
    })
    .await?;
    let connection = mock.connect(ConnectionOptions::new()).await?;

    let status = connection.session_status().await?;
    assert!(status.ready);
    assert_eq!(status.message, "ok");

    connection.reconnect(SessionId::new("s-1"));
    connection.end_session().await?;
    assert!(connection.session_id().is_none());
    Ok(())
}
