use std::sync::Arc;

use impcase_core::sync::connect;
use impcase_core::{CaseConfig, CaseDocument, CaseSession, SessionNotice, TopicSeed};
use impcase_server::{serve_collab, AppState};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_collaboration_over_websocket() {
    let state = Arc::new(AppState::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(serve_collab(listener, Arc::clone(&state.hub)));

    let mut alice = CaseSession::new(CaseDocument::new(11, "Harbor"), CaseConfig::default());
    alice
        .collaborate(connect(&url).await.unwrap(), "alice")
        .await
        .unwrap();

    let key = alice.invite("bob").await.unwrap();
    let mut bob = CaseSession::accept_invite(
        connect(&url).await.unwrap(),
        CaseConfig::default(),
        11,
        "bob",
        &key,
    )
    .await
    .unwrap();

    let topic = alice.new_topic(TopicSeed::named("Dock 4")).await.unwrap();
    assert_eq!(alice.document().id_of(topic), "t/11/1");
    assert_eq!(bob.next_notice().await, Some(SessionNotice::Refresh));
    assert!(bob.document().topic("t/11/1").is_some());

    let stats = state.hub.lock().await.stats();
    assert_eq!(stats.clients, 2);
    assert_eq!(stats.participants, 2);
}

#[tokio::test]
async fn test_server_survives_bad_client() {
    use tokio::io::AsyncWriteExt;

    let state = Arc::new(AppState::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_collab(listener, Arc::clone(&state.hub)));

    let mut raw = tokio::net::TcpStream::connect(addr).await.unwrap();
    raw.write_all(b"not a websocket handshake\r\n\r\n").await.unwrap();
    drop(raw);

    let mut session = CaseSession::new(CaseDocument::new(12, "Pier"), CaseConfig::default());
    session
        .collaborate(connect(&format!("ws://{}", addr)).await.unwrap(), "dana")
        .await
        .unwrap();
    assert_eq!(state.hub.lock().await.stats().participants, 1);
}
