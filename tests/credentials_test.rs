//! Credential refresh behavior against unreachable and rejecting token
//! endpoints, exercised with real sockets on localhost.

use chrono::{Duration, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use vidqueue::config::Config;
use vidqueue::credentials::CredentialResolver;
use vidqueue::database::Database;

async fn setup_database() -> Database {
    let database = Database::new_in_memory().await.unwrap();
    database.migrate().await.unwrap();
    database
}

fn resolver(database: Database, token_endpoint: &str) -> CredentialResolver {
    let mut platform = Config::default().platform;
    platform.token_endpoint = token_endpoint.to_string();
    CredentialResolver::new(database, reqwest::Client::new(), platform)
}

/// Accept one connection and answer every request with the given status
/// line; returns the endpoint URL.
async fn one_shot_endpoint(status_line: &'static str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    format!("http://{}/token", addr)
}

#[tokio::test]
async fn test_transient_endpoint_failure_keeps_token_valid() {
    let db = setup_database().await;
    db.save_token(
        "alice",
        "acct-1",
        "stale-token",
        "refresh-1",
        Utc::now() - Duration::hours(1),
    )
    .await
    .unwrap();

    // Nothing listens on port 1; the refresh attempt fails in transit
    let resolver = resolver(db.clone(), "http://127.0.0.1:1/token");
    let err = resolver.resolve("alice", Some("acct-1")).await.unwrap_err();
    assert!(err.to_string().contains("token endpoint unreachable"));

    // The grant was never rejected, so the account must not demand
    // manual re-authentication
    let token = db.get_token("alice", "acct-1").await.unwrap().unwrap();
    assert!(token.is_valid);
    assert!(token.last_network_error.is_some());

    // A later attempt still reaches the refresh path instead of bailing
    // out on an invalidated token
    let err = resolver.resolve("alice", Some("acct-1")).await.unwrap_err();
    assert!(err.to_string().contains("token endpoint unreachable"));
}

#[tokio::test]
async fn test_rejected_refresh_invalidates_token() {
    let db = setup_database().await;
    db.save_token(
        "alice",
        "acct-1",
        "stale-token",
        "refresh-1",
        Utc::now() - Duration::hours(1),
    )
    .await
    .unwrap();

    let endpoint = one_shot_endpoint("HTTP/1.1 400 Bad Request").await;
    let resolver = resolver(db.clone(), &endpoint);

    let err = resolver.resolve("alice", Some("acct-1")).await.unwrap_err();
    assert!(err.to_string().contains("refresh rejected"));

    let token = db.get_token("alice", "acct-1").await.unwrap().unwrap();
    assert!(!token.is_valid);
    assert!(token.last_network_error.is_some());

    // Invalidated accounts fail fast until re-authenticated
    let err = resolver.resolve("alice", Some("acct-1")).await.unwrap_err();
    assert!(err.to_string().contains("requires re-authentication"));
}
