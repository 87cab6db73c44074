//! REST client status mapping, credentials and retry policy

use std::sync::Arc;

use mockito::{Matcher, Server};
use serde_json::json;

use analyzer_session::api::error::{FORBIDDEN_MESSAGE, UNEXPECTED_MESSAGE};
use analyzer_session::{ApiClient, ApiError, SessionManager, SessionSettings};

use crate::test_harness::{api_config, FixedProvider};

async fn client(provider: Arc<FixedProvider>, base_url: &str) -> (ApiClient, Arc<SessionManager>) {
    let session = Arc::new(SessionManager::new(provider, SessionSettings::default()));
    session.initialize().await;
    let client = ApiClient::new(api_config(base_url), Arc::clone(&session)).unwrap();
    (client, session)
}

#[tokio::test]
async fn test_anonymous_requests_carry_no_credentials() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/analyses")
        .match_query(Matcher::UrlEncoded("limit".into(), "10".into()))
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!([{ "id": 1 }]).to_string())
        .create_async()
        .await;

    let (client, _) = client(
        Arc::new(FixedProvider::anonymous()),
        &format!("{}/api", server.url()),
    )
    .await;
    let body = client
        .get_recent_analyses(analyzer_session::api::DEFAULT_LIMIT)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(body, json!([{ "id": 1 }]));
}

#[tokio::test]
async fn test_signed_in_requests_carry_bearer_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/analyze")
        .match_header("authorization", "Bearer access-1")
        .match_body(Matcher::Json(json!({ "url": "https://example.com" })))
        .with_status(201)
        .with_body(json!({ "id": "a1" }).to_string())
        .create_async()
        .await;

    let (client, _) = client(
        Arc::new(FixedProvider::signed_in("access-1")),
        &format!("{}/api", server.url()),
    )
    .await;
    let body = client.analyze_url("https://example.com").await.unwrap();

    mock.assert_async().await;
    assert_eq!(body["id"], "a1");
}

#[tokio::test]
async fn test_unauthorized_requests_login() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/analysis/7")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let provider = Arc::new(FixedProvider::signed_in("stale"));
    let (client, _) = client(provider.clone(), &format!("{}/api", server.url())).await;
    let err = client.get_analysis("7").await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, ApiError::SessionExpired { .. }));
    assert_eq!(err.status(), 401);
    assert_eq!(provider.logins(), 1);
}

#[tokio::test]
async fn test_forbidden_leaves_session_alone() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/user/analyses")
        .match_query(Matcher::UrlEncoded("limit".into(), "5".into()))
        .with_status(403)
        .expect(1)
        .create_async()
        .await;

    let provider = Arc::new(FixedProvider::signed_in("access-1"));
    let (client, session) = client(provider.clone(), &format!("{}/api", server.url())).await;
    let err = client.get_user_analyses(5).await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err, ApiError::Forbidden);
    assert_eq!(err.body().message, FORBIDDEN_MESSAGE);
    assert!(session.session().await.is_authenticated());
    assert_eq!(provider.logins(), 0);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/analysis/missing")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(json!({ "message": "Analysis not found", "error": "NOT_FOUND" }).to_string())
        .expect(1)
        .create_async()
        .await;

    let (client, _) = client(
        Arc::new(FixedProvider::anonymous()),
        &format!("{}/api", server.url()),
    )
    .await;
    let err = client.get_analysis("missing").await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(
        err,
        ApiError::Status {
            status: 404,
            message: "Analysis not found".into(),
            error: Some("NOT_FOUND".into()),
        }
    );
}

#[tokio::test]
async fn test_server_errors_retry_reads_once() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/analysis/7")
        .with_status(502)
        .expect(2)
        .create_async()
        .await;

    let (client, _) = client(
        Arc::new(FixedProvider::anonymous()),
        &format!("{}/api", server.url()),
    )
    .await;
    let err = client.get_analysis("7").await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.status(), 502);
    let body = err.body();
    assert_eq!(body.message, UNEXPECTED_MESSAGE);
    assert_eq!(body.error.as_deref(), Some("Request failed with status code 502"));
}

#[tokio::test]
async fn test_malformed_success_body_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/analysis/7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("<html>maintenance</html>")
        .expect(1)
        .create_async()
        .await;

    let (client, _) = client(
        Arc::new(FixedProvider::anonymous()),
        &format!("{}/api", server.url()),
    )
    .await;
    let err = client.get_analysis("7").await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, ApiError::Decode(_)));
    assert_eq!(err.status(), 500);
}

#[tokio::test]
async fn test_mutations_are_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/analyze")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let (client, _) = client(
        Arc::new(FixedProvider::anonymous()),
        &format!("{}/api", server.url()),
    )
    .await;
    let err = client.analyze_url("https://example.com").await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.status(), 500);
}

#[tokio::test]
async fn test_failed_renewal_requests_login_before_sending() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/analysis/7")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let provider = Arc::new(FixedProvider::signed_in("access-1").with_failing_refresh());
    let (client, _) = client(provider.clone(), &format!("{}/api", server.url())).await;
    let err = client.get_analysis("7").await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, ApiError::SessionExpired { .. }));
    assert_eq!(provider.logins(), 1);
}

#[tokio::test]
async fn test_transport_errors_report_500() {
    // Nothing listens on the discard port
    let (client, _) = client(Arc::new(FixedProvider::anonymous()), "http://127.0.0.1:9/api").await;
    let err = client.get_analysis("7").await.unwrap_err();

    assert!(matches!(err, ApiError::Transport(_)));
    assert_eq!(err.status(), 500);
    assert_eq!(err.body().message, UNEXPECTED_MESSAGE);
}
