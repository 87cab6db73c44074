//! Keycloak provider against a mocked realm

use std::collections::HashMap;

use mockito::{Matcher, Server};
use serde_json::json;
use url::Url;

use analyzer_session::auth::{RefreshOutcome, SilentCheck};
use analyzer_session::{Error, IdentityProvider, KeycloakProvider};

use crate::test_harness::{
    access_token, keycloak_config, mock_refresh_grant, token_response, CLIENT_ID, TOKEN_PATH,
};

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url).unwrap().query_pairs().into_owned().collect()
}

#[tokio::test]
async fn test_silent_check_restores_session_from_refresh_token() {
    let mut server = Server::new_async().await;
    let token = access_token("jdoe", &["admin"], 300);
    let grant = mock_refresh_grant(
        &mut server,
        "stored-refresh",
        200,
        token_response(&token, "rotated-refresh"),
    )
    .await;

    let provider = KeycloakProvider::new(keycloak_config(&server))
        .unwrap()
        .with_refresh_token("stored-refresh");

    match provider.init_silent().await.unwrap() {
        SilentCheck::Authenticated {
            token: received,
            claims,
        } => {
            assert_eq!(received, token);
            assert_eq!(claims.preferred_username.as_deref(), Some("jdoe"));
            assert_eq!(claims.roles(), vec!["admin"]);
        }
        other => panic!("expected a session, got {:?}", other),
    }

    grant.assert_async().await;
    assert_eq!(provider.token().await, Some(token));
    assert_eq!(
        provider.current_refresh_token().await.as_deref(),
        Some("rotated-refresh")
    );
    assert!(!provider.is_token_expiring(70).await);
}

#[tokio::test]
async fn test_silent_check_with_revoked_refresh_token_is_anonymous() {
    let mut server = Server::new_async().await;
    let grant = mock_refresh_grant(
        &mut server,
        "revoked",
        400,
        json!({ "error": "invalid_grant", "error_description": "Token is not active" })
            .to_string(),
    )
    .await;

    let provider = KeycloakProvider::new(keycloak_config(&server))
        .unwrap()
        .with_refresh_token("revoked");

    assert_eq!(provider.init_silent().await.unwrap(), SilentCheck::Anonymous);
    grant.assert_async().await;
    assert!(provider.current_refresh_token().await.is_none());
}

#[tokio::test]
async fn test_silent_check_surfaces_server_errors() {
    let mut server = Server::new_async().await;
    let _grant = mock_refresh_grant(&mut server, "stored", 503, "unavailable".into()).await;

    let provider = KeycloakProvider::new(keycloak_config(&server))
        .unwrap()
        .with_refresh_token("stored");

    match provider.init_silent().await {
        Err(Error::ProviderRejected { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected a provider error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_authorization_code_login() {
    let mut server = Server::new_async().await;
    let token = access_token("jdoe", &["editor"], 300);

    let provider = KeycloakProvider::new(keycloak_config(&server)).unwrap();
    let redirect = provider.login().await;
    let params = query(&redirect.target);
    assert_eq!(params["client_id"], CLIENT_ID);
    assert_eq!(params["code_challenge_method"], "S256");

    let exchange = server
        .mock("POST", TOKEN_PATH)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "auth-code".into()),
            Matcher::UrlEncoded("redirect_uri".into(), "http://localhost:3000/".into()),
            Matcher::Regex("code_verifier=[0-9a-f]{64}".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_response(&token, "refresh-1"))
        .expect(1)
        .create_async()
        .await;

    let claims = provider
        .complete_login("auth-code", &params["state"])
        .await
        .unwrap();
    exchange.assert_async().await;
    assert_eq!(claims.roles(), vec!["editor"]);

    // The held tokens answer the next silent check without a network call
    match provider.init_silent().await.unwrap() {
        SilentCheck::Authenticated { token: held, .. } => assert_eq!(held, token),
        other => panic!("expected a session, got {:?}", other),
    }

    // A replayed callback is rejected
    assert!(matches!(
        provider.complete_login("auth-code", &params["state"]).await,
        Err(Error::CallbackRejected(_))
    ));
}

#[tokio::test]
async fn test_refresh_skips_network_while_token_is_fresh() {
    let mut server = Server::new_async().await;
    let token = access_token("jdoe", &[], 600);
    let _restore =
        mock_refresh_grant(&mut server, "stored", 200, token_response(&token, "next")).await;
    let renew = server
        .mock("POST", TOKEN_PATH)
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "next".into()))
        .with_status(200)
        .with_body(token_response(&token, "later"))
        .expect(0)
        .create_async()
        .await;

    let provider = KeycloakProvider::new(keycloak_config(&server))
        .unwrap()
        .with_refresh_token("stored");
    provider.init_silent().await.unwrap();

    assert_eq!(
        provider.refresh_token(70).await.unwrap(),
        RefreshOutcome { refreshed: false }
    );
    renew.assert_async().await;
}

#[tokio::test]
async fn test_refresh_renews_expiring_token() {
    let mut server = Server::new_async().await;
    let expiring = access_token("jdoe", &[], 30);
    let renewed = access_token("jdoe", &["admin"], 300);
    let _restore =
        mock_refresh_grant(&mut server, "stored", 200, token_response(&expiring, "next")).await;
    let renew =
        mock_refresh_grant(&mut server, "next", 200, token_response(&renewed, "later")).await;

    let provider = KeycloakProvider::new(keycloak_config(&server))
        .unwrap()
        .with_refresh_token("stored");
    provider.init_silent().await.unwrap();
    assert!(provider.is_token_expiring(70).await);

    assert_eq!(
        provider.refresh_token(70).await.unwrap(),
        RefreshOutcome { refreshed: true }
    );
    renew.assert_async().await;
    assert_eq!(provider.token().await, Some(renewed));
    assert_eq!(provider.claims().await.unwrap().roles(), vec!["admin"]);
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_grant() {
    let mut server = Server::new_async().await;
    let expiring = access_token("jdoe", &[], 30);
    let renewed = access_token("jdoe", &[], 300);
    let _restore =
        mock_refresh_grant(&mut server, "stored", 200, token_response(&expiring, "next")).await;
    let renew = server
        .mock("POST", TOKEN_PATH)
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "next".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_response(&renewed, "later"))
        .expect(1)
        .create_async()
        .await;

    let provider = KeycloakProvider::new(keycloak_config(&server))
        .unwrap()
        .with_refresh_token("stored");
    provider.init_silent().await.unwrap();

    let (first, second) = tokio::join!(provider.refresh_token(70), provider.refresh_token(70));

    renew.assert_async().await;
    let mut refreshed = vec![first.unwrap().refreshed, second.unwrap().refreshed];
    refreshed.sort();
    assert_eq!(refreshed, vec![false, true]);
    assert_eq!(provider.token().await, Some(renewed));
}

#[tokio::test]
async fn test_refresh_failure_is_an_error() {
    let mut server = Server::new_async().await;
    let expiring = access_token("jdoe", &[], 30);
    let _restore =
        mock_refresh_grant(&mut server, "stored", 200, token_response(&expiring, "next")).await;
    let _renew = mock_refresh_grant(
        &mut server,
        "next",
        400,
        json!({ "error": "invalid_grant" }).to_string(),
    )
    .await;

    let provider = KeycloakProvider::new(keycloak_config(&server))
        .unwrap()
        .with_refresh_token("stored");
    provider.init_silent().await.unwrap();

    assert!(matches!(
        provider.refresh_token(70).await,
        Err(Error::RefreshFailed(_))
    ));
}

#[tokio::test]
async fn test_logout_redirect_carries_id_token_hint() {
    let mut server = Server::new_async().await;
    let token = access_token("jdoe", &[], 300);
    let _restore =
        mock_refresh_grant(&mut server, "stored", 200, token_response(&token, "next")).await;

    let provider = KeycloakProvider::new(keycloak_config(&server))
        .unwrap()
        .with_refresh_token("stored");
    provider.init_silent().await.unwrap();

    let redirect = provider.logout().await;
    let url = Url::parse(&redirect.target).unwrap();
    assert_eq!(url.path(), "/realms/web-analyzer/protocol/openid-connect/logout");

    let params = query(&redirect.target);
    assert_eq!(params["id_token_hint"], "id-token-value");
    assert_eq!(params["post_logout_redirect_uri"], "http://localhost:3000/");
    assert_eq!(params["client_id"], CLIENT_ID);

    assert!(provider.token().await.is_none());
    assert!(provider.is_token_expiring(70).await);
}
