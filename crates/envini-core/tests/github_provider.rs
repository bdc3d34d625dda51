//! `GitHubProvider` against a mocked GitHub REST API.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use envini_core::{AccessDecision, AccessGate, GitHubProvider, ProviderError, RepositoryProvider};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> GitHubProvider {
    GitHubProvider::new(server.uri(), Duration::from_secs(2)).unwrap()
}

fn listing() -> serde_json::Value {
    json!([
        {
            "id": 1296269,
            "name": "widgets",
            "full_name": "acme/widgets",
            "html_url": "https://github.com/acme/widgets",
            "description": null,
            "private": true,
            "owner": { "login": "acme", "avatar_url": "https://avatars.example/acme" },
            "fork": false
        },
        {
            "id": 42,
            "name": "gadgets",
            "full_name": "acme/gadgets",
            "html_url": "https://github.com/acme/gadgets",
            "description": "Gadget service",
            "private": false,
            "owner": { "login": "acme", "avatar_url": "https://avatars.example/acme" }
        }
    ])
}

async fn mount_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("per_page", "100"))
        .and(header("authorization", "Bearer gho_valid"))
        .and(header("accept", "application/vnd.github+json"))
        .and(header("x-github-api-version", "2022-11-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn lists_repositories_with_expected_headers() {
    let server = MockServer::start().await;
    mount_listing(&server).await;

    let repos = provider(&server).list_repositories("gho_valid").await.unwrap();

    assert_eq!(repos.len(), 2);
    assert_eq!(repos[0].id, 1_296_269);
    assert_eq!(repos[0].owner_login, "acme");
    assert_eq!(repos[0].description, "");
    assert!(repos[0].is_private);
    assert_eq!(repos[1].description, "Gadget service");
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
        .mount(&server)
        .await;

    let err = provider(&server).list_repositories("gho_expired").await.unwrap_err();
    assert!(matches!(err, ProviderError::Status { status: 401 }));
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&server)
        .await;

    let err = provider(&server).list_repositories("gho_valid").await.unwrap_err();
    assert!(matches!(err, ProviderError::Decode { .. }));
}

#[tokio::test]
async fn slow_upstream_hits_the_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let slow = GitHubProvider::new(server.uri(), Duration::from_millis(50)).unwrap();
    let err = slow.list_repositories("gho_valid").await.unwrap_err();
    assert!(matches!(err, ProviderError::Transport { .. }));
}

#[tokio::test]
async fn failing_upstream_never_grants_access() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let gate = AccessGate::new(Arc::new(provider(&server)));
    let decision = gate.check("gho_valid", "acme", "widgets").await;
    assert!(matches!(decision, AccessDecision::UpstreamUnavailable { .. }));
}

#[tokio::test]
async fn gate_matches_against_the_mocked_listing() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    let gate = AccessGate::new(Arc::new(provider(&server)));

    let allowed = gate.check("gho_valid", "acme", "widgets").await;
    assert!(matches!(allowed, AccessDecision::Allowed(ref r) if r.full_name == "acme/widgets"));

    let denied = gate.check("gho_valid", "acme", "sprockets").await;
    assert!(matches!(denied, AccessDecision::Denied { .. }));
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_tolerated() {
    let server = MockServer::start().await;
    mount_listing(&server).await;

    let provider = GitHubProvider::new(format!("{}/", server.uri()), Duration::from_secs(2)).unwrap();
    assert_eq!(provider.base_url(), server.uri());
    assert_eq!(provider.list_repositories("gho_valid").await.unwrap().len(), 2);
}
