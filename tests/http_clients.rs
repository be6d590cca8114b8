//! Mock HTTP server tests for the outbound clients.
//!
//! Uses [`wiremock`] to stand in for the routing platform, the
//! OpenAI-compatible classifier endpoint and a news feed, exercising the full
//! request/response path of each client.

use std::time::Duration;

use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use surge_roster::classifier::{Classifier, ClassifierError, OpenAiClassifier, OpenAiSettings};
use surge_roster::feed::{FeedSource, FetchError, RssFeedSource};
use surge_roster::platform::{CloudPlatform, CloudPlatformConfig, PlatformError, RosterPlatform};
use surge_roster::types::RosterMember;

// ============================================================================
// Routing platform
// ============================================================================

fn platform_for(server: &MockServer) -> CloudPlatform {
    CloudPlatform::new(CloudPlatformConfig {
        api_base: server.uri(),
        login_base: server.uri(),
        client_id: "client".into(),
        client_secret: "secret".into(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

async fn mount_login(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok-1",
            "token_type": "bearer",
            "expires_in": 86400
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn platform_lists_group_members_with_cached_token() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/groups/grp-1/members"))
        .and(header("Authorization", "Bearer tok-1"))
        .and(query_param("pageNumber", "1"))
        .and(query_param("pageSize", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entities": [{"id": "u1", "name": "Ada"}, {"id": "u2", "name": "Bea"}],
            "pageSize": 2,
            "pageNumber": 1,
            "total": 3
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/groups/grp-1/members"))
        .and(query_param("pageNumber", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entities": [{"id": "u3", "name": "Cy"}],
            "total": 3
        })))
        .mount(&server)
        .await;

    let platform = platform_for(&server);
    let first = platform.list_group_members("grp-1", 1, 2).await.unwrap();
    let second = platform.list_group_members("grp-1", 2, 2).await.unwrap();

    assert_eq!(first.total, 3);
    assert_eq!(first.items[0], RosterMember::new("u1", "Ada"));
    assert_eq!(second.items.len(), 1);
}

#[tokio::test]
async fn platform_adds_members_without_delete_flag() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/api/v2/routing/queues/q-1/members"))
        .and(query_param("delete", "false"))
        .and(body_json(serde_json::json!([{"id": "u1"}, {"id": "u2"}])))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let platform = platform_for(&server);
    platform
        .add_queue_members("q-1", &[RosterMember::new("u1", "Ada"), RosterMember::new("u2", "Bea")])
        .await
        .unwrap();
}

#[tokio::test]
async fn platform_chunks_large_mutations() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/api/v2/routing/queues/q-big/members"))
        .respond_with(ResponseTemplate::new(204))
        .expect(3)
        .mount(&server)
        .await;

    let members: Vec<RosterMember> = (0..250)
        .map(|i| RosterMember::new(format!("u{i}"), format!("Agent {i}")))
        .collect();
    platform_for(&server).add_queue_members("q-big", &members).await.unwrap();
}

#[tokio::test]
async fn platform_login_failure_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad client"))
        .mount(&server)
        .await;

    let err = platform_for(&server).list_queues(1, 25).await.unwrap_err();
    assert!(matches!(err, PlatformError::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn platform_rejected_mutation_surfaces_body() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/v2/routing/queues/q-1/members"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown user"))
        .mount(&server)
        .await;

    let err = platform_for(&server)
        .add_queue_members("q-1", &[RosterMember::new("ghost", "Ghost")])
        .await
        .unwrap_err();
    match err {
        PlatformError::Rejected(body) => assert_eq!(body, "unknown user"),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[test]
fn platform_requires_client_id() {
    let result = CloudPlatform::new(CloudPlatformConfig::for_region(
        "mypurecloud.com",
        "",
        "secret",
        Duration::from_secs(5),
    ));
    assert!(matches!(result, Err(PlatformError::NotConfigured(_))));
}

// ============================================================================
// Classifier
// ============================================================================

fn classifier_for(server: &MockServer) -> OpenAiClassifier {
    OpenAiClassifier::new(OpenAiSettings {
        base_url: server.uri(),
        model: "test-model".into(),
        api_key: "sk-mock".into(),
        temperature: 0.0,
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn classifier_returns_first_choice_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-mock"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "1. {\"topic\": \"Finance\", \"location\": null, \"importance\": \"LOW\"}"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = classifier_for(&server).propose_classification("prompt").await.unwrap();
    assert!(reply.starts_with("1. {"));
}

#[tokio::test]
async fn classifier_maps_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = classifier_for(&server).propose_classification("prompt").await.unwrap_err();
    assert!(matches!(err, ClassifierError::RateLimited));
}

#[tokio::test]
async fn classifier_maps_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let err = classifier_for(&server).propose_classification("prompt").await.unwrap_err();
    assert!(matches!(err, ClassifierError::Auth(_)));
}

#[tokio::test]
async fn classifier_empty_choices_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
        .mount(&server)
        .await;

    let err = classifier_for(&server).propose_classification("prompt").await.unwrap_err();
    assert!(matches!(err, ClassifierError::EmptyResponse));
}

// ============================================================================
// Feed source
// ============================================================================

const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>World</title>
  <item><title>Quake hits coast</title><link>https://news.test/a</link><description>&lt;p&gt;Magnitude 6&lt;/p&gt;</description></item>
  <item><title>Rates held</title><link>https://news.test/b</link><description>Central bank pauses</description></item>
</channel></rss>"#;

#[tokio::test]
async fn feed_source_fetches_and_parses_rss() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/world.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
        .mount(&server)
        .await;

    let source = RssFeedSource::new(Duration::from_secs(5)).unwrap();
    let entries = source
        .fetch_entries(&format!("{}/world.xml", server.uri()))
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].identifier, "https://news.test/a");
    assert_eq!(entries[0].snippet, "Magnitude 6");
}

#[tokio::test]
async fn feed_source_non_success_status_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = RssFeedSource::new(Duration::from_secs(5)).unwrap();
    let err = source
        .fetch_entries(&format!("{}/gone.xml", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn feed_source_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RSS).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let source = RssFeedSource::new(Duration::from_millis(200)).unwrap();
    let err = source
        .fetch_entries(&format!("{}/slow.xml", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Timeout(_)), "got {err:?}");
}
