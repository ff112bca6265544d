use quill::summary::{Summarizer, SummaryError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gemini_reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }] }
        }]
    })
}

#[tokio::test]
async fn summarize_returns_first_candidate_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("  A tidy summary. ")))
        .mount(&server)
        .await;

    let summarizer = Summarizer::new(Some("test-key".into()), format!("{}/generate", server.uri()));
    let summary = summarizer
        .summarize("Title", "A post long enough to get the standard prompt, well past fifty characters.")
        .await
        .unwrap();
    assert_eq!(summary, "A tidy summary.");
}

#[tokio::test]
async fn short_content_is_rejected_before_any_request() {
    // No mock mounted: a request would fail, proving none is sent.
    let summarizer = Summarizer::new(Some("test-key".into()), "http://127.0.0.1:1/generate");
    let err = summarizer.summarize("Title", "  hi\n ").await.unwrap_err();
    assert!(matches!(err, SummaryError::TooShort));
}

#[tokio::test]
async fn missing_api_key_means_not_configured() {
    let summarizer = Summarizer::new(None, "http://127.0.0.1:1/generate");
    assert!(!summarizer.is_configured());
    let err = summarizer
        .summarize("Title", "plenty of content right here")
        .await
        .unwrap_err();
    assert!(matches!(err, SummaryError::NotConfigured));
}

#[tokio::test]
async fn upstream_failure_surfaces_as_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let summarizer = Summarizer::new(Some("test-key".into()), format!("{}/generate", server.uri()));
    let err = summarizer
        .summarize("Title", "plenty of content right here")
        .await
        .unwrap_err();
    assert!(matches!(err, SummaryError::Upstream(_)));
}

#[tokio::test]
async fn empty_candidate_list_is_an_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})))
        .mount(&server)
        .await;

    let summarizer = Summarizer::new(Some("test-key".into()), format!("{}/generate", server.uri()));
    let err = summarizer
        .summarize("Title", "plenty of content right here")
        .await
        .unwrap_err();
    assert!(matches!(err, SummaryError::Upstream(_)));
}
