//! Push webhook handler

use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::processor::{EventProcessor, ProcessOutcome, check_media_type};
use crate::{AppState, SharedState};

/// Handles a push webhook POST.
///
/// The HTTP client and SMTP channel are created for this request only and
/// dropped on every exit path, including when the caller disconnects.
pub async fn handle_push(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::now_v7();
    process_push(&state, &headers, &body)
        .instrument(info_span!("push", %request_id))
        .await
}

async fn process_push(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    if let Err(rejection) = check_media_type(content_type) {
        return outcome_response(ProcessOutcome::Rejected(rejection));
    }

    let diffs = match state.resources.diff_fetcher() {
        Ok(diffs) => diffs,
        Err(e) => {
            error!("Could not create HTTP client: {:?}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let mut channel = state.resources.delivery_channel(&state.config);

    let outcome = EventProcessor::new(&state.config, diffs.as_ref(), channel.as_mut())
        .process(content_type, body)
        .await;

    outcome_response(outcome)
}

fn outcome_response(outcome: ProcessOutcome) -> Response {
    match outcome {
        ProcessOutcome::Delivered(reply) => (StatusCode::OK, reply).into_response(),
        ProcessOutcome::Rejected(rejection) => {
            let status = rejection.status();
            info!("Rejected push ({}): {}", status.as_u16(), rejection.message());
            if status == StatusCode::NO_CONTENT {
                status.into_response()
            } else {
                (status, rejection.message()).into_response()
            }
        }
        ProcessOutcome::Failed(e) => {
            // Details stay in the log; callers only see the status.
            error!("Failed to process push: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use crate::config::MailerConfig;
    use crate::diff::DiffFetcher;
    use crate::error::{MailerError, Result};
    use crate::processor::tests::{DIFF, FakeChannel, FakeDiffs, push_payload, test_config};
    use crate::smtp::DeliveryChannel;
    use crate::ResourceProvider;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[derive(Clone, Default)]
    struct FakeResources {
        diffs: FakeDiffs,
        channel: FakeChannel,
        client_unavailable: bool,
    }

    impl ResourceProvider for FakeResources {
        fn diff_fetcher(&self) -> Result<Box<dyn DiffFetcher>> {
            if self.client_unavailable {
                return Err(MailerError::ConfigError("no TLS backend".to_string()));
            }
            Ok(Box::new(self.diffs.clone()))
        }

        fn delivery_channel(&self, _config: &MailerConfig) -> Box<dyn DeliveryChannel> {
            Box::new(self.channel.clone())
        }
    }

    fn app(resources: FakeResources) -> axum::Router {
        router(Arc::new(AppState::with_resources(test_config(), resources)))
    }

    fn push_request(content_type: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_returns_empty_200() {
        let response = app(FakeResources::default())
            .oneshot(Request::builder().uri("/_health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn test_delivery_returns_server_reply() {
        let resources = FakeResources::default();
        let body = serde_json::to_vec(&push_payload()).unwrap();

        let response = app(resources.clone())
            .oneshot(push_request("application/json", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Ok");

        let sent = resources.channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains(&format!("files:\nM .gitignore\n\n{}", DIFF)));
    }

    #[tokio::test]
    async fn test_wrong_content_type_returns_415_with_reason() {
        let response = app(FakeResources::default())
            .oneshot(push_request("text/plain", b"hello".to_vec()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(
            body_text(response).await,
            "can only accept application/json, not text/plain"
        );
    }

    #[tokio::test]
    async fn test_wrong_content_type_checked_before_client_setup() {
        let resources = FakeResources {
            client_unavailable: true,
            ..FakeResources::default()
        };

        let response = app(resources.clone())
            .oneshot(push_request("text/plain", b"hello".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let response = app(resources)
            .oneshot(push_request(
                "application/json",
                serde_json::to_vec(&push_payload()).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_branch_returns_empty_204() {
        let resources = FakeResources::default();
        let mut payload = push_payload();
        payload["ref"] = json!("refs/heads/invalid");

        let response = app(resources.clone())
            .oneshot(push_request(
                "application/json",
                serde_json::to_vec(&payload).unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(body_text(response).await, "");
        assert!(resources.diffs.requested.lock().unwrap().is_empty());
        assert!(resources.channel.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_commits_returns_204() {
        let response = app(FakeResources::default())
            .oneshot(push_request(
                "application/json",
                serde_json::to_vec(&json!({"ref": "refs/heads/main", "commits": []})).unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_upstream_failure_returns_opaque_500() {
        let resources = FakeResources {
            diffs: FakeDiffs {
                fail_with_status: Some(500),
                ..FakeDiffs::default()
            },
            ..FakeResources::default()
        };

        let response = app(resources)
            .oneshot(push_request(
                "application/json",
                serde_json::to_vec(&push_payload()).unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn test_malformed_json_returns_500() {
        let response = app(FakeResources::default())
            .oneshot(push_request("application/json", b"{".to_vec()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn test_get_on_push_endpoint_is_not_allowed() {
        let response = app(FakeResources::default())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
