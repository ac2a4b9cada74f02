//! HTTP surface tests: the webhook server and the sheet fetcher.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use common::*;
use meter_lookup_bot::errors::SourceError;
use meter_lookup_bot::request_log::RequestLog;
use meter_lookup_bot::server::{router, ServerState};
use meter_lookup_bot::sheet::{HttpSheetSource, SheetSource};
use tempfile::tempdir;
use teloxide::Bot;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[cfg(test)]
mod tests {
    use super::*;

    fn state(request_log: Option<Arc<RequestLog>>) -> ServerState {
        let harness = HarnessBuilder::new().region("RegionX", REGION_X_CSV).build();
        ServerState {
            bot: Bot::new("123456:TEST"),
            conversation: Arc::new(harness.conversation),
            request_log,
        }
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Test that malformed webhook payloads are still acknowledged
    #[tokio::test]
    async fn test_webhook_answers_ok_for_garbage() {
        for payload in ["not json at all", "{}", r#"{"update_id": "x"}"#] {
            let response = router(state(None))
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/webhook")
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(payload))
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_text(response).await, "ok");
        }
    }

    /// Test the liveness endpoint used by the keep-alive ping
    #[tokio::test]
    async fn test_health_endpoint() {
        let response = router(state(None))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Bot is running");
    }

    /// Test that the log download is a CSV attachment
    #[tokio::test]
    async fn test_download_logs() {
        let dir = tempdir().unwrap();
        let log = Arc::new(RequestLog::open(dir.path().join("logs.csv")).unwrap());
        log.record("42", "0099", "RegionX").unwrap();

        let response = router(state(Some(log)))
            .oneshot(
                Request::builder()
                    .uri("/download_logs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment"));

        let text = body_text(response).await;
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("user_id,timestamp,number,region"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("42,"));
        assert!(row.ends_with(",0099,RegionX"));
    }

    /// Test that the log download is absent when logging is disabled
    #[tokio::test]
    async fn test_download_logs_disabled() {
        let response = router(state(None))
            .oneshot(
                Request::builder()
                    .uri("/download_logs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    /// Test fetching a CSV export over HTTP
    #[tokio::test]
    async fn test_http_sheet_source_parses_export() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("\u{feff}{REGION_X_CSV}")),
            )
            .mount(&server)
            .await;

        let source = HttpSheetSource::new(Duration::from_secs(5)).unwrap();
        let sheet = source
            .fetch(&format!("{}/export", server.uri()))
            .await
            .unwrap();

        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.column_index(METER_COLUMN), Some(0));
        let first = sheet.rows().next().unwrap();
        assert_eq!(first.get("owner"), Some("Ivan"));
    }

    /// Test that HTTP failures surface as status errors
    #[tokio::test]
    async fn test_http_sheet_source_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = HttpSheetSource::new(Duration::from_secs(5)).unwrap();
        let err = source
            .fetch(&format!("{}/broken", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::Status { status: 500, .. }));
    }

    /// Test that an unreachable host is a fetch error, not a panic
    #[tokio::test]
    async fn test_http_sheet_source_unreachable() {
        let source = HttpSheetSource::new(Duration::from_millis(500)).unwrap();
        let err = source.fetch("http://127.0.0.1:9/export").await.unwrap_err();

        assert!(matches!(err, SourceError::Fetch { .. }));
    }
}
