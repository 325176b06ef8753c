use async_trait::async_trait;
use queue_core::{
    ArtifactDraft, FailureKind, Handler, HandlerOutcome, HandlerResult, RunContext, WorkItem,
    WorkPayload,
};

/// Fetches the `Fetch` payload's URL and hands the body back as an
/// artifact. Transport errors and 5xx/429 responses are retryable; other
/// 4xx responses are not.
pub struct FetchHandler {
    client: reqwest::Client,
}

impl FetchHandler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Handler for FetchHandler {
    async fn handle(&self, item: &WorkItem, _ctx: &RunContext) -> HandlerResult {
        let WorkPayload::Fetch {
            request_uri,
            request_method,
            request_headers,
            request_body,
        } = &item.payload
        else {
            return HandlerResult::failed(
                FailureKind::NonRetryable,
                "http-ingest handler received a non-fetch payload",
            );
        };

        let method = match request_method.to_uppercase().as_str() {
            "GET" => reqwest::Method::GET,
            "POST" => reqwest::Method::POST,
            "HEAD" => reqwest::Method::HEAD,
            other => {
                return HandlerResult::failed(
                    FailureKind::NonRetryable,
                    format!("unsupported method {other}"),
                )
            }
        };

        let mut request = self.client.request(method, request_uri);
        if let Some(headers) = request_headers.as_ref().and_then(|h| h.as_object()) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key, value);
                }
            }
        }
        if let Some(body) = request_body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                return HandlerResult::failed(FailureKind::Retryable, err.to_string());
            }
        };

        let status = response.status();
        let retry_after_seconds = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if status.is_server_error() || status.as_u16() == 429 {
            return HandlerResult {
                outcome: HandlerOutcome::Failed {
                    kind: FailureKind::Retryable,
                    error_message: format!("upstream returned {status}"),
                    retry_after_seconds,
                    artifacts: Vec::new(),
                },
                metrics: None,
            };
        }
        if status.is_client_error() {
            return HandlerResult::failed(
                FailureKind::NonRetryable,
                format!("upstream returned {status}"),
            );
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return HandlerResult::failed(FailureKind::Retryable, err.to_string()),
        };

        let output = Some(serde_json::json!({
            "resource_id": item.resource_id,
            "status": status.as_u16(),
            "bytes": body.len(),
            "body": body.clone(),
        }));

        let artifact = ArtifactDraft::new("fetch-body", body.into_bytes(), "text/html");
        HandlerResult::succeeded(output, vec![artifact])
    }
}
