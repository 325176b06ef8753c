use async_trait::async_trait;
use queue_core::{
    ArtifactDraft, FailureKind, Handler, HandlerOutcome, HandlerResult, RunContext, WorkItem,
    WorkPayload,
};
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Runs an `Interrogation` payload against the Anthropic messages API. The
/// `interrogation_key` selects a prompt template; `input_json` supplies the
/// values the template is built from. Prompt template *selection logic*
/// beyond this lookup is out of scope here - a real deployment would plug
/// in a richer template registry behind the same match.
pub struct InterrogationHandler {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl InterrogationHandler {
    pub fn new(client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }

    fn build_prompt(interrogation_key: &str, input_json: &serde_json::Value) -> Result<String, String> {
        match interrogation_key {
            "summarize" => {
                let text = input_json
                    .get("text")
                    .and_then(|v| v.as_str())
                    .ok_or("summarize requires input_json.text")?;
                Ok(format!("Summarize this text in 2-3 sentences:\n\n{text}"))
            }
            "classify" => {
                let text = input_json
                    .get("text")
                    .and_then(|v| v.as_str())
                    .ok_or("classify requires input_json.text")?;
                let labels = input_json
                    .get("labels")
                    .and_then(|v| v.as_array())
                    .ok_or("classify requires input_json.labels")?
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(format!(
                    "Classify this text into exactly one of [{labels}]. Respond with only the label.\n\n{text}"
                ))
            }
            other => Err(format!("unknown interrogation_key: {other}")),
        }
    }
}

#[async_trait]
impl Handler for InterrogationHandler {
    async fn handle(&self, item: &WorkItem, _ctx: &RunContext) -> HandlerResult {
        let WorkPayload::Interrogation {
            interrogation_key,
            input_json,
        } = &item.payload
        else {
            return HandlerResult::failed(
                FailureKind::NonRetryable,
                "llm-analyzer handler received a non-interrogation payload",
            );
        };

        let prompt = match Self::build_prompt(interrogation_key, input_json) {
            Ok(prompt) => prompt,
            Err(reason) => return HandlerResult::failed(FailureKind::NonRetryable, reason),
        };

        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            messages: vec![Message {
                role: "user".into(),
                content: prompt,
            }],
        };

        let response = match self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return HandlerResult::failed(FailureKind::Retryable, err.to_string()),
        };

        let status = response.status();
        let retry_after_seconds = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if status.is_server_error() || status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return HandlerResult {
                outcome: HandlerOutcome::Failed {
                    kind: FailureKind::Retryable,
                    error_message: format!("anthropic api returned {status}: {body}"),
                    retry_after_seconds,
                    artifacts: Vec::new(),
                },
                metrics: None,
            };
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return HandlerResult::failed(
                FailureKind::NonRetryable,
                format!("anthropic api returned {status}: {body}"),
            );
        }

        let raw_body = match response.text().await {
            Ok(body) => body,
            Err(err) => return HandlerResult::failed(FailureKind::Retryable, err.to_string()),
        };

        let parsed: AnthropicResponse = match serde_json::from_str(&raw_body) {
            Ok(parsed) => parsed,
            Err(err) => {
                return HandlerResult::failed(
                    FailureKind::NonRetryable,
                    format!("could not parse anthropic response: {err}"),
                )
            }
        };

        let answer = parsed
            .content
            .first()
            .and_then(|block| block.text.clone())
            .unwrap_or_default();
        let total_tokens = parsed.usage.input_tokens + parsed.usage.output_tokens;

        let output = Some(serde_json::json!({
            "interrogation_key": interrogation_key,
            "answer": answer,
            "total_tokens": total_tokens,
        }));

        let artifact = ArtifactDraft::new(
            "anthropic-response",
            raw_body.into_bytes(),
            "application/json",
        );
        HandlerResult::succeeded(output, vec![artifact])
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_prompt_rejects_unknown_key() {
        let err = InterrogationHandler::build_prompt("nonsense", &serde_json::json!({})).unwrap_err();
        assert!(err.contains("nonsense"));
    }

    #[test]
    fn build_prompt_summarize_requires_text() {
        let err = InterrogationHandler::build_prompt("summarize", &serde_json::json!({})).unwrap_err();
        assert!(err.contains("text"));
    }

    #[test]
    fn build_prompt_classify_joins_labels() {
        let prompt = InterrogationHandler::build_prompt(
            "classify",
            &serde_json::json!({"text": "hello", "labels": ["a", "b"]}),
        )
        .unwrap();
        assert!(prompt.contains("a, b"));
    }
}
