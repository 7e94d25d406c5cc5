//! Transport to the external evaluation model.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

const RESPONSE_RULE: &str = "Respond with the JSON object only. Do not wrap it in prose.";

/// Placeholder returned when no model is configured.
pub const NOOP_EVALUATION: &str = r#"{"summary":"Automated evaluation is disabled because no model API key is configured.","strengths":[],"improvements":["Configure OPENAI_API_KEY to enable scoring."],"scores":{"readme":0,"test":0,"commit":0,"cicd":0}}"#;

/// Error raised by an evaluation gateway.
#[derive(Debug, Clone)]
pub struct GatewayError {
    message: String,
}

impl GatewayError {
    /// Build an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GatewayError {}

/// A text-completion endpoint.
#[cfg_attr(test, mockall::automock)]
pub trait EvaluationGateway {
    /// Send `instructions` and `content`, returning the raw model text.
    fn complete(&self, instructions: &str, content: &str) -> Result<String, GatewayError>;
}

/// Combine the prompt parts into the single input the endpoint accepts.
pub fn compose_input(instructions: &str, content: &str) -> String {
    format!(
        "[SYSTEM PROMPT]\n{instructions}\n\n[USER CONTENT]\n{content}\n\n[RESPONSE RULE]\n{RESPONSE_RULE}"
    )
}

/// Gateway for an OpenAI-compatible Responses API.
#[derive(Debug, Clone)]
pub struct OpenAiGateway {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiGateway {
    /// Build a gateway for `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }
}

impl EvaluationGateway for OpenAiGateway {
    fn complete(&self, instructions: &str, content: &str) -> Result<String, GatewayError> {
        let url = format!("{}/responses", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": compose_input(instructions, content),
        });
        log::debug!("POST {url} (model {})", self.model);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|err| GatewayError::new(format!("model request failed: {err}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(GatewayError::new(format!(
                "model api error ({status}): {body}"
            )));
        }
        let value: Value = response
            .json()
            .map_err(|err| GatewayError::new(format!("model response decode failed: {err}")))?;
        output_text(&value).ok_or_else(|| GatewayError::new("model response missing output text"))
    }
}

/// Pull the generated text out of a Responses API payload.
pub fn output_text(value: &Value) -> Option<String> {
    if let Some(text) = value.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let text: String = value
        .get("output")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

/// Gateway used when no model is configured.
#[derive(Debug, Default, Clone)]
pub struct NoopGateway;

impl EvaluationGateway for NoopGateway {
    fn complete(&self, _instructions: &str, _content: &str) -> Result<String, GatewayError> {
        Ok(NOOP_EVALUATION.to_string())
    }
}

/// Pick the OpenAI gateway when `OPENAI_API_KEY` is set, otherwise the no-op one.
pub fn gateway_from_env() -> Arc<dyn EvaluationGateway + Send + Sync> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty());
    let Some(api_key) = api_key else {
        log::warn!("OPENAI_API_KEY is not set; evaluations will be placeholders");
        return Arc::new(NoopGateway);
    };
    let base_url = std::env::var("OPENAI_BASE_URL")
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    Arc::new(OpenAiGateway::new(base_url, api_key, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{env_lock, remove_env, set_env};
    use httpmock::Method::POST;
    use httpmock::MockServer;

    #[test]
    fn compose_input_marks_each_part() {
        let input = compose_input("rubric", "{\"a\":1}");
        assert!(input.starts_with("[SYSTEM PROMPT]\nrubric\n\n[USER CONTENT]\n{\"a\":1}"));
        assert!(input.contains("[RESPONSE RULE]"));
    }

    #[test]
    fn output_text_prefers_top_level_field() {
        let value = serde_json::json!({"output_text": "direct", "output": []});
        assert_eq!(output_text(&value).as_deref(), Some("direct"));

        let value = serde_json::json!({
            "output": [
                {"content": [{"type": "output_text", "text": "{\"summary\":"}]},
                {"type": "reasoning"},
                {"content": [{"type": "output_text", "text": "\"ok\"}"}]}
            ]
        });
        assert_eq!(output_text(&value).as_deref(), Some("{\"summary\":\"ok\"}"));
        assert_eq!(output_text(&serde_json::json!({"output": []})), None);
    }

    #[test]
    fn openai_gateway_posts_model_and_input() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/responses")
                .header("authorization", "Bearer sk-test")
                .json_body_partial(r#"{"model": "gpt-test"}"#);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({"output_text": "{\"summary\":\"fine\"}"}));
        });

        let gateway = OpenAiGateway::new(server.url("/v1"), "sk-test", "gpt-test");
        let text = gateway.complete("rubric", "data").expect("complete");
        assert_eq!(text, "{\"summary\":\"fine\"}");
        mock.assert();
    }

    #[test]
    fn openai_gateway_reports_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/responses");
            then.status(500).body("overloaded");
        });
        let gateway = OpenAiGateway::new(server.url(""), "sk-test", "gpt-test");
        let err = gateway.complete("rubric", "data").unwrap_err();
        assert!(err.to_string().contains("model api error"));
        assert!(err.to_string().contains("overloaded"));

        let empty = MockServer::start();
        empty.mock(|when, then| {
            when.method(POST).path("/responses");
            then.status(200).json_body(serde_json::json!({"output": []}));
        });
        let gateway = OpenAiGateway::new(empty.url(""), "sk-test", "gpt-test");
        let err = gateway.complete("rubric", "data").unwrap_err();
        assert!(err.to_string().contains("missing output text"));
    }

    #[test]
    fn noop_gateway_output_parses() {
        let raw = NoopGateway.complete("rubric", "data").expect("noop");
        let evaluation = repograde_core::parse_evaluation(&raw).expect("parse");
        assert_eq!(evaluation.scores.total(), 0);
        assert_eq!(evaluation.improvements.len(), 1);
    }

    #[test]
    fn gateway_from_env_respects_api_key() {
        let _guard = env_lock();
        remove_env("OPENAI_API_KEY");
        let gateway = gateway_from_env();
        assert_eq!(
            gateway.complete("x", "y").expect("noop"),
            NOOP_EVALUATION
        );

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/responses");
            then.status(200)
                .json_body(serde_json::json!({"output_text": "live"}));
        });
        set_env("OPENAI_API_KEY", "sk-env");
        set_env("OPENAI_BASE_URL", server.url("").as_str());
        set_env("OPENAI_MODEL", "gpt-env");
        let gateway = gateway_from_env();
        assert_eq!(gateway.complete("x", "y").expect("live"), "live");
        mock.assert();

        remove_env("OPENAI_API_KEY");
        remove_env("OPENAI_BASE_URL");
        remove_env("OPENAI_MODEL");
    }
}
