use crate::core::prompt::{function_schema, FUNCTION_NAME};
use crate::domain::model::{Completion, SamplingParams, Usage};
use crate::domain::ports::TextGenerator;
use crate::utils::error::{ExtractError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// OpenAI 相容的 chat completions 用戶端
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
    function_call: Option<FunctionCall>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl Message {
    /// 依序取 function_call、tool_calls、content
    fn into_output(self) -> Option<String> {
        self.function_call
            .map(|call| call.arguments)
            .or_else(|| self.tool_calls.into_iter().next().map(|call| call.function.arguments))
            .or(self.content)
    }
}

impl OpenAiClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
            timeout: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: Option<u64>) -> Self {
        self.timeout = timeout_seconds.map(Duration::from_secs);
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        params: &SamplingParams,
    ) -> Result<Completion> {
        let body = json!({
            "model": model_id,
            "messages": [{"role": "user", "content": prompt}],
            "functions": [function_schema()],
            "function_call": {"name": FUNCTION_NAME},
            "temperature": params.temperature,
            "top_p": params.top_p,
            "max_tokens": params.max_tokens,
        });

        let url = self.completions_url();
        let mut request = self.client.post(&url).json(&body);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!("Making completion request to: {} ({} prompt bytes)", url, prompt.len());

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("Service response status: {}", status);

        if status == StatusCode::TOO_MANY_REQUESTS {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!("🚦 Service rate limited the request");
            return Err(ExtractError::RateLimited { message });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractError::ServiceError {
                status: Some(status.as_u16()),
                message,
            });
        }

        // 讀取失敗屬於連線問題；內容無法解析則是服務回應有誤
        let body = response.text().await?;
        let payload: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ExtractError::ServiceError {
                status: Some(status.as_u16()),
                message: format!("Undecodable response body: {}", e),
            })?;
        let usage = payload
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let raw_output = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.into_output())
            .ok_or_else(|| ExtractError::ServiceError {
                status: Some(status.as_u16()),
                message: "Response contained no function call or message content".to_string(),
            })?;

        tracing::debug!(
            "📦 Received {} bytes of output, {} tokens used",
            raw_output.len(),
            usage.total_tokens()
        );

        Ok(Completion { raw_output, usage })
    }
}
