//! OpenAI 兼容 API 客户端
//!
//! 通过 reqwest 直接调用 chat/completions（可配置 base_url），使用原生 function calling：
//! 工具声明转为 `tools[].function`，响应中的 `tool_calls[].function.arguments`（JSON 字符串）解析为参数对象。
//! 支持 OpenAI、DeepSeek、自建代理等任意兼容端点。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{
    GenerationOptions, LlmError, LlmProvider, ProviderRequest, ProviderResponse, ToolCall,
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// OpenAI 兼容客户端：持有 HTTP Client、端点、Key 与默认模型
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    label: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        if api_key.is_empty() {
            return Err(LlmError::Config("API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;
        let base = base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/');
        Ok(Self {
            client,
            url: format!("{base}/chat/completions"),
            api_key: api_key.to_string(),
            model: model.to_string(),
            label: "openai".to_string(),
        })
    }

    /// 日志中显示的后端名
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// 请求体：messages + tools（无工具时省略 tools 字段，部分端点不接受空数组）
pub(crate) fn build_request_body(default_model: &str, request: &ProviderRequest) -> Value {
    let GenerationOptions {
        model,
        temperature,
        max_tokens,
    } = &request.options;

    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": model.as_deref().unwrap_or(default_model),
        "messages": messages,
    });

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
    }
    if let Some(t) = temperature {
        body["temperature"] = json!(t);
    }
    if let Some(n) = max_tokens {
        body["max_tokens"] = json!(n);
    }
    body
}

/// 解析 choices[0].message：content -> text，tool_calls -> ToolCall 列表
pub(crate) fn parse_response_body(json: &Value) -> Result<ProviderResponse, LlmError> {
    if let Some(err) = json.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(LlmError::Model(message.to_string()));
    }

    let message = json
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| LlmError::InvalidResponse("no choices[0].message".to_string()))?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| calls.iter().map(parse_tool_call).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();

    Ok(ProviderResponse { text, tool_calls })
}

fn parse_tool_call(tc: &Value) -> Result<ToolCall, LlmError> {
    let function = tc
        .get("function")
        .ok_or_else(|| LlmError::InvalidResponse("tool call without function".to_string()))?;
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| LlmError::InvalidResponse("tool call without name".to_string()))?;
    let id = tc
        .get("id")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));

    // arguments 是 JSON 字符串；无法解析时原样保留，交给 schema 校验报错
    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(other) => other.clone(),
        None => json!({}),
    };

    Ok(ToolCall {
        id,
        name: name.to_string(),
        arguments,
    })
}

fn map_status_error(status: reqwest::StatusCode, retry_after: Option<u64>, body: &str) -> LlmError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status.as_u16() {
        401 | 403 => LlmError::Auth(detail),
        429 => LlmError::RateLimited {
            retry_after_ms: retry_after.map(|s| s.saturating_mul(1000)).unwrap_or(1000),
        },
        408 | 504 => LlmError::Timeout,
        500..=599 => LlmError::Network(detail),
        _ => LlmError::Model(detail),
    }
}

fn map_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Network(e.to_string())
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, LlmError> {
        let body = build_request_body(&self.model, request);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, retry_after, &text));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let parsed = parse_response_body(&json)?;

        tracing::debug!(
            provider = %self.label,
            tool_calls = parsed.tool_calls.len(),
            text_len = parsed.text.len(),
            "Provider response"
        );
        Ok(parsed)
    }
}
