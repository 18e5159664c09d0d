//! 离线 Provider（无需 API）
//!
//! - MockProvider：无 API Key 时 CLI 使用；输入首词若是已声明的工具名，则生成一次工具调用，
//!   其余 `key=value` 作为参数，否则回显文本。
//! - ScriptedProvider：确定性测试替身，按顺序返回预设响应/错误，并记录每次请求。

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::llm::{
    LlmError, LlmProvider, ProviderRequest, ProviderResponse, TextSink, ToolCall,
};

/// Mock 客户端：按首词匹配工具，否则回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockProvider;

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, LlmError> {
        let input = request.last_user_message().unwrap_or("(no input)").trim();
        let mut words = input.split_whitespace();
        let first = words.next().unwrap_or_default();

        if request.tools.iter().any(|t| t.name == first) {
            let arguments = parse_key_values(words);
            return Ok(ProviderResponse::tool_calls(vec![ToolCall::new(
                first,
                Value::Object(arguments),
            )]));
        }

        let names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
        Ok(ProviderResponse::text(format!(
            "Echo from Mock: {input}. Start a line with a command name to run it ({}).",
            names.join(", ")
        )))
    }
}

/// `a=1 b=hello` -> {"a": 1, "b": "hello"}；值能按 JSON 解析（数字/布尔）时保留类型
fn parse_key_values<'a>(words: impl Iterator<Item = &'a str>) -> Map<String, Value> {
    words
        .filter_map(|w| w.split_once('='))
        .map(|(k, v)| {
            let value = serde_json::from_str::<Value>(v)
                .ok()
                .filter(|v| !v.is_object() && !v.is_array())
                .unwrap_or_else(|| Value::String(v.to_string()));
            (k.to_string(), value)
        })
        .collect()
}

/// 确定性测试替身：FIFO 脚本 + 请求记录
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, LlmError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
    /// 流式时每段字符数；None 表示一次性回调全文
    chunk_chars: Option<usize>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个成功响应
    pub fn respond(self, response: ProviderResponse) -> Self {
        self.script.lock().push_back(Ok(response));
        self
    }

    /// 追加一个错误
    pub fn fail(self, error: LlmError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// 每次生成前等待（用于取消 / 并发测试）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_chunk_chars(mut self, chars: usize) -> Self {
        self.chunk_chars = Some(chars.max(1));
        self
    }

    /// 运行中追加脚本
    pub fn push(&self, item: Result<ProviderResponse, LlmError>) {
        self.script.lock().push_back(item);
    }

    /// 已收到的请求（按顺序）
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    async fn next(&self, request: &ProviderRequest) -> Result<ProviderResponse, LlmError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| {
            Err(LlmError::InvalidResponse(
                "scripted provider has no more responses".to_string(),
            ))
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, LlmError> {
        self.next(request).await
    }

    async fn generate_streaming(
        &self,
        request: &ProviderRequest,
        sink: &dyn TextSink,
    ) -> Result<ProviderResponse, LlmError> {
        let response = self.next(request).await?;
        match self.chunk_chars {
            Some(n) => {
                let chars: Vec<char> = response.text.chars().collect();
                for chunk in chars.chunks(n) {
                    sink.text(&chunk.iter().collect::<String>());
                }
            }
            None if !response.text.is_empty() => sink.text(&response.text),
            None => {}
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Message, ToolDeclaration};
    use serde_json::json;

    fn request_with_tool(input: &str) -> ProviderRequest {
        ProviderRequest {
            messages: vec![Message::system("sys"), Message::user(input)],
            tools: vec![ToolDeclaration {
                name: "add_node".to_string(),
                description: "Add a node".to_string(),
                parameters: json!({"type": "object"}),
            }],
            options: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_mock_emits_tool_call_for_known_command() {
        let response = MockProvider
            .generate(&request_with_tool("add_node id=a weight=3 pinned=true"))
            .await
            .unwrap();
        assert!(response.text.is_empty());
        assert_eq!(response.tool_calls.len(), 1);
        let call = &response.tool_calls[0];
        assert_eq!(call.name, "add_node");
        assert_eq!(call.arguments, json!({"id": "a", "weight": 3, "pinned": true}));
        assert!(call.id.starts_with("call_"));
    }

    #[tokio::test]
    async fn test_mock_echoes_plain_text() {
        let response = MockProvider
            .generate(&request_with_tool("hello there"))
            .await
            .unwrap();
        assert!(response.tool_calls.is_empty());
        assert!(response.text.contains("hello there"));
        assert!(response.text.contains("add_node"));
    }

    #[tokio::test]
    async fn test_scripted_returns_in_order_and_records() {
        let provider = ScriptedProvider::new()
            .respond(ProviderResponse::text("one"))
            .fail(LlmError::Network("down".to_string()));

        let req = request_with_tool("x");
        assert_eq!(provider.generate(&req).await.unwrap().text, "one");
        assert_eq!(
            provider.generate(&req).await.unwrap_err(),
            LlmError::Network("down".to_string())
        );
        assert!(matches!(
            provider.generate(&req).await,
            Err(LlmError::InvalidResponse(_))
        ));
        assert_eq!(provider.requests().len(), 3);
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_scripted_streams_in_chunks() {
        let provider = ScriptedProvider::new()
            .respond(ProviderResponse::text("abcdefg"))
            .with_chunk_chars(3);
        let chunks = Mutex::new(Vec::new());
        let on_text = |t: &str| chunks.lock().push(t.to_string());

        let response = provider
            .generate_streaming(&request_with_tool("x"), &on_text)
            .await
            .unwrap();

        assert_eq!(response.text, "abcdefg");
        assert_eq!(*chunks.lock(), vec!["abc", "def", "g"]);
    }

    #[tokio::test]
    async fn test_push_extends_script_while_in_use() {
        let provider = ScriptedProvider::new().respond(ProviderResponse::text("first"));
        provider.push(Err(LlmError::Timeout));
        provider.push(Ok(ProviderResponse::text("third")));
        assert_eq!(provider.remaining(), 3);

        let req = request_with_tool("x");
        assert_eq!(provider.generate(&req).await.unwrap().text, "first");
        assert_eq!(provider.generate(&req).await.unwrap_err(), LlmError::Timeout);
        assert_eq!(provider.generate(&req).await.unwrap().text, "third");
    }
}
