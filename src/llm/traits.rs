//! LLM Provider 抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock / Scripted）实现 LlmProvider：
//! generate（非流式）与 generate_streaming（逐段回调文本，默认退化为一次性回调）。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{ProviderRequest, ProviderResponse};

/// Provider 层错误（网络、鉴权、限流、模型、响应格式）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Request timed out")]
    Timeout,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider config error: {0}")]
    Config(String),
}

impl LlmError {
    /// 可重试的瞬时错误：网络、超时、限流
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Network(_) | LlmError::Timeout | LlmError::RateLimited { .. }
        )
    }
}

/// 流式文本接收端；闭包 `Fn(&str)` 自动实现
pub trait TextSink: Send + Sync {
    /// 新到达的一段文本
    fn text(&self, delta: &str);

    /// 之前收到的文本作废，随后从头重新推送（重试时调用）
    fn restart(&self) {}
}

impl<F> TextSink for F
where
    F: for<'a> Fn(&'a str) + Send + Sync,
{
    fn text(&self, delta: &str) {
        self(delta)
    }
}

/// LLM Provider trait：给定对话与工具声明，返回文本和/或工具调用
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// 后端名称（日志用）
    fn name(&self) -> &str {
        "provider"
    }

    /// 非流式生成
    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, LlmError>;

    /// 流式生成：每收到一段文本调用一次 sink.text，最后返回完整响应。
    /// 默认实现调用 generate 并一次性推送全文。
    async fn generate_streaming(
        &self,
        request: &ProviderRequest,
        sink: &dyn TextSink,
    ) -> Result<ProviderResponse, LlmError> {
        let response = self.generate(request).await?;
        if !response.text.is_empty() {
            sink.text(&response.text);
        }
        Ok(response)
    }
}
