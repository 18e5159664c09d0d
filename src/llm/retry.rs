//! 带重试的 Provider 装饰器
//!
//! 仅对瞬时错误（网络、超时、限流）按指数退避重试；鉴权 / 模型 / 格式错误直接返回。
//! 这是适配器层的可选行为，编排器本身从不自动重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmError, LlmProvider, ProviderRequest, ProviderResponse, TextSink};

/// 重试参数
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 首次失败后的最大重试次数
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的等待；限流时优先使用服务端给出的 retry_after
    fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        if let LlmError::RateLimited { retry_after_ms } = err {
            return Duration::from_millis(*retry_after_ms).min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    config: RetryConfig,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt, &e);
                    tracing::warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient provider error ({}), retrying",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn generate_streaming(
        &self,
        request: &ProviderRequest,
        sink: &dyn TextSink,
    ) -> Result<ProviderResponse, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate_streaming(request, sink).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt, &e);
                    tracing::warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        "Transient provider error ({}), retrying stream",
                        e
                    );
                    sink.restart();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
