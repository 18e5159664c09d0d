//! 根据配置与环境变量选择 Provider（OpenAI 兼容 / DeepSeek / Mock）

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::llm::{
    create_deepseek_provider, openai::DEFAULT_OPENAI_MODEL, LlmProvider, MockProvider,
    OpenAiCompatibleProvider, RetryConfig, RetryingProvider,
};

/// provider = mock，或找不到对应 API Key 时使用 Mock；max_retries > 0 时外包一层重试
pub fn create_provider_from_config(cfg: &AppConfig) -> Arc<dyn LlmProvider> {
    let timeout = Duration::from_secs(cfg.llm.timeouts.request.max(1));
    let provider = cfg.llm.provider.to_lowercase();

    let base: Arc<dyn LlmProvider> = match provider.as_str() {
        "mock" => {
            tracing::info!("Using Mock provider");
            Arc::new(MockProvider)
        }
        "deepseek" => match create_deepseek_provider(cfg.llm.model.as_deref(), timeout) {
            Ok(p) => {
                tracing::info!("Using DeepSeek provider ({})", p.model());
                Arc::new(p)
            }
            Err(e) => {
                tracing::warn!("DeepSeek unavailable ({}), using Mock provider", e);
                Arc::new(MockProvider)
            }
        },
        other => {
            if other != "openai" {
                tracing::warn!("Unknown provider '{}', treating as OpenAI compatible", other);
            }
            let model = cfg.llm.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
            let key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
            match OpenAiCompatibleProvider::new(cfg.llm.base_url.as_deref(), model, &key, timeout)
            {
                Ok(p) => {
                    tracing::info!("Using OpenAI compatible provider ({})", model);
                    Arc::new(p)
                }
                Err(e) => {
                    tracing::warn!("No usable OpenAI key ({}), using Mock provider", e);
                    Arc::new(MockProvider)
                }
            }
        }
    };

    if cfg.llm.max_retries == 0 {
        return base;
    }
    Arc::new(RetryingProvider::new(
        base,
        RetryConfig {
            max_retries: cfg.llm.max_retries,
            base_delay: Duration::from_millis(cfg.llm.retry_base_delay_ms),
            ..RetryConfig::default()
        },
    ))
}
