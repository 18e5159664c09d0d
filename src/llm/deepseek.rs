//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! DeepSeek 提供与 OpenAI 兼容的 chat/completions 与 function calling。
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat（支持工具调用）, deepseek-reasoner（思考模式）

use std::time::Duration;

use crate::llm::{LlmError, OpenAiCompatibleProvider};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 客户端
///
/// - Key 优先使用 `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY`
/// - 模型：参数 > `DEEPSEEK_MODEL` 环境变量 > deepseek-chat
pub fn create_deepseek_provider(
    model: Option<&str>,
    request_timeout: Duration,
) -> Result<OpenAiCompatibleProvider, LlmError> {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .map_err(|_| LlmError::Config("DEEPSEEK_API_KEY is not set".to_string()))?;

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    Ok(
        OpenAiCompatibleProvider::new(Some(DEEPSEEK_BASE_URL), &model, &api_key, request_timeout)?
            .with_label("deepseek"),
    )
}
