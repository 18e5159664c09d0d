//! LLM 层：Provider 抽象与实现（OpenAI 兼容 / DeepSeek / Mock / Scripted / 重试装饰）

pub mod deepseek;
pub mod factory;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;
pub mod types;

pub use deepseek::{create_deepseek_provider, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use factory::create_provider_from_config;
pub use mock::{MockProvider, ScriptedProvider};
pub use openai::OpenAiCompatibleProvider;
pub use retry::{RetryConfig, RetryingProvider};
pub use traits::{LlmError, LlmProvider, TextSink};
pub use types::{
    GenerationOptions, Message, ProviderRequest, ProviderResponse, Role, ToolCall,
    ToolDeclaration,
};
