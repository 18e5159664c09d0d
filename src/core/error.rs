//! 编排器错误类型
//!
//! 只有 ProviderFailure 会把编排器推到 Error 阶段并写入 last_error；
//! 未知命令、参数校验、处理函数失败都作为 CommandResult 数据返回，不越过编排器边界。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("Command already registered: {0}")]
    DuplicateCommand(String),

    #[error("Provider failure: {0}")]
    ProviderFailure(#[from] LlmError),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid arguments for '{command}': {message}")]
    ValidationFailure { command: String, message: String },

    #[error("Command '{command}' failed: {message}")]
    HandlerFailure { command: String, message: String },

    #[error("Command '{command}' timed out after {secs}s")]
    HandlerTimeout { command: String, secs: f32 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Orchestrator has been disposed")]
    Disposed,
}

impl OrchestratorError {
    /// 调用方重新提交同一输入是否可能成功
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestratorError::ProviderFailure(e) => e.is_transient(),
            OrchestratorError::Cancelled => true,
            _ => false,
        }
    }
}
