//! Steer - 自然语言命令编排
//!
//! 模块划分：
//! - **commands**: 命令定义、目录、执行上下文、执行器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排器、状态广播、会话监管、错误类型
//! - **demo**: 演示用场景图与命令
//! - **llm**: Provider 抽象与实现（OpenAI 兼容 / DeepSeek / Mock / Scripted）
//! - **observability**: 日志初始化

pub mod commands;
pub mod config;
pub mod core;
pub mod demo;
pub mod llm;
pub mod observability;

pub use commands::{Command, CommandCatalog, CommandResult, ExecutionContext, FnCommand};
pub use core::{ExecutionResult, Orchestrator, OrchestratorError, Status, StatusStage};
