//! 核心编排层：错误类型、状态快照与广播、会话监管、提示词组装、主控编排器

pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod session_supervisor;
pub mod state;
pub mod status;

pub use error::OrchestratorError;
pub use orchestrator::{FailurePolicy, Orchestrator, OrchestratorBuilder};
pub use session_supervisor::SessionSupervisor;
pub use state::{ExecutionResult, Status, StatusStage};
pub use status::{StatusBroadcaster, Subscription};
