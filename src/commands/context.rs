//! 执行上下文：每次命令调用独享
//!
//! 携带取消令牌（协作式取消，处理函数在步骤之间检查）、事件发送端与进度回调。
//! 由编排器在调用前创建，命令返回后不应再持有。

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// 命令在执行中发出的自定义事件
#[derive(Clone, Debug, Serialize)]
pub struct CommandEvent {
    pub call_id: String,
    pub command: String,
    pub payload: Value,
}

type ProgressFn = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct ExecutionContext {
    call_id: String,
    command: String,
    cancel: CancellationToken,
    events: Option<broadcast::Sender<CommandEvent>>,
    progress: Option<ProgressFn>,
}

impl ExecutionContext {
    pub fn new(
        call_id: impl Into<String>,
        command: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            command: command.into(),
            cancel,
            events: None,
            progress: None,
        }
    }

    /// 不接任何回调、使用新令牌的上下文（直接调用命令 / 测试用）
    pub fn detached(command: impl Into<String>) -> Self {
        Self::new("detached", command, CancellationToken::new())
    }

    pub fn with_events(mut self, events: broadcast::Sender<CommandEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 等待取消（可与 tokio::select! 配合）
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 发出事件；没有订阅者时静默丢弃
    pub fn emit(&self, payload: Value) {
        if let Some(tx) = &self.events {
            let _ = tx.send(CommandEvent {
                call_id: self.call_id.clone(),
                command: self.command.clone(),
                payload,
            });
        }
    }

    /// 上报进度，编排器会以 Executing 状态广播该消息
    pub fn report_progress(&self, message: &str) {
        if let Some(cb) = &self.progress {
            cb(message);
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("call_id", &self.call_id)
            .field("command", &self.command)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[tokio::test]
    async fn test_emit_and_progress_reach_sinks() {
        let (tx, mut rx) = broadcast::channel(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let ctx = ExecutionContext::new("c1", "add_node", CancellationToken::new())
            .with_events(tx)
            .with_progress(move |m| seen_cb.lock().push(m.to_string()));

        ctx.emit(json!({"step": 1}));
        ctx.report_progress("halfway");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.call_id, "c1");
        assert_eq!(event.command, "add_node");
        assert_eq!(event.payload, json!({"step": 1}));
        assert_eq!(*seen.lock(), vec!["halfway".to_string()]);
    }

    #[test]
    fn test_cancellation_is_shared_with_token() {
        let token = CancellationToken::new();
        let ctx = ExecutionContext::new("c1", "x", token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_detached_context_has_no_sinks() {
        let ctx = ExecutionContext::detached("x");
        ctx.emit(json!(null));
        ctx.report_progress("ignored");
        assert_eq!(ctx.command(), "x");
        assert!(!ctx.is_cancelled());
    }
}
