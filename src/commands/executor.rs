//! 命令执行器
//!
//! 对单个工具调用完成：查找 -> schema 校验 -> 调用处理函数（可选超时，捕获 panic）-> 归一化为 CommandResult。
//! 任何失败都作为数据返回，从不向上抛；每次调用输出结构化审计日志（JSON）。
//!
//! 超时不会丢弃处理函数：到期后取消该调用的令牌，继续等待处理函数自行收尾，
//! 结果标记为 Timeout 并保留处理函数返回的信息。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;

use crate::commands::{CommandCatalog, CommandResult, ExecutionContext, FailureKind};
use crate::core::OrchestratorError;
use crate::llm::ToolCall;

pub struct CommandExecutor<T> {
    catalog: Arc<CommandCatalog<T>>,
    timeout: Option<Duration>,
}

impl<T: Send + Sync + 'static> CommandExecutor<T> {
    pub fn new(catalog: Arc<CommandCatalog<T>>, timeout: Option<Duration>) -> Self {
        Self { catalog, timeout }
    }

    pub fn catalog(&self) -> &Arc<CommandCatalog<T>> {
        &self.catalog
    }

    /// 执行一个工具调用；返回值总是一个 CommandResult
    pub async fn execute(&self, target: Arc<T>, call: &ToolCall, ctx: ExecutionContext) -> CommandResult {
        let start = Instant::now();
        let args_preview = args_preview(&call.arguments);
        let result = self.run(target, call, ctx).await;

        let outcome = match result.failure {
            None => "ok",
            Some(FailureKind::UnknownCommand) => "unknown_command",
            Some(FailureKind::Validation) => "validation",
            Some(FailureKind::Handler) => "error",
            Some(FailureKind::Timeout) => "timeout",
            Some(FailureKind::Cancelled) => "cancelled",
            Some(FailureKind::Skipped) => "skipped",
        };
        let audit = serde_json::json!({
            "event": "command_audit",
            "command": call.name,
            "call_id": call.id,
            "ok": result.success,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "command");
        result
    }

    async fn run(&self, target: Arc<T>, call: &ToolCall, ctx: ExecutionContext) -> CommandResult {
        let name = call.name.as_str();
        if ctx.is_cancelled() {
            return CommandResult::failure(
                FailureKind::Cancelled,
                format!("Cancelled before '{name}' started"),
            );
        }

        let Some(command) = self.catalog.get(name) else {
            let err = OrchestratorError::UnknownCommand(name.to_string());
            tracing::warn!(command = name, "{}", err);
            return CommandResult::failure(FailureKind::UnknownCommand, err.to_string());
        };

        let token = ctx.cancel_token();
        let fut = match command.prepare(target, call.arguments.clone(), ctx) {
            Ok(fut) => fut,
            Err(err) => {
                tracing::warn!(command = name, "{}", err);
                return CommandResult::failure(FailureKind::Validation, err.to_string());
            }
        };

        let guarded = AssertUnwindSafe(fut).catch_unwind();
        tokio::pin!(guarded);
        let mut expired = None;
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        command = name,
                        "Command exceeded {:?}, cancelling and waiting for it to return",
                        limit
                    );
                    token.cancel();
                    expired = Some(limit);
                    guarded.await
                }
            },
            None => guarded.await,
        };

        let result = match outcome {
            Ok(Ok(result)) => result.normalized(),
            Ok(Err(e)) => CommandResult::fail(
                OrchestratorError::HandlerFailure {
                    command: name.to_string(),
                    message: format!("{e:#}"),
                }
                .to_string(),
            ),
            Err(panic) => CommandResult::fail(
                OrchestratorError::HandlerFailure {
                    command: name.to_string(),
                    message: format!("panicked: {}", panic_message(panic.as_ref())),
                }
                .to_string(),
            ),
        };

        match expired {
            None => result,
            Some(limit) => {
                let err = OrchestratorError::HandlerTimeout {
                    command: name.to_string(),
                    secs: limit.as_secs_f32(),
                };
                let message = if result.message.is_empty() {
                    err.to_string()
                } else {
                    format!("{err}: {}", result.message)
                };
                CommandResult {
                    success: false,
                    message,
                    failure: Some(FailureKind::Timeout),
                    ..result
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{FnCommand, NoArgs};
    use serde::Deserialize;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    #[derive(Deserialize, schemars::JsonSchema)]
    struct Count {
        n: u32,
    }

    fn executor(timeout: Option<Duration>) -> CommandExecutor<()> {
        let catalog = Arc::new(CommandCatalog::<()>::new());
        catalog
            .register_fn(FnCommand::new("count", "Count", |_t: Arc<()>, a: Count, _c| async move {
                Ok(CommandResult::ok(format!("counted {}", a.n)))
            }))
            .unwrap();
        catalog
            .register_fn(FnCommand::new("broken", "Always errors", |_t: Arc<()>, _a: NoArgs, _c| async {
                Err(anyhow::anyhow!("disk on fire"))
            }))
            .unwrap();
        catalog
            .register_fn(FnCommand::new("refuse", "Reports failure", |_t: Arc<()>, _a: NoArgs, _c| async {
                Ok(CommandResult {
                    success: false,
                    ..CommandResult::ok("not today")
                })
            }))
            .unwrap();
        catalog
            .register_fn(FnCommand::new("explode", "Panics", |_t: Arc<()>, _a: NoArgs, _c| async {
                let armed = true;
                if armed {
                    panic!("boom");
                }
                Ok(CommandResult::ok("never"))
            }))
            .unwrap();
        catalog
            .register_fn(FnCommand::new("slow", "Sleeps until cancelled", |_t: Arc<()>, _a: NoArgs, c: ExecutionContext| async move {
                tokio::select! {
                    _ = c.cancelled() => Ok(CommandResult::ok("gave up")),
                    _ = tokio::time::sleep(Duration::from_secs(5)) => Ok(CommandResult::ok("late")),
                }
            }))
            .unwrap();
        CommandExecutor::new(catalog, timeout)
    }

    async fn run(exec: &CommandExecutor<()>, name: &str, args: serde_json::Value) -> CommandResult {
        exec.execute(
            Arc::new(()),
            &ToolCall::new(name, args),
            ExecutionContext::detached(name),
        )
        .await
    }

    #[tokio::test]
    async fn test_success_path() {
        let r = run(&executor(None), "count", json!({"n": 3})).await;
        assert!(r.success);
        assert_eq!(r.message, "counted 3");
        assert_eq!(r.failure, None);
    }

    #[tokio::test]
    async fn test_unknown_and_validation_failures() {
        let exec = executor(None);
        assert!(exec.catalog().has("count"));
        let r = run(&exec, "nope", json!({})).await;
        assert_eq!(r.failure, Some(FailureKind::UnknownCommand));
        assert_eq!(
            r.message,
            OrchestratorError::UnknownCommand("nope".into()).to_string()
        );

        let r = run(&exec, "count", json!({"n": "three"})).await;
        assert!(!r.success);
        assert_eq!(r.failure, Some(FailureKind::Validation));
        assert!(r.message.starts_with("Invalid arguments for 'count':"));
    }

    #[tokio::test]
    async fn test_handler_error_refusal_and_panic_become_results() {
        let exec = executor(None);

        let r = run(&exec, "broken", json!({})).await;
        assert_eq!(r.failure, Some(FailureKind::Handler));
        assert_eq!(r.message, "Command 'broken' failed: disk on fire");

        let r = run(&exec, "refuse", json!({})).await;
        assert!(!r.success);
        assert_eq!(r.failure, Some(FailureKind::Handler));
        assert_eq!(r.message, "not today");

        let r = run(&exec, "explode", json!({})).await;
        assert_eq!(r.failure, Some(FailureKind::Handler));
        assert_eq!(r.message, "Command 'explode' failed: panicked: boom");
    }

    #[tokio::test]
    async fn test_timeout() {
        let started = Instant::now();
        let r = run(&executor(Some(Duration::from_millis(20))), "slow", json!({})).await;
        assert_eq!(r.failure, Some(FailureKind::Timeout));
        assert!(!r.success);
        assert_eq!(r.message, "Command 'slow' timed out after 0.02s: gave up");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_lets_handler_finish_cleanly() {
        let catalog = Arc::new(CommandCatalog::<parking_lot::Mutex<Vec<String>>>::new());
        catalog
            .register_fn(FnCommand::new(
                "twoStep",
                "Writes two steps",
                |log: Arc<parking_lot::Mutex<Vec<String>>>, _a: NoArgs, c: ExecutionContext| async move {
                    log.lock().push("step1".to_string());
                    tokio::select! {
                        _ = c.cancelled() => {
                            log.lock().push("step1 undone".to_string());
                            Ok(CommandResult::ok("rolled back step1").with_nodes(["n1"]))
                        }
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {
                            log.lock().push("step2".to_string());
                            Ok(CommandResult::ok("both steps done"))
                        }
                    }
                },
            ))
            .unwrap();
        let exec = CommandExecutor::new(catalog, Some(Duration::from_millis(50)));
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let r = exec
            .execute(
                log.clone(),
                &ToolCall::new("twoStep", json!({})),
                ExecutionContext::detached("twoStep"),
            )
            .await;

        assert_eq!(r.failure, Some(FailureKind::Timeout));
        assert!(r.message.ends_with("rolled back step1"));
        assert_eq!(r.affected_nodes, vec!["n1".to_string()]);
        assert_eq!(*log.lock(), vec!["step1".to_string(), "step1 undone".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let exec = executor(None);
        let token = CancellationToken::new();
        token.cancel();
        let r = exec
            .execute(
                Arc::new(()),
                &ToolCall::new("count", json!({"n": 1})),
                ExecutionContext::new("c", "count", token),
            )
            .await;
        assert_eq!(r.failure, Some(FailureKind::Cancelled));
    }
}
