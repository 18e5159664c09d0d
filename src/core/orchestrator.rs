//! 编排器：输入 -> Provider -> 工具调用 -> 命令执行 -> 汇总结果
//!
//! 状态机：Ready/Error -> Submitted -> Streaming -> (Executing) -> Ready，Provider 失败时进入 Error。
//! 每次阶段变化都通过 StatusBroadcaster 发布新快照。`execute` 从不返回 Err：
//! 命令失败是结果数据，只有 Provider 失败会写入 last_error。
//! 同一实例上的并发 execute 按到达顺序串行执行。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::commands::{
    CommandCatalog, CommandEvent, CommandExecutor, CommandResult, ExecutionContext, FailureKind,
};
use crate::config::{AppConfig, CommandsSection, DEFAULT_SYSTEM_PROMPT};
use crate::core::prompt::build_system_prompt;
use crate::core::{
    ExecutionResult, OrchestratorError, SessionSupervisor, Status, StatusBroadcaster, StatusStage,
    Subscription,
};
use crate::llm::{
    GenerationOptions, LlmProvider, Message, ProviderRequest, TextSink, ToolCall,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 一次响应包含多个工具调用且其中有失败时的处理方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 继续执行剩余调用
    #[default]
    ContinueAll,
    /// 首个失败后剩余调用记为 Skipped
    StopOnFirstFailure,
}

#[derive(Debug, Default)]
struct RetryMemory {
    last_input: Option<String>,
    last_error: Option<OrchestratorError>,
}

pub struct Orchestrator<T> {
    catalog: Arc<CommandCatalog<T>>,
    executor: CommandExecutor<T>,
    provider: Arc<dyn LlmProvider>,
    target: Arc<T>,
    system_prompt: String,
    options: GenerationOptions,
    failure_policy: FailurePolicy,
    status: StatusBroadcaster,
    supervisor: SessionSupervisor,
    memory: Mutex<RetryMemory>,
    run_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<CommandEvent>,
}

impl<T: Send + Sync + 'static> Orchestrator<T> {
    pub fn builder(
        catalog: Arc<CommandCatalog<T>>,
        provider: Arc<dyn LlmProvider>,
        target: Arc<T>,
    ) -> OrchestratorBuilder<T> {
        OrchestratorBuilder {
            catalog,
            provider,
            target,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            failure_policy: FailurePolicy::default(),
            handler_timeout: CommandsSection::default().handler_timeout(),
            options: GenerationOptions::default(),
        }
    }

    /// 处理一条用户输入；总是返回 ExecutionResult
    pub async fn execute(&self, input: &str) -> ExecutionResult {
        let _turn = self.run_lock.lock().await;

        let Some(token) = self.supervisor.begin_run() else {
            let err = OrchestratorError::Disposed;
            tracing::warn!("execute called after dispose");
            return ExecutionResult::failed(err.to_string(), err.to_string());
        };
        let result = self.run(input, &token).await;
        self.supervisor.end_run();
        result
    }

    /// 重新执行上一次输入；没有记录时返回 None
    pub async fn retry_last(&self) -> Option<ExecutionResult> {
        let input = self.last_input()?;
        tracing::info!("Retrying last input");
        Some(self.execute(&input).await)
    }

    /// 取消正在进行的执行；空闲时为 no-op
    pub fn cancel(&self) {
        self.supervisor.cancel();
    }

    pub fn status(&self) -> Status {
        self.status.current()
    }

    pub fn on_status_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Status) + Send + Sync + 'static,
    {
        self.status.subscribe(callback)
    }

    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.watch()
    }

    /// 命令通过 ExecutionContext::emit 发出的事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<CommandEvent> {
        self.events.subscribe()
    }

    pub fn last_input(&self) -> Option<String> {
        self.memory.lock().last_input.clone()
    }

    pub fn last_error(&self) -> Option<OrchestratorError> {
        self.memory.lock().last_error.clone()
    }

    pub fn clear_last_error(&self) {
        self.memory.lock().last_error = None;
    }

    pub fn catalog(&self) -> &Arc<CommandCatalog<T>> {
        &self.catalog
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// 取消进行中的执行并移除全部订阅者；之后的 execute 返回 Disposed 失败
    pub fn dispose(&self) {
        tracing::info!("Orchestrator disposed");
        self.supervisor.dispose();
        self.status.dispose();
    }

    async fn run(&self, input: &str, token: &CancellationToken) -> ExecutionResult {
        {
            let mut memory = self.memory.lock();
            memory.last_input = Some(input.to_string());
            memory.last_error = None;
        }
        tracing::info!(chars = input.chars().count(), "Processing input");
        self.status
            .publish(Status::new(StatusStage::Submitted).with_message(input));

        let request = ProviderRequest {
            messages: vec![
                Message::system(build_system_prompt(&self.system_prompt, &self.catalog)),
                Message::user(input),
            ],
            tools: self.catalog.to_tool_declarations(),
            options: self.options.clone(),
        };

        self.status.publish(Status::new(StatusStage::Streaming));
        let stream = StreamBuffer::new(&self.status);

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            r = self.provider.generate_streaming(&request, &stream) => Some(r),
        };

        let response = match outcome {
            None => return self.finish_cancelled(),
            Some(Err(e)) => {
                let err = OrchestratorError::ProviderFailure(e);
                tracing::error!(provider = self.provider.name(), "{}", err);
                self.memory.lock().last_error = Some(err.clone());
                self.status.publish(
                    Status::new(StatusStage::Error)
                        .with_message(err.to_string())
                        .with_error(err.to_string()),
                );
                return ExecutionResult::failed(err.to_string(), err.to_string());
            }
            Some(Ok(response)) => response,
        };

        let mut done = Status::new(StatusStage::Streaming).with_streamed_text(response.text.clone());
        if !response.tool_calls.is_empty() {
            done = done.with_tool_calls(response.tool_calls.clone());
        }
        self.status.publish(done);

        if response.tool_calls.is_empty() {
            self.status
                .publish(Status::new(StatusStage::Ready).with_message(response.text.clone()));
            return ExecutionResult::text(response.text);
        }

        let calls = response.tool_calls;
        let results = self.run_tool_calls(&calls, token).await;
        let result = ExecutionResult::aggregate(calls, results);
        tracing::info!(success = result.success, "Execution finished");
        self.status
            .publish(Status::new(StatusStage::Ready).with_message(result.message.clone()));
        result
    }

    /// 按请求顺序执行工具调用，每个调用恰好产生一个结果
    async fn run_tool_calls(&self, calls: &[ToolCall], token: &CancellationToken) -> Vec<CommandResult> {
        self.status
            .publish(Status::new(StatusStage::Executing).with_tool_calls(calls.to_vec()));

        let total = calls.len();
        let mut results = Vec::with_capacity(total);
        let mut stopped = false;

        for (i, call) in calls.iter().enumerate() {
            if stopped {
                results.push(CommandResult::failure(
                    FailureKind::Skipped,
                    format!("Skipped '{}' after an earlier failure", call.name),
                ));
                continue;
            }

            self.status.publish(
                Status::new(StatusStage::Executing)
                    .with_message(format!("Running {} ({}/{})", call.name, i + 1, total))
                    .with_tool_calls(calls.to_vec()),
            );

            let status = self.status.clone();
            let ctx = ExecutionContext::new(call.id.clone(), call.name.clone(), token.child_token())
                .with_events(self.events.clone())
                .with_progress(move |message: &str| {
                    status.publish(Status::new(StatusStage::Executing).with_message(message));
                });

            let result = self.executor.execute(self.target.clone(), call, ctx).await;
            if !result.success
                && result.failure != Some(FailureKind::Cancelled)
                && self.failure_policy == FailurePolicy::StopOnFirstFailure
            {
                stopped = true;
            }
            results.push(result);
        }
        results
    }

    fn finish_cancelled(&self) -> ExecutionResult {
        let err = OrchestratorError::Cancelled;
        tracing::info!("Provider request cancelled");
        self.status
            .publish(Status::new(StatusStage::Ready).with_message(err.to_string()));
        ExecutionResult::failed(err.to_string(), err.to_string())
    }
}

/// 把流式片段累积为 Streaming 快照；重试时清空
struct StreamBuffer<'a> {
    status: &'a StatusBroadcaster,
    text: Mutex<String>,
}

impl<'a> StreamBuffer<'a> {
    fn new(status: &'a StatusBroadcaster) -> Self {
        Self {
            status,
            text: Mutex::new(String::new()),
        }
    }
}

impl TextSink for StreamBuffer<'_> {
    fn text(&self, delta: &str) {
        let text = {
            let mut buf = self.text.lock();
            buf.push_str(delta);
            buf.clone()
        };
        self.status
            .publish(Status::new(StatusStage::Streaming).with_streamed_text(text));
    }

    fn restart(&self) {
        let had_text = {
            let mut buf = self.text.lock();
            let had_text = !buf.is_empty();
            buf.clear();
            had_text
        };
        if had_text {
            self.status
                .publish(Status::new(StatusStage::Streaming).with_message("Retrying"));
        }
    }
}

pub struct OrchestratorBuilder<T> {
    catalog: Arc<CommandCatalog<T>>,
    provider: Arc<dyn LlmProvider>,
    target: Arc<T>,
    system_prompt: String,
    failure_policy: FailurePolicy,
    handler_timeout: Option<Duration>,
    options: GenerationOptions,
}

impl<T: Send + Sync + 'static> OrchestratorBuilder<T> {
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// None 表示命令不设超时
    pub fn handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn generation_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// 应用配置中的提示词、失败策略、命令超时与生成参数
    pub fn from_config(self, cfg: &AppConfig) -> Self {
        self.system_prompt(cfg.app.resolved_system_prompt())
            .failure_policy(cfg.orchestrator.failure_policy)
            .handler_timeout(cfg.commands.handler_timeout())
            .generation_options(GenerationOptions {
                model: cfg.llm.model.clone(),
                temperature: cfg.llm.temperature,
                max_tokens: cfg.llm.max_tokens,
            })
    }

    pub fn build(self) -> Orchestrator<T> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Orchestrator {
            executor: CommandExecutor::new(self.catalog.clone(), self.handler_timeout),
            catalog: self.catalog,
            provider: self.provider,
            target: self.target,
            system_prompt: self.system_prompt,
            options: self.options,
            failure_policy: self.failure_policy,
            status: StatusBroadcaster::new(),
            supervisor: SessionSupervisor::new(),
            memory: Mutex::new(RetryMemory::default()),
            run_lock: tokio::sync::Mutex::new(()),
            events,
        }
    }
}
