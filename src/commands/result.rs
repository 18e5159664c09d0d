//! 命令执行结果

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 失败原因分类（成功时为 None）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 工具调用指向未注册的命令
    UnknownCommand,
    /// 参数未通过 schema 校验
    Validation,
    /// 处理函数返回失败、报错或 panic
    Handler,
    /// 处理函数超时
    Timeout,
    /// 执行前或执行中被取消
    Cancelled,
    /// 因 StopOnFirstFailure 策略被跳过
    Skipped,
}

/// 单次命令执行的结果；不会越过执行器边界抛出
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_nodes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_edges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            affected_nodes: Vec::new(),
            affected_edges: Vec::new(),
            failure: None,
        }
    }

    /// 处理函数主动报告的失败
    pub fn fail(message: impl Into<String>) -> Self {
        Self::failure(FailureKind::Handler, message)
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            affected_nodes: Vec::new(),
            affected_edges: Vec::new(),
            failure: Some(kind),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_nodes<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_nodes.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_edges<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_edges.extend(ids.into_iter().map(Into::into));
        self
    }

    /// 处理函数返回 success=false 但未标注原因时补成 Handler
    pub(crate) fn normalized(mut self) -> Self {
        if !self.success && self.failure.is_none() {
            self.failure = Some(FailureKind::Handler);
        }
        if self.success {
            self.failure = None;
        }
        self
    }
}
