//! 状态定义：对外广播的 Status 快照与 ExecutionResult
//!
//! Status 只由编排器生成，每次变化都是新的快照；订阅者只读。

use serde::Serialize;
use serde_json::Value;

use crate::commands::CommandResult;
use crate::llm::ToolCall;

/// 编排器阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StatusStage {
    Ready,
    Submitted,
    Streaming,
    Executing,
    Error,
}

/// 状态快照
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Status {
    pub stage: StatusStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streamed_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for Status {
    fn default() -> Self {
        Self::new(StatusStage::Ready)
    }
}

impl Status {
    pub fn new(stage: StatusStage) -> Self {
        Self {
            stage,
            message: None,
            tool_calls: None,
            streamed_text: None,
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(calls);
        self
    }

    pub fn with_streamed_text(mut self, text: impl Into<String>) -> Self {
        self.streamed_text = Some(text.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// 一次 execute 返回给调用方的结果；execute 从不返回 Err
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 每个工具调用的结果（请求顺序）
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<CommandResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub affected_nodes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub affected_edges: Vec<String>,
}

impl ExecutionResult {
    pub(crate) fn text(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            tool_calls: None,
            error: None,
            results: Vec::new(),
            affected_nodes: Vec::new(),
            affected_edges: Vec::new(),
        }
    }

    pub(crate) fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::text(message)
        }
    }

    /// 汇总多个命令结果：全部成功才算成功；单个结果时原样透传 data / affected_*
    pub(crate) fn aggregate(tool_calls: Vec<ToolCall>, results: Vec<CommandResult>) -> Self {
        let success = results.iter().all(|r| r.success);

        let (message, data, affected_nodes, affected_edges) = match results.as_slice() {
            [single] => (
                single.message.clone(),
                single.data.clone(),
                single.affected_nodes.clone(),
                single.affected_edges.clone(),
            ),
            many => {
                let failures: Vec<&str> = many
                    .iter()
                    .filter(|r| !r.success)
                    .map(|r| r.message.as_str())
                    .collect();
                let message = if failures.is_empty() {
                    many.iter()
                        .map(|r| r.message.as_str())
                        .filter(|m| !m.is_empty())
                        .collect::<Vec<_>>()
                        .join("\n")
                } else {
                    format!(
                        "{} of {} commands failed: {}",
                        failures.len(),
                        many.len(),
                        failures.join("; ")
                    )
                };
                let payloads: Vec<Value> = many.iter().filter_map(|r| r.data.clone()).collect();
                let data = (!payloads.is_empty()).then_some(Value::Array(payloads));
                (
                    message,
                    data,
                    merge_ids(many.iter().map(|r| r.affected_nodes.as_slice())),
                    merge_ids(many.iter().map(|r| r.affected_edges.as_slice())),
                )
            }
        };

        let error = (!success).then(|| {
            results
                .iter()
                .find(|r| !r.success)
                .map(|r| r.message.clone())
                .unwrap_or_default()
        });

        Self {
            success,
            message,
            data,
            tool_calls: Some(tool_calls),
            error,
            results,
            affected_nodes,
            affected_edges,
        }
    }
}

/// 按出现顺序合并并去重
fn merge_ids<'a>(lists: impl Iterator<Item = &'a [String]>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in lists.flatten() {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}
