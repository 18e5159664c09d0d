//! 命令目录
//!
//! 按名称存储 `Arc<dyn RegisteredCommand<T>>`，保持插入顺序；名称唯一，重复注册返回
//! DuplicateCommand 且不修改已有条目。内部使用读写锁，查找只克隆 Arc，不跨 await 持锁。

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::commands::command::Typed;
use crate::commands::{
    Command, CommandResult, ExecutionContext, FnCommand, RegisteredCommand,
};
use crate::core::OrchestratorError;
use crate::llm::ToolDeclaration;

pub struct CommandCatalog<T> {
    entries: RwLock<Vec<Arc<dyn RegisteredCommand<T>>>>,
}

impl<T> Default for CommandCatalog<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Send + Sync + 'static> CommandCatalog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册强类型命令
    pub fn register<C>(&self, command: C) -> Result<(), OrchestratorError>
    where
        C: Command<T>,
    {
        self.register_dyn(Arc::new(Typed::new::<T>(command)))
    }

    /// 注册闭包命令
    pub fn register_fn<A, F, Fut>(&self, command: FnCommand<T, A, F>) -> Result<(), OrchestratorError>
    where
        A: serde::de::DeserializeOwned + schemars::JsonSchema + Send + 'static,
        F: Fn(Arc<T>, A, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<CommandResult>> + Send + 'static,
    {
        self.register_dyn(Arc::new(command))
    }

    /// 注册已擦除的命令；名称已存在时失败且不修改目录
    pub fn register_dyn(&self, command: Arc<dyn RegisteredCommand<T>>) -> Result<(), OrchestratorError> {
        let mut entries = self.entries.write();
        if entries.iter().any(|c| c.name() == command.name()) {
            return Err(OrchestratorError::DuplicateCommand(command.name().to_string()));
        }
        tracing::debug!(command = command.name(), "Command registered");
        entries.push(command);
        Ok(())
    }
}

impl<T> CommandCatalog<T> {
    pub fn get(&self, name: &str) -> Option<Arc<dyn RegisteredCommand<T>>> {
        self.entries.read().iter().find(|c| c.name() == name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.read().iter().any(|c| c.name() == name)
    }

    /// 全部命令（插入顺序）
    pub fn get_all(&self) -> Vec<Arc<dyn RegisteredCommand<T>>> {
        self.entries.read().clone()
    }

    pub fn get_names(&self) -> Vec<String> {
        self.entries.read().iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// 移除命令；不存在时为 no-op，返回是否移除
    pub fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|c| c.name() != name);
        before != entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// 投影为 Provider 请求中的工具声明（name + description + schema）
    pub fn to_tool_declarations(&self) -> Vec<ToolDeclaration> {
        self.entries
            .read()
            .iter()
            .map(|c| ToolDeclaration {
                name: c.name().to_string(),
                description: c.description().to_string(),
                parameters: c.parameters_schema(),
            })
            .collect()
    }

    /// 生成 prompt 中的命令段落：每个命令一行描述，附带示例
    pub fn describe_for_prompt(&self) -> String {
        let entries = self.entries.read();
        if entries.is_empty() {
            return "No commands are available.".to_string();
        }
        let mut lines = vec!["Available commands:".to_string()];
        for c in entries.iter() {
            lines.push(format!("- {}: {}", c.name(), c.description()));
            for ex in c.examples() {
                let args = serde_json::to_string(&ex.arguments)
                    .unwrap_or_else(|_| Value::Null.to_string());
                lines.push(format!("  e.g. \"{}\" -> {}({})", ex.input, c.name(), args));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::NoArgs;
    use serde::Deserialize;
    use serde_json::json;

    fn noop(name: &str, description: &str) -> Arc<dyn RegisteredCommand<()>> {
        Arc::new(FnCommand::new(
            name,
            description,
            |_t: Arc<()>, _a: NoArgs, _c: ExecutionContext| async { Ok(CommandResult::ok("ok")) },
        ))
    }

    #[test]
    fn test_duplicate_register_keeps_original() {
        let catalog = CommandCatalog::<()>::new();
        catalog.register_dyn(noop("first", "original")).unwrap();

        let err = catalog.register_dyn(noop("first", "replacement")).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateCommand(ref n) if n == "first"));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("first").unwrap().description(), "original");
    }

    #[test]
    fn test_lookup_unregister_and_clear() {
        let catalog = CommandCatalog::<()>::new();
        catalog.register_dyn(noop("a", "A")).unwrap();
        catalog.register_dyn(noop("b", "B")).unwrap();

        assert!(catalog.has("a"));
        assert!(catalog.get("missing").is_none());
        assert_eq!(catalog.get_names(), vec!["a", "b"]);
        assert_eq!(catalog.get_all().len(), 2);

        assert!(catalog.unregister("a"));
        assert!(!catalog.unregister("a"));
        assert!(!catalog.has("a"));

        catalog.clear();
        assert!(catalog.is_empty());
        catalog.clear();
    }

    #[derive(Deserialize, schemars::JsonSchema)]
    #[allow(dead_code)]
    struct Move {
        id: String,
        x: f64,
    }

    #[test]
    fn test_tool_declarations_carry_schema_and_prompt_has_examples() {
        let catalog = CommandCatalog::<()>::new();
        catalog
            .register_fn(
                FnCommand::new("move_node", "Move a node", |_t: Arc<()>, _a: Move, _c| async {
                    Ok(CommandResult::ok("moved"))
                })
                .with_example("move a to 10", json!({"id": "a", "x": 10})),
            )
            .unwrap();
        catalog.register_dyn(noop("reset", "Reset everything")).unwrap();

        let decls = catalog.to_tool_declarations();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].name, "move_node");
        assert_eq!(decls[0].parameters["properties"]["x"]["type"], "number");

        let prompt = catalog.describe_for_prompt();
        assert!(prompt.contains("- move_node: Move a node"));
        assert!(prompt.contains("\"move a to 10\" -> move_node({\"id\":\"a\",\"x\":10})"));
        assert!(prompt.contains("- reset: Reset everything"));
    }
}
