//! 命令定义
//!
//! 两种写法：
//! - 实现 `Command<T>`：参数为强类型 `Args`（serde 反序列化即校验，schemars 生成 schema）；
//! - `FnCommand`：名称 + 描述 + 异步闭包，适合测试与小命令。
//!
//! 二者注册时都被擦除为 `RegisteredCommand<T>`。无类型的 JSON 参数只在 `prepare` 中出现一次：
//! 校验通过后得到绑定了类型化参数的 future，处理函数永远看不到原始 JSON。

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commands::{CommandResult, ExecutionContext};
use crate::core::OrchestratorError;

/// 示例：自然语言 -> 期望参数，只用于丰富 prompt，从不执行
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandExample {
    pub input: String,
    pub arguments: Value,
}

impl CommandExample {
    pub fn new(input: impl Into<String>, arguments: Value) -> Self {
        Self {
            input: input.into(),
            arguments,
        }
    }
}

/// 无参数命令的参数类型
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct NoArgs {}

/// 已校验参数的命令执行 future
pub type CommandFuture = BoxFuture<'static, anyhow::Result<CommandResult>>;

/// 强类型命令：target 为被控制的外部系统，编排器从不查看其内部
#[async_trait]
pub trait Command<T>: Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    type Args: DeserializeOwned + JsonSchema + Send + 'static;

    /// 命令名（唯一，对应工具调用中的 name）
    fn name(&self) -> &str;

    /// 命令描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    fn examples(&self) -> Vec<CommandExample> {
        Vec::new()
    }

    /// 执行命令；返回 Err 等同于失败结果，由执行器转换
    async fn execute(
        &self,
        target: &T,
        args: Self::Args,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<CommandResult>;
}

/// 类型擦除后的命令，由 CommandCatalog 持有
pub trait RegisteredCommand<T>: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    fn parameters_schema(&self) -> Value;

    fn examples(&self) -> Vec<CommandExample>;

    /// 校验参数；失败返回 ValidationFailure，成功返回可直接 await 的执行 future
    fn prepare(
        self: Arc<Self>,
        target: Arc<T>,
        args: Value,
        ctx: ExecutionContext,
    ) -> Result<CommandFuture, OrchestratorError>;
}

/// 由参数类型生成 JSON Schema（去掉 $schema 元字段）
pub fn schema_value<A: JsonSchema>() -> Value {
    let root = schema_for!(A);
    let mut value = serde_json::to_value(root)
        .unwrap_or_else(|_| serde_json::json!({ "type": "object", "properties": {} }));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
    }
    value
}

/// 无类型参数 -> 强类型参数；缺省参数视为空对象
pub fn parse_args<A: DeserializeOwned>(command: &str, args: Value) -> Result<A, OrchestratorError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| OrchestratorError::ValidationFailure {
        command: command.to_string(),
        message: e.to_string(),
    })
}

/// `Command<T>` 的擦除包装
pub(crate) struct Typed<C> {
    inner: C,
    schema: Value,
}

impl<C> Typed<C> {
    pub(crate) fn new<T>(inner: C) -> Self
    where
        T: Send + Sync + 'static,
        C: Command<T>,
    {
        Self {
            inner,
            schema: schema_value::<C::Args>(),
        }
    }
}

impl<T, C> RegisteredCommand<T> for Typed<C>
where
    T: Send + Sync + 'static,
    C: Command<T>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn examples(&self) -> Vec<CommandExample> {
        self.inner.examples()
    }

    fn prepare(
        self: Arc<Self>,
        target: Arc<T>,
        args: Value,
        ctx: ExecutionContext,
    ) -> Result<CommandFuture, OrchestratorError> {
        let parsed: C::Args = parse_args(self.inner.name(), args)?;
        Ok(Box::pin(async move {
            self.inner.execute(target.as_ref(), parsed, &ctx).await
        }))
    }
}

/// 闭包命令：`FnCommand::new("sayHello", "Greets someone", |target, args: Hello, ctx| async move { .. })`
pub struct FnCommand<T, A, F> {
    name: String,
    description: String,
    examples: Vec<CommandExample>,
    schema: Value,
    handler: F,
    _marker: PhantomData<fn(T, A)>,
}

impl<T, A, F, Fut> FnCommand<T, A, F>
where
    A: DeserializeOwned + JsonSchema,
    F: Fn(Arc<T>, A, ExecutionContext) -> Fut,
    Fut: Future<Output = anyhow::Result<CommandResult>>,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            examples: Vec::new(),
            schema: schema_value::<A>(),
            handler,
            _marker: PhantomData,
        }
    }
}

impl<T, A, F> FnCommand<T, A, F> {
    pub fn with_example(mut self, input: impl Into<String>, arguments: Value) -> Self {
        self.examples.push(CommandExample::new(input, arguments));
        self
    }
}

impl<T, A, F, Fut> RegisteredCommand<T> for FnCommand<T, A, F>
where
    T: Send + Sync + 'static,
    A: DeserializeOwned + JsonSchema + Send + 'static,
    F: Fn(Arc<T>, A, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CommandResult>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn examples(&self) -> Vec<CommandExample> {
        self.examples.clone()
    }

    fn prepare(
        self: Arc<Self>,
        target: Arc<T>,
        args: Value,
        ctx: ExecutionContext,
    ) -> Result<CommandFuture, OrchestratorError> {
        let parsed: A = parse_args(&self.name, args)?;
        Ok(Box::pin((self.handler)(target, parsed, ctx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Hello {
        name: String,
    }

    struct Greeter;

    #[async_trait]
    impl Command<()> for Greeter {
        type Args = Hello;

        fn name(&self) -> &str {
            "sayHello"
        }

        fn description(&self) -> &str {
            "Greets someone"
        }

        async fn execute(
            &self,
            _target: &(),
            args: Hello,
            _ctx: &ExecutionContext,
        ) -> anyhow::Result<CommandResult> {
            Ok(CommandResult::ok(format!("Hello, {}!", args.name)))
        }
    }

    #[tokio::test]
    async fn test_typed_command_validates_then_runs() {
        let cmd: Arc<dyn RegisteredCommand<()>> = Arc::new(Typed::new::<()>(Greeter));
        assert_eq!(cmd.name(), "sayHello");

        let fut = cmd
            .clone()
            .prepare(Arc::new(()), json!({"name": "World"}), ExecutionContext::detached("sayHello"))
            .unwrap();
        assert_eq!(fut.await.unwrap().message, "Hello, World!");

        let err = cmd
            .prepare(Arc::new(()), json!({"name": 5}), ExecutionContext::detached("sayHello"))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            OrchestratorError::ValidationFailure { ref command, .. } if command == "sayHello"
        ));
        assert!(err.to_string().starts_with("Invalid arguments for 'sayHello':"));
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = schema_value::<Hello>();
        assert!(schema.get("$schema").is_none());
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["name"]));
        assert_eq!(schema["properties"]["name"]["type"], "string");
    }

    #[tokio::test]
    async fn test_fn_command_with_missing_arguments_uses_empty_object() {
        let cmd = Arc::new(
            FnCommand::new("noop", "Does nothing", |_t: Arc<()>, _a: NoArgs, _c| async {
                Ok(CommandResult::ok("done"))
            })
            .with_example("do nothing", json!({})),
        );
        assert_eq!(cmd.examples().len(), 1);
        let fut = cmd
            .prepare(Arc::new(()), Value::Null, ExecutionContext::detached("noop"))
            .unwrap();
        assert!(fut.await.unwrap().success);
    }
}
