//! 命令层：命令定义、目录、执行上下文、结果与执行器

pub mod catalog;
pub mod command;
pub mod context;
pub mod executor;
pub mod result;

pub use catalog::CommandCatalog;
pub use command::{
    parse_args, schema_value, Command, CommandExample, CommandFuture, FnCommand, NoArgs,
    RegisteredCommand,
};
pub use context::{CommandEvent, ExecutionContext};
pub use executor::CommandExecutor;
pub use result::{CommandResult, FailureKind};
