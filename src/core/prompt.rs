//! 系统提示词组装：基础提示词 + 命令目录描述

use crate::commands::CommandCatalog;

pub fn build_system_prompt<T>(base: &str, catalog: &CommandCatalog<T>) -> String {
    let base = base.trim();
    let commands = catalog.describe_for_prompt();
    if base.is_empty() {
        commands
    } else {
        format!("{base}\n\n{commands}")
    }
}
