//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STEER__*` 覆盖（双下划线表示嵌套，如 `STEER__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::FailurePolicy;

/// 未配置时的基础系统提示词
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a command assistant. \
Translate the user's request into calls to the available tools. \
Only call tools that are listed; answer in plain text when no tool applies.";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub commands: CommandsSection,
    pub orchestrator: OrchestratorSection,
}

/// [app] 段：名称与系统提示词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub system_prompt: String,
    /// 若设置且可读，覆盖 system_prompt
    pub system_prompt_file: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "steer".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            system_prompt_file: None,
        }
    }
}

impl AppSection {
    /// 文件提示词优先，读不到时回退到内联值
    pub fn resolved_system_prompt(&self) -> String {
        self.system_prompt_file
            .as_ref()
            .and_then(|p| match std::fs::read_to_string(p) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Cannot read system prompt file {}: {}", p.display(), e);
                    None
                }
            })
            .unwrap_or_else(|| self.system_prompt.clone())
    }
}

/// [llm] 段：后端选择、生成参数、重试与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock；无对应 Key 时回退 mock
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// 瞬时错误重试次数，0 表示不重试
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
            max_retries: 0,
            retry_base_delay_ms: 500,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [commands] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandsSection {
    /// 单次命令处理超时（秒），0 表示不限；到期后取消该命令的令牌并等待其自行返回
    pub handler_timeout_secs: u64,
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            handler_timeout_secs: 0,
        }
    }
}

impl CommandsSection {
    pub fn handler_timeout(&self) -> Option<Duration> {
        (self.handler_timeout_secs > 0).then(|| Duration::from_secs(self.handler_timeout_secs))
    }
}

/// [orchestrator] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 多个工具调用中有失败时：continue_all（默认）/ stop_on_first_failure
    pub failure_policy: FailurePolicy,
}

/// 从 config 目录加载配置，环境变量 STEER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 STEER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignoring", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STEER")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
