//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别 info，可用 RUST_LOG 覆盖；重复调用（测试、嵌入方）不会 panic。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
