//! Steer 命令行入口
//!
//! 初始化日志、加载配置、选择 Provider、注册演示命令，然后逐行读取标准输入交给编排器。
//! 元命令：/retry 重新执行上一次输入，/status 查看当前状态，/quit 退出。

use std::sync::Arc;

use anyhow::Context;
use steer::config::{load_config, AppConfig};
use steer::core::{Orchestrator, Status, StatusStage};
use steer::demo::{register_demo_commands, Scene};
use steer::llm::create_provider_from_config;
use steer::{observability, CommandCatalog, ExecutionResult};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let catalog = Arc::new(CommandCatalog::<Scene>::new());
    register_demo_commands(&catalog).context("Failed to register demo commands")?;
    let scene = Arc::new(Scene::new());
    let provider = create_provider_from_config(&cfg);

    let orchestrator = Orchestrator::builder(catalog, provider, scene)
        .from_config(&cfg)
        .build();
    let _sub = orchestrator.on_status_change(print_status);

    println!(
        "{} ready. Commands: {}. Type /quit to exit.",
        cfg.app.name,
        orchestrator.catalog().get_names().join(", ")
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/status" => println!("{}", serde_json::to_string_pretty(&orchestrator.status())?),
            "/retry" => match orchestrator.retry_last().await {
                Some(result) => print_result(&result),
                None => println!("Nothing to retry"),
            },
            _ => {
                let result = orchestrator.execute(input).await;
                print_result(&result);
            }
        }
    }

    orchestrator.dispose();
    Ok(())
}

fn print_status(status: &Status) {
    match status.stage {
        StatusStage::Streaming if status.streamed_text.is_some() => {}
        StatusStage::Executing => {
            if let Some(message) = &status.message {
                println!("  [executing] {message}");
            }
        }
        StatusStage::Error => {
            println!("  [error] {}", status.error.as_deref().unwrap_or("unknown"));
        }
        stage => tracing::debug!(?stage, "status"),
    }
}

fn print_result(result: &ExecutionResult) {
    let mark = if result.success { "ok" } else { "failed" };
    println!("[{mark}] {}", result.message);
    if !result.affected_nodes.is_empty() {
        println!("  nodes: {}", result.affected_nodes.join(", "));
    }
    if !result.affected_edges.is_empty() {
        println!("  edges: {}", result.affected_edges.join(", "));
    }
    if let Some(data) = &result.data {
        println!("  data: {data}");
    }
}
