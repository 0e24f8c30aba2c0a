//! # cdp-probe
//!
//! 连接到 Chrome DevTools Protocol 端点，发送一条命令并打印结果，可选地持续输出事件。
//!
//! ## 用法
//! ```text
//! cdp-probe [--config <file>] [--follow <event>]... [METHOD [JSON_PARAMS]]
//! ```
//! 未指定方法时发送 `Browser.getVersion`。
//!
//! ## 环境变量
//! - `CHASER_CDP_ENDPOINT`: CDP 端点（默认: ws://localhost:9222）
//! - `CHASER_CDP_TIMEOUT`: 默认命令超时秒数（0 表示不超时）
//! - `CHASER_LOG_LEVEL`: 日志级别（`RUST_LOG` 优先）

use anyhow::Context;
use chaser_cdp::{cdp::CdpSession, config::Config};
use clap::Parser;
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// cdp-probe 命令行参数
#[derive(Debug, Parser)]
#[command(name = "cdp-probe")]
#[command(about = "Send one Chrome DevTools Protocol command and print the result")]
#[command(version)]
struct Args {
    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Event to print after the command completes (repeatable)
    #[arg(short, long, value_name = "EVENT")]
    follow: Vec<String>,

    /// CDP method to send
    #[arg(default_value = "Browser.getVersion")]
    method: String,

    /// Command parameters as a JSON object
    #[arg(value_name = "JSON_PARAMS")]
    params: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("cdp-probe v{}", chaser_cdp::VERSION);

    let method = args.method.as_str();
    let params: Value = match &args.params {
        Some(json) => serde_json::from_str(json).context("Params must be valid JSON")?,
        None => Value::Object(Default::default()),
    };

    let session = CdpSession::connect(&config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.endpoint))?;

    // Subscribe before sending so events triggered by the command are not missed
    let follow = futures::stream::select_all(args.follow.iter().map(|name| session.subscribe(name)));

    let result = session.send_command(method, params).await;
    match result {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(e) => {
            session.close().await.ok();
            return Err(e).with_context(|| format!("{} failed", method));
        }
    }

    if !args.follow.is_empty() {
        info!("Following {} (Ctrl-C to stop)", args.follow.join(", "));
        let mut follow = follow;

        loop {
            tokio::select! {
                event = follow.next() => match event {
                    Some(event) => println!("{}", serde_json::to_string(&event)?),
                    None => {
                        warn!("Session ended");
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C signal");
                    break;
                }
            }
        }
    }

    session.close().await?;
    info!("Session closed");
    Ok(())
}
