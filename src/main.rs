//! hndl - 交互式命令行
//!
//! 从 stdin 逐行读取自然语言指令，分类并调度到 Worker，打印结果。
//!
//! 内置命令：
//! - `:history [N]`  最近 N 条执行记录
//! - `:stats`        分类统计
//! - `:health`       检查所有 Worker
//! - `:similar TEXT` 查找相似的历史成功记录
//! - `:deep TEXT`    跳过规则，直接用 LLM 分类
//! - `:reload`       重新读取配置并重建 Router
//! - `:quit`
//!
//! 调度进行中按 Ctrl+C 取消当前指令；空闲时按 Ctrl+C 退出。
//!
//! 启动: cargo run -- [config.toml]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use hndl::config::{load_config, reload_config};
use hndl::{Response, Router};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hndl::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path.clone()).context("Failed to load config")?;
    let mut router = Arc::new(
        Router::from_config(&cfg)
            .await
            .context("Invalid configuration")?,
    );
    print_banner(&router);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt().await;
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == ":reload" {
            // 先落盘，新 Router 会从同一文件恢复历史
            router.log().flush().await;
            match rebuild(config_path.clone()).await {
                Ok(fresh) => {
                    router = Arc::new(fresh);
                    print_banner(&router);
                }
                Err(e) => println!("reload failed, keeping current configuration: {e:#}"),
            }
            continue;
        }

        if let Some(meta) = line.strip_prefix(':') {
            if !run_meta(&router, meta).await {
                break;
            }
            continue;
        }

        if let Some(similar) = router.find_similar(line) {
            println!("(similar to earlier: \"{}\")", similar.input);
        }
        let response = run_cancellable(&router, line, false).await;
        print_response(&response);
    }

    router.log().flush().await;
    println!("bye");
    Ok(())
}

async fn rebuild(config_path: Option<PathBuf>) -> anyhow::Result<Router> {
    let cfg = reload_config(config_path).context("Failed to reload config")?;
    Router::from_config(&cfg).await.context("Invalid configuration")
}

fn print_banner(router: &Router) {
    let agents: Vec<String> = router.agents().iter().map(|a| a.to_string()).collect();
    let fallback = if router.classifier().has_fallback() {
        "on"
    } else {
        "off"
    };
    println!(
        "hndl ready. Agents: {}. LLM fallback: {}. Type :quit to exit.",
        agents.join(", "),
        fallback
    );
}

async fn prompt() {
    let mut out = tokio::io::stdout();
    let _ = out.write_all(b"> ").await;
    let _ = out.flush().await;
}

/// 在后台调度，Ctrl+C 时取消并等待 Cancelled 响应
async fn run_cancellable(router: &Arc<Router>, text: &str, deep: bool) -> Response {
    let cancel = CancellationToken::new();
    let mut task = {
        let router = Arc::clone(router);
        let cancel = cancel.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            if deep {
                router.process_deep(&text, &cancel).await
            } else {
                router.process_with_cancel(&text, &cancel).await
            }
        })
    };
    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            task.await
        }
    };
    joined.unwrap_or_else(|e| {
        tracing::error!("Dispatch task failed: {}", e);
        Response::failed(
            "",
            hndl::ErrorKind::WorkerFailure,
            e.to_string(),
            None,
            std::time::Duration::ZERO,
        )
    })
}

fn print_response(response: &Response) {
    match (&response.result, response.user_message()) {
        (Some(serde_json::Value::String(s)), _) => println!("{s}"),
        (Some(value), _) => println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        ),
        (None, Some(message)) => println!("{message}"),
        (None, None) => println!("(cancelled)"),
    }
}

/// 处理 `:` 开头的内置命令；返回 false 表示退出
async fn run_meta(router: &Arc<Router>, meta: &str) -> bool {
    let (name, arg) = match meta.split_once(char::is_whitespace) {
        Some((n, a)) => (n, a.trim()),
        None => (meta, ""),
    };

    match name {
        "quit" | "exit" | "q" => return false,
        "history" => {
            let limit = arg.parse().unwrap_or(10);
            for record in router.history(limit) {
                let when = chrono::DateTime::from_timestamp_millis(record.timestamp)
                    .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
                    .unwrap_or_default();
                let outcome = record
                    .response
                    .error_kind()
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "ok".to_string());
                let agent = record
                    .command
                    .agent
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{when}  {agent}/{}  {outcome}  {}ms  \"{}\"",
                    record.command.action,
                    record.response.elapsed.as_millis(),
                    record.input
                );
            }
        }
        "stats" => {
            let stats = router.stats();
            println!(
                "pattern hits: {}, fallback hits: {}, clarifications: {}, log entries: {}",
                stats.pattern_hits,
                stats.fallback_hits,
                stats.clarifications,
                router.log().len()
            );
        }
        "health" => {
            for status in router.health_check_all().await {
                match (status.healthy, status.latency_ms, status.error) {
                    (true, Some(ms), _) => println!("{}: ok ({ms}ms)", status.agent),
                    (_, _, Some(err)) => println!("{}: down ({err})", status.agent),
                    _ => println!("{}: down", status.agent),
                }
            }
        }
        "similar" if !arg.is_empty() => match router.find_similar(arg) {
            Some(record) => println!(
                "\"{}\" → {}/{}",
                record.input,
                record
                    .command
                    .agent
                    .map(|a| a.to_string())
                    .unwrap_or_default(),
                record.command.action
            ),
            None => println!("no similar successful command"),
        },
        "deep" if !arg.is_empty() => {
            let response = run_cancellable(router, arg, true).await;
            print_response(&response);
        }
        _ => println!("unknown command :{meta}"),
    }
    true
}
