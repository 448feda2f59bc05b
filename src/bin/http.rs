//! hndl HTTP 服务
//!
//! 把 Router 暴露为 JSON API，供 UI 或其他进程调用。
//!
//! 环境变量:
//! - HNDL_HTTP_ADDR: 监听地址（默认 127.0.0.1:3000）
//! - HNDL__*: 覆盖配置项（见 config/default.toml）
//!
//! 启动: cargo run --bin hndl-http --features http -- [config.toml]

#[cfg(feature = "http")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::Arc;

    use anyhow::Context;
    use hndl::api::create_router;
    use hndl::config::load_config;
    use hndl::Router;

    hndl::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let router = Arc::new(
        Router::from_config(&cfg)
            .await
            .context("Invalid configuration")?,
    );

    let addr: SocketAddr = std::env::var("HNDL_HTTP_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .context("Invalid HNDL_HTTP_ADDR")?;

    let app = create_router(Arc::clone(&router));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("hndl HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    router.log().flush().await;
    Ok(())
}

#[cfg(not(feature = "http"))]
fn main() {
    eprintln!("请使用 --features http 编译: cargo run --bin hndl-http --features http");
    std::process::exit(1);
}
