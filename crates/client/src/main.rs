/// Live Relay - Client
///
/// 交互式命令行客户端：从标准输入读取文本发送给模型，打印模型回复

use client::config::Config;
use client::{ClientEvent, ClientOptions, ConnectionState, LiveClient, StaticEndpoint};
use common::frame::SetupConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenvy::dotenv().ok();

    // 加载配置
    let cfg = Config::from_env()?;

    // 初始化日志
    // 可以通过环境变量 RUST_LOG 设置日志级别，例如：
    // RUST_LOG=client=debug cargo run --bin live-client
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_level))
        )
        .init();

    info!("🚀 启动 Live Client...");

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls 加密实现已安装，跳过");
    }

    info!("✅ 配置加载成功");

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let client = LiveClient::builder(Arc::new(StaticEndpoint::new(cfg.relay_url.clone())))
        .options(ClientOptions {
            heartbeat_interval: cfg.heartbeat(),
            ..Default::default()
        })
        .events(event_tx)
        .spawn();

    client.setup_gemini(
        &SetupConfig::new(cfg.model.clone()).with_system_instruction(cfg.system_instruction.clone()),
    );
    client.connect();
    info!("🎯 连接到 Relay: {}", cfg.relay_url);
    info!("📌 模型: {}", cfg.model);

    let cancel = CancellationToken::new();
    let printer = tokio::spawn(print_events(event_rx, cancel.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    break;
                }
                if let Some(path) = line.strip_prefix("/image ") {
                    send_image(&client, path.trim()).await;
                    continue;
                }
                client.send_text(line);
            }
        }
    }

    client.disconnect();
    let mut status = client.watch();
    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|s| matches!(s.state, ConnectionState::Disconnected | ConnectionState::Failed)),
    )
    .await;

    cancel.cancel();
    let _ = printer.await;
    info!("👋 已退出");

    Ok(())
}

/// 打印模型输出
async fn print_events(mut events: mpsc::UnboundedReceiver<ClientEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            ClientEvent::Text(text) => println!("🤖 {}", text),
            ClientEvent::FunctionCall(call) => println!("🔧 {}({})", call.name, call.args),
            ClientEvent::Interrupted => println!("⏹️ (interrupted)"),
            ClientEvent::RelayError { error, message } => {
                eprintln!("⚠️ {} {}", error, message.unwrap_or_default());
            }
            ClientEvent::Fatal { code, reason } => eprintln!("❌ 连接被拒绝 ({}): {}", code, reason),
            ClientEvent::StateChanged(ConnectionState::Failed) => {
                eprintln!("❌ 无法连接 Relay，退出");
                cancel.cancel();
            }
            ClientEvent::StateChanged(state) => info!("连接状态: {}", state),
            ClientEvent::SetupComplete | ClientEvent::TurnComplete => {}
        }
    }
}

/// `/image <path>`：把图片作为画布更新发送
async fn send_image(client: &LiveClient, path: &str) {
    let mime_type = match Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => {
            warn!("不支持的图片格式: {}", path);
            return;
        }
    };

    match tokio::fs::read(path).await {
        Ok(bytes) => client.send_canvas_update(mime_type, &bytes, Some("这是我现在的画布")),
        Err(e) => error!("读取图片失败: {}: {}", path, e),
    }
}
