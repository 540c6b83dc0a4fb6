/// Live Relay - Server
///
/// 在客户端与 Gemini Live 上游之间转发 WebSocket 帧，隐藏 API Key

mod app_state;
mod config;
mod metrics;
mod upstream;
mod ws;

use axum::{extract::State, routing::get, Json, Router};
use common::models::constants::LIVE_PATH;
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use crate::app_state::AppState;
use crate::ws::SessionEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenvy::dotenv().ok();

    // 加载配置
    let cfg = config::Config::from_env()?;

    // 初始化日志
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_level))
        )
        .init();

    info!("🚀 启动 Live Relay...");

    // 上游为 wss，需要 rustls 加密实现
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls 加密实现已安装，跳过");
    }

    info!("✅ 配置加载成功: {:?}", cfg);

    // 会话生命周期事件写入审计日志
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(log_session_events(event_rx));

    let app_state = AppState::new(cfg.clone()).with_session_events(event_tx);
    info!(
        "✅ 上游候选 {} 个，首选模型 {}",
        app_state.planner.candidates().len(),
        app_state.planner.preferred_model()
    );

    let app = app_router(app_state);

    // 启动服务器
    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🎯 服务器监听在 ws://{}{}", listener.local_addr()?, LIVE_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 服务器已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("监听退出信号失败: {}", e);
        std::future::pending::<()>().await;
    }
    info!("收到退出信号，停止接受新连接");
}

/// 按会话输出生命周期审计日志
async fn log_session_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Bridging { session_id, upstream, resolved_model, use_snake_case } => {
                info!(
                    target: "relay::audit",
                    "🔗 bridging session={} upstream={} model={} snake_case={}",
                    session_id, upstream, resolved_model, use_snake_case
                );
            }
            SessionEvent::Rejected { session_id, attempted } => {
                warn!(target: "relay::audit", "⛔ rejected session={} attempted={}", session_id, attempted);
            }
            SessionEvent::Closed { session_id, outcome } => {
                info!(target: "relay::audit", "🔚 closed session={} outcome={:?}", session_id, outcome);
            }
        }
    }
}

/// 构建应用路由
pub(crate) fn app_router(state: AppState) -> Router {
    // 设置CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .route(LIVE_PATH, get(ws::handle_live_websocket))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "Live Relay v1"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    active_sessions: i64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.planner.preferred_model().to_string(),
        active_sessions: metrics::SESSIONS_ACTIVE.get(),
    })
}
