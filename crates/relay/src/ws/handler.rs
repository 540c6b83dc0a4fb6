/// Live WebSocket 连接处理器
///
/// 每个客户端连接独立运行：选择上游 -> 桥接 -> 关闭；选择失败时拒绝客户端。

use super::bridge::{BridgePhase, BridgeSession, SessionEvent};
use crate::app_state::AppState;
use crate::metrics;
use crate::upstream::SelectionError;
use axum::extract::ws::{CloseFrame, Message as AxumWsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use common::frame::close::{reason, CloseCode, NoUpstreamPayload};
use common::utils::{generate_id, redact_key};
use tracing::{debug, error, info, warn};

/// WebSocket 升级处理器
pub async fn handle_live_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_live_connection(socket, state))
}

/// 会话阶段跟踪
struct Lifecycle {
    session_id: String,
    phase: BridgePhase,
}

impl Lifecycle {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            phase: BridgePhase::Selecting,
        }
    }

    fn transition(&mut self, next: BridgePhase) {
        debug!("会话状态变更: session={}, {:?} -> {:?}", self.session_id, self.phase, next);
        self.phase = next;
    }
}

/// 处理 Live WebSocket 连接
async fn handle_live_connection(mut socket: WebSocket, state: AppState) {
    let session_id = generate_id();
    let mut lifecycle = Lifecycle::new(session_id.clone());
    info!("新的客户端连接: session={}", session_id);

    let candidates = state.planner.candidates();
    let selection = state
        .selector()
        .select(&candidates, state.planner.preferred_model())
        .await;

    match selection {
        Ok(selected) => {
            lifecycle.transition(BridgePhase::Bridging);
            metrics::SESSIONS_TOTAL.with_label_values(&["bridged"]).inc();
            metrics::SESSIONS_ACTIVE.inc();

            let use_snake_case = selected.use_snake_case();
            info!(
                "会话开始桥接: session={}, candidate={}, model={}, snake_case={}",
                session_id, selected.index, selected.resolved_model, use_snake_case
            );
            state.publish(SessionEvent::Bridging {
                session_id: session_id.clone(),
                upstream: redact_key(&selected.candidate.url),
                resolved_model: selected.resolved_model.clone(),
                use_snake_case,
            });

            let started_at = chrono::Utc::now();
            let session = BridgeSession::new(
                session_id.clone(),
                selected.resolved_model,
                use_snake_case,
                socket,
                selected.stream,
            );
            let outcome = session.run().await;

            metrics::SESSIONS_ACTIVE.dec();
            lifecycle.transition(BridgePhase::Closed);
            info!(
                "会话已关闭: session={}, 持续 {}ms, outcome={:?}",
                session_id,
                (chrono::Utc::now() - started_at).num_milliseconds(),
                outcome
            );
            state.publish(SessionEvent::Closed { session_id, outcome });
        }
        Err(e) => {
            lifecycle.transition(BridgePhase::Rejecting);
            metrics::SESSIONS_TOTAL.with_label_values(&["no_upstream"]).inc();

            let attempted = match e {
                SelectionError::NoUpstream { attempted } => attempted,
                _ => candidates.len(),
            };
            error!("无可用上游，拒绝客户端: session={}, error={}", session_id, e);

            reject_client(&mut socket, attempted).await;

            lifecycle.transition(BridgePhase::Closed);
            state.publish(SessionEvent::Rejected { session_id, attempted });
        }
    }
}

/// 发送 no_upstream 错误帧并以 1011 关闭
async fn reject_client(socket: &mut WebSocket, attempted: usize) {
    match NoUpstreamPayload::new(attempted).to_json() {
        Ok(json) => {
            if let Err(e) = socket.send(AxumWsMessage::Text(json)).await {
                warn!("发送 no_upstream 错误帧失败: {}", e);
            }
        }
        Err(e) => error!("序列化 no_upstream 错误帧失败: {}", e),
    }

    let close = AxumWsMessage::Close(Some(CloseFrame {
        code: CloseCode::INTERNAL_ERROR,
        reason: reason::NO_UPSTREAM.into(),
    }));
    if let Err(e) = socket.send(close).await {
        debug!("发送关闭帧失败: {}", e);
    }
}
