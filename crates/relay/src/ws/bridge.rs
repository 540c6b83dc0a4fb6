/// 会话桥接
///
/// 一个 BridgeSession 独占一个客户端连接和一个上游连接，双向转发帧：
/// - 上游 -> 客户端：原样转发
/// - 客户端 -> 上游：改写 setup 帧，服务方言下转换字段命名
/// 任一侧关闭或出错时，对称地关闭另一侧。

use crate::metrics;
use crate::upstream::UpstreamStream;
use axum::extract::ws::{CloseFrame as AxumCloseFrame, Message as AxumWsMessage, WebSocket};
use common::frame::close::{reason, CloseCode};
use common::frame::{prepare_client_frame, Dialect};
use common::models::constants::FRAME_PREVIEW_CHARS;
use common::utils::truncate_preview;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgePhase {
    Selecting,
    Bridging,
    Rejecting,
    Closed,
}

/// 会话结束原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// 上游主动关闭，关闭码原样转给客户端
    UpstreamClosed { code: Option<u16>, reason: String },
    /// 客户端主动关闭
    ClientClosed,
    /// 上游读写错误
    UpstreamError(String),
    /// 客户端读写错误
    ClientError(String),
}

/// 会话生命周期事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Bridging {
        session_id: String,
        upstream: String,
        resolved_model: String,
        use_snake_case: bool,
    },
    Rejected {
        session_id: String,
        attempted: usize,
    },
    Closed {
        session_id: String,
        outcome: CloseOutcome,
    },
}

/// 处理一帧客户端文本
///
/// 返回 `None` 表示原样转发；非 JSON 内容总是原样转发。
pub fn prepare_outbound(raw: &str, resolved_model: &str, dialect: Dialect) -> Option<String> {
    let frame: Value = serde_json::from_str(raw).ok()?;
    let is_setup = frame.get("setup").is_some();
    if !is_setup && !dialect.is_snake_case() {
        return None;
    }

    let prepared = prepare_client_frame(frame, resolved_model, dialect);
    match serde_json::to_string(&prepared) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("序列化客户端帧失败，原样转发: {}", e);
            None
        }
    }
}

fn ws_close(code: u16, reason: &str) -> WsMessage {
    WsMessage::Close(Some(WsCloseFrame {
        code: WsCloseCode::from(code),
        reason: reason.to_string().into(),
    }))
}

fn axum_close(code: u16, reason: &str) -> AxumWsMessage {
    AxumWsMessage::Close(Some(AxumCloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}

/// 桥接会话
pub struct BridgeSession {
    pub session_id: String,
    pub resolved_model: String,
    pub use_snake_case: bool,
    client: WebSocket,
    upstream: UpstreamStream,
}

impl BridgeSession {
    pub fn new(
        session_id: impl Into<String>,
        resolved_model: impl Into<String>,
        use_snake_case: bool,
        client: WebSocket,
        upstream: UpstreamStream,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            resolved_model: resolved_model.into(),
            use_snake_case,
            client,
            upstream,
        }
    }

    pub fn dialect(&self) -> Dialect {
        Dialect::from_snake_case(self.use_snake_case)
    }

    /// 双向转发直到任一侧关闭
    pub async fn run(self) -> CloseOutcome {
        let dialect = self.dialect();
        let session_id = self.session_id;
        let resolved_model = self.resolved_model;
        let (mut client_tx, mut client_rx) = self.client.split();
        let (mut upstream_tx, mut upstream_rx) = self.upstream.split();

        let outcome = loop {
            tokio::select! {
                inbound = upstream_rx.next() => {
                    let forwarded = match inbound {
                        Some(Ok(WsMessage::Text(text))) => {
                            debug!("⬇️ [上游 -> 客户端] session={} {}",
                                   session_id, truncate_preview(&text, FRAME_PREVIEW_CHARS));
                            AxumWsMessage::Text(text)
                        }
                        Some(Ok(WsMessage::Binary(data))) => {
                            debug!("⬇️ [上游 -> 客户端] session={} 二进制 {} bytes", session_id, data.len());
                            AxumWsMessage::Binary(data)
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            let (code, reason) = match frame {
                                Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                                None => (None, String::new()),
                            };
                            info!("上游关闭连接: session={}, code={:?}, reason={}", session_id, code, reason);

                            let close = match code {
                                Some(c) if CloseCode::is_sendable(c) => axum_close(c, &reason),
                                _ => AxumWsMessage::Close(None),
                            };
                            if let Err(e) = client_tx.send(close).await {
                                debug!("向客户端转发关闭帧失败: {}", e);
                            }
                            break CloseOutcome::UpstreamClosed { code, reason };
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!("上游连接错误: session={}, error={}", session_id, e);
                            let _ = client_tx
                                .send(axum_close(CloseCode::INTERNAL_ERROR, reason::UPSTREAM_ERROR))
                                .await;
                            break CloseOutcome::UpstreamError(e.to_string());
                        }
                        None => {
                            warn!("上游连接意外断开: session={}", session_id);
                            let _ = client_tx
                                .send(axum_close(CloseCode::INTERNAL_ERROR, reason::UPSTREAM_ERROR))
                                .await;
                            break CloseOutcome::UpstreamError("上游连接意外断开".to_string());
                        }
                    };

                    if let Err(e) = client_tx.send(forwarded).await {
                        warn!("发送到客户端失败: session={}, error={}", session_id, e);
                        let _ = upstream_tx
                            .send(ws_close(CloseCode::INTERNAL_ERROR, reason::CLIENT_ERROR))
                            .await;
                        break CloseOutcome::ClientError(e.to_string());
                    }
                    metrics::FRAMES_FORWARDED_TOTAL
                        .with_label_values(&["upstream_to_client"])
                        .inc();
                }
                outbound = client_rx.next() => {
                    let forwarded = match outbound {
                        Some(Ok(AxumWsMessage::Text(text))) => {
                            match prepare_outbound(&text, &resolved_model, dialect) {
                                Some(prepared) => WsMessage::Text(prepared),
                                None => WsMessage::Text(text),
                            }
                        }
                        Some(Ok(AxumWsMessage::Binary(data))) => {
                            let prepared = std::str::from_utf8(&data)
                                .ok()
                                .and_then(|raw| prepare_outbound(raw, &resolved_model, dialect));
                            match prepared {
                                Some(prepared) => WsMessage::Text(prepared),
                                None => WsMessage::Binary(data),
                            }
                        }
                        Some(Ok(AxumWsMessage::Close(_))) | None => {
                            info!("客户端关闭连接: session={}", session_id);
                            let _ = upstream_tx
                                .send(ws_close(CloseCode::NORMAL, reason::CLIENT_CLOSED))
                                .await;
                            break CloseOutcome::ClientClosed;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!("客户端连接错误: session={}, error={}", session_id, e);
                            let _ = upstream_tx
                                .send(ws_close(CloseCode::INTERNAL_ERROR, reason::CLIENT_ERROR))
                                .await;
                            break CloseOutcome::ClientError(e.to_string());
                        }
                    };

                    if let WsMessage::Text(text) = &forwarded {
                        debug!("⬆️ [客户端 -> 上游] session={} {}",
                               session_id, truncate_preview(text, FRAME_PREVIEW_CHARS));
                    }

                    if let Err(e) = upstream_tx.send(forwarded).await {
                        warn!("发送到上游失败: session={}, error={}", session_id, e);
                        let _ = client_tx
                            .send(axum_close(CloseCode::INTERNAL_ERROR, reason::UPSTREAM_ERROR))
                            .await;
                        break CloseOutcome::UpstreamError(e.to_string());
                    }
                    metrics::FRAMES_FORWARDED_TOTAL
                        .with_label_values(&["client_to_upstream"])
                        .inc();
                }
            }
        };

        let _ = client_tx.close().await;
        let _ = upstream_tx.close().await;

        outcome
    }
}
