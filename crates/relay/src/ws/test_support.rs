/// 测试辅助：本地假上游与中继实例

use super::bridge::SessionEvent;
use crate::app_state::AppState;
use crate::config::Config;
use common::models::constants::FALLBACK_MODELS;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_hdr_async, connect_async, MaybeTlsStream, WebSocketStream};

/// 本地假上游
///
/// `received` 收到第一个成功握手的连接发来的帧，`control` 中的帧会发给该连接。
pub(crate) struct FakeUpstream {
    pub addr: SocketAddr,
    pub received: mpsc::UnboundedReceiver<WsMessage>,
    pub control: mpsc::UnboundedSender<WsMessage>,
    accepted_paths: Arc<Mutex<Vec<String>>>,
}

impl FakeUpstream {
    /// 成功握手的请求路径
    pub fn paths(&self) -> Vec<String> {
        self.accepted_paths.lock().unwrap().clone()
    }

    pub async fn recv(&mut self) -> WsMessage {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for upstream frame")
            .expect("fake upstream stopped")
    }
}

/// 启动假上游；`reject` 返回 true 的路径以 404 拒绝握手
pub(crate) async fn spawn_fake_upstream(reject: fn(&str) -> bool) -> FakeUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (received_tx, received) = mpsc::unbounded_channel();
    let (control, control_rx) = mpsc::unbounded_channel();
    let control_rx = Arc::new(Mutex::new(Some(control_rx)));
    let accepted_paths = Arc::new(Mutex::new(Vec::new()));

    let paths = accepted_paths.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let received_tx = received_tx.clone();
            let control_rx = control_rx.clone();
            let paths = paths.clone();

            tokio::spawn(async move {
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let path = req.uri().path().to_string();
                    if reject(&path) {
                        let mut err = ErrorResponse::new(Some("not found".to_string()));
                        *err.status_mut() = StatusCode::NOT_FOUND;
                        return Err(err);
                    }
                    paths.lock().unwrap().push(path);
                    Ok(resp)
                };

                let Ok(ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };
                let Some(control_rx) = control_rx.lock().unwrap().take() else {
                    return;
                };
                serve_fake_connection(ws, received_tx, control_rx).await;
            });
        }
    });

    FakeUpstream {
        addr,
        received,
        control,
        accepted_paths,
    }
}

async fn serve_fake_connection(
    mut ws: WebSocketStream<TcpStream>,
    received_tx: mpsc::UnboundedSender<WsMessage>,
    mut control_rx: mpsc::UnboundedReceiver<WsMessage>,
) {
    loop {
        tokio::select! {
            inbound = ws.next() => match inbound {
                Some(Ok(msg)) => {
                    let is_close = msg.is_close();
                    let _ = received_tx.send(msg);
                    if is_close {
                        break;
                    }
                }
                _ => break,
            },
            outbound = control_rx.recv() => match outbound {
                Some(msg) => {
                    if ws.send(msg).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

/// 一个没有监听者的本地地址
pub(crate) async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// 指向给定上游地址的测试状态
pub(crate) fn test_state(
    upstream: SocketAddr,
    preferred_model: &str,
) -> (AppState, mpsc::UnboundedReceiver<SessionEvent>) {
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        api_key: "test-key".to_string(),
        preferred_model: preferred_model.to_string(),
        fallback_models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
        upstream_base_url: format!("ws://{}", upstream),
        connect_timeout_ms: 2000,
        log_level: "debug".to_string(),
    };
    let (tx, rx) = mpsc::unbounded_channel();
    (AppState::new(config).with_session_events(tx), rx)
}

/// 在随机端口启动中继
pub(crate) async fn spawn_relay(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = crate::app_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub(crate) async fn connect_client(relay: SocketAddr) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
    let url = format!("ws://{}{}", relay, common::models::constants::LIVE_PATH);
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

pub(crate) async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}
