/// Relay WebSocket 客户端
///
/// 单个逻辑连接由一个后台任务独占：所有操作通过命令通道提交，状态通过 watch 通道发布。
/// 未连接时的发送会按提交顺序入队，连接建立后先发送 setup，再按顺序清空队列。

use super::dispatch::{classify, ClientEvent};
use crate::backoff::{BackoffState, ReconnectPolicy};
use crate::endpoint::EndpointProvider;
use crate::state::{ClientStatus, ConnectionState};
use crate::timer::{Timer, TokioTimer};
use common::frame::close::CloseCode;
use common::frame::{ClientContent, SetupConfig};
use common::models::constants::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_QUEUED_FRAMES, FRAME_PREVIEW_CHARS,
};
use common::utils::{redact_key, truncate_preview};
use common::Error;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 客户端参数
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// 心跳 ping 间隔
    pub heartbeat_interval: Duration,
    /// 重连退避
    pub reconnect: ReconnectPolicy,
    /// 未连接期间最多缓存的消息数，超出时丢弃最早的消息
    pub max_queued_frames: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL),
            reconnect: ReconnectPolicy::default(),
            max_queued_frames: DEFAULT_MAX_QUEUED_FRAMES,
        }
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Setup(String),
    Send(String),
}

/// 一次连接结束的原因
#[derive(Debug)]
enum SessionEnd {
    /// 手动断开
    Stopped,
    /// 所有句柄已释放
    Shutdown,
    /// 策略违规（1008），不重连
    Fatal { code: u16, reason: String },
    /// 可重试的断开
    Lost(Error),
}

/// 客户端构建器
pub struct LiveClientBuilder {
    endpoint: Arc<dyn EndpointProvider>,
    timer: Arc<dyn Timer>,
    options: ClientOptions,
    events: Option<mpsc::UnboundedSender<ClientEvent>>,
}

impl LiveClientBuilder {
    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// 订阅客户端事件
    pub fn events(mut self, sender: mpsc::UnboundedSender<ClientEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// 启动后台任务（需要在 tokio 运行时内调用）
    pub fn spawn(self) -> LiveClient {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ClientStatus::default());

        let manager = ConnectionManager {
            endpoint: self.endpoint,
            timer: self.timer,
            heartbeat_interval: self.options.heartbeat_interval,
            commands: command_rx,
            status: status_tx,
            events: self.events,
            backoff: BackoffState::new(self.options.reconnect),
            queue: VecDeque::new(),
            max_queued_frames: self.options.max_queued_frames.max(1),
            setup: None,
            generation: 0,
            setup_sent: None,
        };
        tokio::spawn(manager.run());

        LiveClient {
            commands: command_tx,
            status: status_rx,
        }
    }
}

/// 客户端句柄
///
/// 所有操作都是非阻塞的，不会同步失败；结果通过状态与事件观察。
#[derive(Clone)]
pub struct LiveClient {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ClientStatus>,
}

impl LiveClient {
    pub fn builder(endpoint: Arc<dyn EndpointProvider>) -> LiveClientBuilder {
        LiveClientBuilder {
            endpoint,
            timer: Arc::new(TokioTimer),
            options: ClientOptions::default(),
            events: None,
        }
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("客户端任务已结束，命令被丢弃");
        }
    }

    /// 建立连接（失败时自动重连）
    pub fn connect(&self) {
        self.submit(Command::Connect);
    }

    /// 手动断开，不再重连
    pub fn disconnect(&self) {
        self.submit(Command::Disconnect);
    }

    /// 设置会话配置；每次连接建立后发送一次
    pub fn setup_gemini(&self, config: &SetupConfig) {
        match config.to_frame().and_then(|frame| serde_json::to_string(&frame)) {
            Ok(text) => self.submit(Command::Setup(text)),
            Err(e) => error!("序列化 setup 失败: {}", e),
        }
    }

    /// 发送任意 JSON 消息
    pub fn send_to_gemini(&self, message: &Value) {
        match serde_json::to_string(message) {
            Ok(text) => self.submit(Command::Send(text)),
            Err(e) => error!("序列化消息失败: {}", e),
        }
    }

    /// 发送一轮用户文本
    pub fn send_text(&self, text: &str) {
        match ClientContent::user_text(text).to_frame() {
            Ok(frame) => self.send_to_gemini(&frame),
            Err(e) => error!("构造文本消息失败: {}", e),
        }
    }

    /// 发送画布截图（可附带提示文本）
    pub fn send_canvas_update(&self, mime_type: &str, image: &[u8], prompt: Option<&str>) {
        match ClientContent::user_image(mime_type, image, prompt).to_frame() {
            Ok(frame) => {
                debug!("发送画布更新: {} bytes, mime={}", image.len(), mime_type);
                self.send_to_gemini(&frame);
            }
            Err(e) => error!("构造画布消息失败: {}", e),
        }
    }

    /// 原样发送文本帧
    pub fn send_raw(&self, text: impl Into<String>) {
        self.submit(Command::Send(text.into()));
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn status(&self) -> ClientStatus {
        self.status.borrow().clone()
    }

    /// 订阅状态变化
    pub fn watch(&self) -> watch::Receiver<ClientStatus> {
        self.status.clone()
    }
}

/// 连接管理后台任务
struct ConnectionManager {
    endpoint: Arc<dyn EndpointProvider>,
    timer: Arc<dyn Timer>,
    heartbeat_interval: Duration,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ClientStatus>,
    events: Option<mpsc::UnboundedSender<ClientEvent>>,
    backoff: BackoffState,
    /// 未连接期间提交的消息
    queue: VecDeque<String>,
    max_queued_frames: usize,
    /// 最近一次的 setup 帧
    setup: Option<String>,
    /// 连接代数，每次连接成功加一
    generation: u64,
    /// 已发送 setup 的连接代数
    setup_sent: Option<u64>,
}

impl ConnectionManager {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Connect => {
                    if !self.connection_loop().await {
                        break;
                    }
                }
                Command::Disconnect => self.set_state(ConnectionState::Disconnected),
                other => self.handle_offline(other),
            }
        }
        debug!("客户端任务结束");
    }

    fn emit(&self, event: ClientEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state();
        if previous == state {
            return;
        }
        self.status.send_modify(|status| status.state = state);
        debug!("连接状态变更: {} -> {}", previous, state);
        self.emit(ClientEvent::StateChanged(state));
    }

    /// 未连接时处理命令
    fn handle_offline(&mut self, command: Command) {
        match command {
            Command::Send(frame) => {
                self.enqueue(frame);
                debug!("未连接，消息入队 (队列长度 {})", self.queue.len());
            }
            Command::Setup(frame) => self.setup = Some(frame),
            Command::Connect | Command::Disconnect => {}
        }
    }

    /// 入队；队列已满时丢弃最早的消息
    fn enqueue(&mut self, frame: String) {
        if self.queue.len() >= self.max_queued_frames {
            self.queue.pop_front();
            let dropped = self.status.borrow().dropped_frames + 1;
            self.status.send_modify(|status| status.dropped_frames = dropped);
            warn!("发送队列已满 ({} 条)，丢弃最早的消息 (累计丢弃 {})", self.max_queued_frames, dropped);
        }
        self.queue.push_back(frame);
    }

    /// 连接并保持，直到手动断开、致命错误或重连耗尽
    ///
    /// 返回 false 表示所有句柄都已释放。
    async fn connection_loop(&mut self) -> bool {
        self.backoff.reset();
        self.status.send_modify(|status| status.reconnect_attempts = 0);

        loop {
            self.set_state(ConnectionState::Connecting);
            let end = match self.open().await {
                Ok(stream) => self.drive(stream).await,
                Err(end) => end,
            };

            let end = match end {
                SessionEnd::Lost(e) => match self.schedule_reconnect(e).await {
                    Some(end) => end,
                    None => continue,
                },
                other => other,
            };

            return match end {
                SessionEnd::Stopped => {
                    info!("已断开与 Relay 的连接");
                    self.set_state(ConnectionState::Disconnected);
                    true
                }
                SessionEnd::Shutdown => {
                    self.set_state(ConnectionState::Disconnected);
                    false
                }
                SessionEnd::Fatal { code, reason } => {
                    error!("❌ 连接被拒绝 (code={}): {}，不再重连", code, reason);
                    let message = Error::PolicyViolation(reason.clone()).to_string();
                    self.status.send_modify(|status| status.last_error = Some(message));
                    self.emit(ClientEvent::Fatal { code, reason });
                    self.set_state(ConnectionState::Failed);
                    true
                }
                SessionEnd::Lost(_) => {
                    self.set_state(ConnectionState::Failed);
                    true
                }
            };
        }
    }

    /// 记录错误并等待退避；返回 `None` 表示继续重连
    async fn schedule_reconnect(&mut self, cause: Error) -> Option<SessionEnd> {
        warn!("与 Relay 的连接中断: {}", cause);
        let message = cause.to_string();
        self.status.send_modify(|status| status.last_error = Some(message));

        let Some(delay) = self.backoff.next_delay() else {
            error!("❌ 已重连 {} 次仍失败，放弃", self.backoff.attempts());
            return Some(SessionEnd::Lost(cause));
        };

        let attempts = self.backoff.attempts();
        self.status.send_modify(|status| status.reconnect_attempts = attempts);
        self.set_state(ConnectionState::Reconnecting);
        info!("{}ms 后进行第 {} 次重连", delay.as_millis(), attempts);

        self.wait(delay).await
    }

    /// 退避等待期间继续接收命令
    async fn wait(&mut self, delay: Duration) -> Option<SessionEnd> {
        let timer = self.timer.clone();
        let sleep = timer.sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return None,
                command = self.commands.recv() => match command {
                    Some(Command::Connect) => return None,
                    Some(Command::Disconnect) => return Some(SessionEnd::Stopped),
                    Some(other) => self.handle_offline(other),
                    None => return Some(SessionEnd::Shutdown),
                },
            }
        }
    }

    /// 解析地址并握手
    async fn open(&mut self) -> Result<RelayStream, SessionEnd> {
        let endpoint = self.endpoint.clone();
        let connect = async move {
            let url = endpoint.resolve().await?;
            info!("连接 Relay: {}", redact_key(&url));
            let (stream, _) = connect_async(url)
                .await
                .map_err(|e| Error::Connection(e.to_string()))?;
            Ok::<_, Error>(stream)
        };
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => return result.map_err(SessionEnd::Lost),
                command = self.commands.recv() => match command {
                    Some(Command::Disconnect) => return Err(SessionEnd::Stopped),
                    Some(other) => self.handle_offline(other),
                    None => return Err(SessionEnd::Shutdown),
                },
            }
        }
    }

    /// 驱动一次已建立的连接
    async fn drive(&mut self, stream: RelayStream) -> SessionEnd {
        self.generation += 1;
        let generation = self.generation;
        self.backoff.reset();
        self.status.send_modify(|status| {
            status.reconnect_attempts = 0;
            status.last_error = None;
        });
        self.set_state(ConnectionState::Open);
        info!("✅ 已连接 Relay (第 {} 次连接)", generation);

        let (mut sink, mut source) = stream.split();

        if let Some(setup) = self.setup.clone() {
            if let Err(e) = sink.send(Message::Text(setup)).await {
                return SessionEnd::Lost(Error::Connection(e.to_string()));
            }
            self.setup_sent = Some(generation);
            debug!("已发送 setup");
        }

        if !self.queue.is_empty() {
            debug!("发送队列中的 {} 条消息", self.queue.len());
        }
        while let Some(frame) = self.queue.pop_front() {
            if let Err(e) = sink.send(Message::Text(frame.clone())).await {
                self.queue.push_front(frame);
                return SessionEnd::Lost(Error::Connection(e.to_string()));
            }
        }

        let period = self.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                inbound = source.next() => match inbound {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => self.dispatch(&text),
                        Err(_) => debug!("忽略非 UTF-8 二进制帧"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let _ = sink.close().await;
                        return close_outcome(frame);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Lost(Error::Connection(e.to_string())),
                    None => return SessionEnd::Lost(Error::Connection("连接意外断开".to_string())),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send(frame)) => {
                        debug!("⬆️ 发送: {}", truncate_preview(&frame, FRAME_PREVIEW_CHARS));
                        if let Err(e) = sink.send(Message::Text(frame.clone())).await {
                            self.enqueue(frame);
                            return SessionEnd::Lost(Error::Connection(e.to_string()));
                        }
                    }
                    Some(Command::Setup(frame)) => {
                        self.setup = Some(frame.clone());
                        if self.setup_sent == Some(generation) {
                            warn!("本次连接已发送过 setup，新配置将在重连后生效");
                        } else {
                            if let Err(e) = sink.send(Message::Text(frame)).await {
                                return SessionEnd::Lost(Error::Connection(e.to_string()));
                            }
                            self.setup_sent = Some(generation);
                        }
                    }
                    Some(Command::Connect) => debug!("已连接，忽略 connect"),
                    Some(Command::Disconnect) => {
                        let _ = sink.send(normal_close()).await;
                        let _ = sink.close().await;
                        return SessionEnd::Stopped;
                    }
                    None => {
                        let _ = sink.send(normal_close()).await;
                        let _ = sink.close().await;
                        return SessionEnd::Shutdown;
                    }
                },
                _ = heartbeat.tick() => {
                    if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                        return SessionEnd::Lost(Error::Connection(e.to_string()));
                    }
                    debug!("发送心跳 ping");
                }
            }
        }
    }

    fn dispatch(&mut self, text: &str) {
        debug!("⬇️ 收到: {}", truncate_preview(text, FRAME_PREVIEW_CHARS));
        for event in classify(text) {
            match &event {
                ClientEvent::SetupComplete => {
                    if self.state() == ConnectionState::Open {
                        info!("✅ 上游会话已就绪");
                        self.set_state(ConnectionState::GeminiConnected);
                    }
                }
                ClientEvent::RelayError { error, message } => {
                    warn!("Relay 返回错误: {} {:?}", error, message);
                }
                _ => {}
            }
            self.emit(event);
        }
    }
}

fn normal_close() -> Message {
    Message::Close(Some(CloseFrame {
        code: WsCloseCode::Normal,
        reason: "client disconnect".into(),
    }))
}

fn close_outcome(frame: Option<CloseFrame<'static>>) -> SessionEnd {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            let reason = frame.reason.into_owned();
            if CloseCode::is_retryable(code) {
                SessionEnd::Lost(Error::Connection(format!("连接关闭: code={}, reason={}", code, reason)))
            } else {
                SessionEnd::Fatal { code, reason }
            }
        }
        None => SessionEnd::Lost(Error::Connection("连接关闭".to_string())),
    }
}
