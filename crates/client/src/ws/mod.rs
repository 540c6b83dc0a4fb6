/// WebSocket 客户端模块
///
/// 通过 Relay 与上游保持一个可自动重连的逻辑连接

pub mod client;
pub mod dispatch;

pub use client::{ClientOptions, LiveClient, LiveClientBuilder};
pub use dispatch::{classify, ClientEvent};
