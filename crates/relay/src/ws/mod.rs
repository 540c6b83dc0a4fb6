/// WebSocket 模块
///
/// 接受 Live 客户端连接，并桥接到选中的上游

pub mod bridge;
pub mod handler;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::SessionEvent;
pub use handler::handle_live_websocket;
