/// Live Relay - Client
///
/// 连接 Relay 的客户端库：断线排队、指数退避重连、入站帧分发

pub mod backoff;
pub mod config;
pub mod endpoint;
pub mod state;
pub mod timer;
pub mod ws;

pub use endpoint::{EndpointProvider, StaticEndpoint};
pub use state::{ClientStatus, ConnectionState};
pub use timer::{Timer, TokioTimer};
pub use ws::{ClientEvent, ClientOptions, LiveClient};
