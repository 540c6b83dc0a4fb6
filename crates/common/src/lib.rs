/// Live Relay - 公共库
/// 
/// 提供 Relay 与 Client 共享的帧编解码、错误类型、常量与工具函数

pub mod errors;
pub mod frame;
pub mod models;
pub mod utils;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use frame::{to_service_dialect, Dialect};
