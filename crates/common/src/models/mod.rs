/// 共享数据模型
///
/// 定义 Relay 和 Client 共享的数据结构

use serde::{Deserialize, Serialize};

/// 对话轮次角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// 常量定义
pub mod constants {
    /// 默认 Relay 端口
    pub const DEFAULT_RELAY_PORT: u16 = 8080;

    /// Relay 对客户端暴露的 WebSocket 路径
    pub const LIVE_PATH: &str = "/live";

    /// 默认上游服务地址
    pub const DEFAULT_UPSTREAM_BASE_URL: &str = "wss://generativelanguage.googleapis.com";

    /// 上游服务命名空间
    pub const SERVICE_NAMESPACE: &str = "google.ai.generativelanguage.v1beta";

    /// 默认首选模型
    pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

    /// 已知可用的备用模型（按优先级排列）
    pub const FALLBACK_MODELS: [&str; 3] = [
        "gemini-2.0-flash-live-001",
        "gemini-2.0-flash-exp",
        "gemini-1.5-flash",
    ];

    /// 模型资源名前缀
    pub const MODEL_PREFIX: &str = "models/";

    /// 单个候选上游的连接超时（毫秒）
    pub const UPSTREAM_CONNECT_TIMEOUT_MS: u64 = 6000;

    /// 日志中帧预览的最大字符数
    pub const FRAME_PREVIEW_CHARS: usize = 200;

    /// 默认心跳间隔（秒）
    pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 30;

    /// 重连初始延迟（毫秒）
    pub const INITIAL_RETRY_DELAY_MS: u64 = 1000;

    /// 重连最大延迟（毫秒）
    pub const MAX_RETRY_DELAY_MS: u64 = 30_000;

    /// 最大重连次数
    pub const MAX_RETRY_ATTEMPTS: u32 = 10;

    /// 客户端离线发送队列上限
    pub const DEFAULT_MAX_QUEUED_FRAMES: usize = 512;
}
