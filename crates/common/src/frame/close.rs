/// WebSocket 关闭码与 Relay 错误帧

use serde::{Deserialize, Serialize};

/// 关闭码
pub struct CloseCode;

impl CloseCode {
    /// 正常关闭
    pub const NORMAL: u16 = 1000;
    /// 未携带状态码（仅用于接收侧，不能主动发送）
    pub const NO_STATUS: u16 = 1005;
    /// 异常断开（仅用于接收侧，不能主动发送）
    pub const ABNORMAL: u16 = 1006;
    /// 策略违规，不可重试
    pub const POLICY_VIOLATION: u16 = 1008;
    /// 内部错误
    pub const INTERNAL_ERROR: u16 = 1011;

    /// 是否允许客户端重连
    pub fn is_retryable(code: u16) -> bool {
        code != Self::POLICY_VIOLATION
    }

    /// 是否可以出现在主动发送的关闭帧中
    pub fn is_sendable(code: u16) -> bool {
        !matches!(code, Self::NO_STATUS | Self::ABNORMAL | 1015) && (1000..5000).contains(&code)
    }
}

/// 关闭原因标签
pub mod reason {
    pub const CLIENT_CLOSED: &str = "client_closed";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const CLIENT_ERROR: &str = "client_error";
    pub const NO_UPSTREAM: &str = "no_upstream";
}

/// 所有上游候选均失败时发给客户端的错误帧
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoUpstreamPayload {
    pub error: String,
    pub attempted: usize,
    pub message: String,
}

impl NoUpstreamPayload {
    pub fn new(attempted: usize) -> Self {
        Self {
            error: reason::NO_UPSTREAM.to_string(),
            attempted,
            message: format!("{} 个上游候选均无法连接", attempted),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(CloseCode::is_retryable(CloseCode::NORMAL));
        assert!(CloseCode::is_retryable(CloseCode::INTERNAL_ERROR));
        assert!(CloseCode::is_retryable(CloseCode::ABNORMAL));
        assert!(!CloseCode::is_retryable(CloseCode::POLICY_VIOLATION));
    }

    #[test]
    fn test_sendable() {
        assert!(CloseCode::is_sendable(1000));
        assert!(CloseCode::is_sendable(1011));
        assert!(CloseCode::is_sendable(4001));
        assert!(!CloseCode::is_sendable(1005));
        assert!(!CloseCode::is_sendable(1006));
        assert!(!CloseCode::is_sendable(999));
    }

    #[test]
    fn test_no_upstream_payload() {
        let json = NoUpstreamPayload::new(8).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["error"], "no_upstream");
        assert_eq!(value["attempted"], 8);
    }
}
