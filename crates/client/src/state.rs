/// 客户端连接状态

use serde::Serialize;
use std::fmt;

/// 连接状态
///
/// `idle -> connecting -> open -> gemini_connected`；
/// 意外断开进入 `reconnecting`，重试耗尽进入 `failed`，手动断开进入 `disconnected`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    GeminiConnected,
    Reconnecting,
    Disconnected,
    Failed,
}

impl ConnectionState {
    /// 是否可以直接发送（否则进入队列）
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open | Self::GeminiConnected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::GeminiConnected => "gemini_connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对外可观察的客户端状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatus {
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
    /// 队列满时被丢弃的消息数
    pub dropped_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_states() {
        assert!(ConnectionState::Open.is_open());
        assert!(ConnectionState::GeminiConnected.is_open());
        assert!(!ConnectionState::Reconnecting.is_open());
        assert!(!ConnectionState::Idle.is_open());
    }

    #[test]
    fn test_status_serializes_for_ui() {
        let status = ClientStatus {
            state: ConnectionState::GeminiConnected,
            last_error: None,
            reconnect_attempts: 2,
            dropped_frames: 0,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"state": "gemini_connected", "lastError": null, "reconnectAttempts": 2, "droppedFrames": 0})
        );
    }
}
