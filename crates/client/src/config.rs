/// 配置管理

use common::frame::strip_model_prefix;
use common::models::constants::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MODEL, DEFAULT_RELAY_PORT, LIVE_PATH};
use common::Error;
use std::time::Duration;

const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are a patient tutor. Guide the student step by step and keep answers short.";

#[derive(Debug, Clone)]
pub struct Config {
    pub relay_url: String,
    pub model: String,
    pub system_instruction: String,
    pub heartbeat_interval: u64,
    pub log_level: String,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        let relay_url = std::env::var("RELAY_URL")
            .unwrap_or_else(|_| format!("ws://localhost:{}{}", DEFAULT_RELAY_PORT, LIVE_PATH));

        let model = std::env::var("GEMINI_MODEL")
            .map(|m| strip_model_prefix(m.trim()).to_string())
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let system_instruction = std::env::var("SYSTEM_INSTRUCTION")
            .unwrap_or_else(|_| DEFAULT_SYSTEM_INSTRUCTION.to_string());

        let heartbeat_interval = std::env::var("HEARTBEAT_INTERVAL")
            .unwrap_or_else(|_| DEFAULT_HEARTBEAT_INTERVAL.to_string())
            .parse()
            .map_err(|e| Error::Config(format!("HEARTBEAT_INTERVAL 无效: {}", e)))?;

        let log_level = std::env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            relay_url,
            model,
            system_instruction,
            heartbeat_interval,
            log_level,
        })
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval.max(1))
    }
}
