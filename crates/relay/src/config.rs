/// 配置管理

use common::frame::strip_model_prefix;
use common::models::constants::{
    DEFAULT_MODEL, DEFAULT_RELAY_PORT, DEFAULT_UPSTREAM_BASE_URL, FALLBACK_MODELS,
    UPSTREAM_CONNECT_TIMEOUT_MS,
};
use common::Error;
use std::fmt;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub preferred_model: String,
    /// 首选模型之后依次尝试的备用模型
    pub fallback_models: Vec<String>,
    pub upstream_base_url: String,
    pub connect_timeout_ms: u64,
    pub log_level: String,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| Error::Config("缺少 GEMINI_API_KEY 环境变量".to_string()))?;

        let host = std::env::var("RELAY_HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("RELAY_PORT")
            .or_else(|_| std::env::var("PORT"))
            .unwrap_or_else(|_| DEFAULT_RELAY_PORT.to_string())
            .parse()
            .map_err(|e| Error::Config(format!("RELAY_PORT 无效: {}", e)))?;

        let preferred_model = std::env::var("GEMINI_MODEL")
            .map(|m| strip_model_prefix(m.trim()).to_string())
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let fallback_models = std::env::var("GEMINI_FALLBACK_MODELS")
            .map(|list| parse_model_list(&list))
            .unwrap_or_else(|_| FALLBACK_MODELS.iter().map(|m| m.to_string()).collect());

        let upstream_base_url = std::env::var("UPSTREAM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_BASE_URL.to_string());

        let connect_timeout_ms = std::env::var("UPSTREAM_CONNECT_TIMEOUT_MS")
            .unwrap_or_else(|_| UPSTREAM_CONNECT_TIMEOUT_MS.to_string())
            .parse()
            .map_err(|e| Error::Config(format!("UPSTREAM_CONNECT_TIMEOUT_MS 无效: {}", e)))?;

        let log_level = std::env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "debug".to_string());

        Ok(Self {
            host,
            port,
            api_key,
            preferred_model,
            fallback_models,
            upstream_base_url,
            connect_timeout_ms,
            log_level,
        })
    }

    /// 单个候选上游的连接超时
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// 逗号分隔的模型列表，忽略空项
fn parse_model_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|m| strip_model_prefix(m.trim()).to_string())
        .filter(|m| !m.is_empty())
        .collect()
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &"***")
            .field("preferred_model", &self.preferred_model)
            .field("fallback_models", &self.fallback_models)
            .field("upstream_base_url", &self.upstream_base_url)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("log_level", &self.log_level)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_list() {
        assert_eq!(
            parse_model_list(" models/gemini-a, gemini-b ,,"),
            vec!["gemini-a".to_string(), "gemini-b".to_string()]
        );
        assert!(parse_model_list("").is_empty());
    }
}
