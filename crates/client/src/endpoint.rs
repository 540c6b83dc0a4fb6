/// Relay 地址提供者
///
/// 每次（重新）连接都会重新解析地址，便于外部凭据服务下发新的地址。

use async_trait::async_trait;
use common::Result;

#[async_trait]
pub trait EndpointProvider: Send + Sync + 'static {
    /// 返回本次连接使用的 Relay WebSocket 地址
    async fn resolve(&self) -> Result<String>;
}

/// 固定地址
#[derive(Debug, Clone)]
pub struct StaticEndpoint {
    url: String,
}

impl StaticEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl EndpointProvider for StaticEndpoint {
    async fn resolve(&self) -> Result<String> {
        Ok(self.url.clone())
    }
}
