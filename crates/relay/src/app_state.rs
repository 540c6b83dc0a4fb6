/// 应用全局状态

use crate::config::Config;
use crate::upstream::{CandidatePlanner, UpstreamSelector};
use crate::ws::SessionEvent;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 应用状态
///
/// 只包含只读配置；会话之间不共享可变状态。
#[derive(Clone)]
pub struct AppState {
    /// 运行配置
    pub config: Arc<Config>,
    /// 候选上游生成器
    pub planner: CandidatePlanner,
    /// 会话事件订阅者（可选）
    session_events: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let planner = CandidatePlanner::new(
            config.upstream_base_url.clone(),
            config.api_key.clone(),
            config.preferred_model.clone(),
        )
        .with_fallback_models(config.fallback_models.clone());

        Self {
            config: Arc::new(config),
            planner,
            session_events: None,
        }
    }

    /// 订阅会话生命周期事件
    pub fn with_session_events(mut self, sender: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.session_events = Some(sender);
        self
    }

    /// 为新连接创建上游选择器
    pub fn selector(&self) -> UpstreamSelector {
        UpstreamSelector::new(self.config.connect_timeout())
    }

    /// 发布会话事件
    pub fn publish(&self, event: SessionEvent) {
        if let Some(sender) = &self.session_events {
            let _ = sender.send(event);
        }
    }
}
