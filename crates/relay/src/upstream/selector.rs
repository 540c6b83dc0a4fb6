/// 上游候选选择器
///
/// 严格按顺序逐个尝试候选地址，第一个在超时内完成握手的候选胜出。
/// 失败、关闭、超时都视为该候选失败，同一轮选择内不重试。

use super::candidate::UpstreamCandidate;
use crate::metrics;
use common::utils::redact_key;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// 上游 WebSocket 连接
pub type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 选择错误
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("连接超时 ({0:?})")]
    Timeout(Duration),

    #[error("握手失败: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("所有上游候选均不可用（共尝试 {attempted} 个）")]
    NoUpstream { attempted: usize },
}

impl SelectionError {
    fn metric_label(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Handshake(_) => "handshake",
            Self::NoUpstream { .. } => "no_upstream",
        }
    }
}

/// 选中的上游
pub struct SelectedUpstream {
    pub stream: UpstreamStream,
    pub candidate: UpstreamCandidate,
    pub resolved_model: String,
    /// 候选在列表中的位置
    pub index: usize,
}

impl SelectedUpstream {
    pub fn use_snake_case(&self) -> bool {
        self.candidate.requires_snake_case
    }
}

/// 上游选择器
#[derive(Debug, Clone)]
pub struct UpstreamSelector {
    timeout: Duration,
}

impl UpstreamSelector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 尝试连接单个候选
    ///
    /// 超时后连接 future 被丢弃，半开的 socket 随之关闭。
    pub async fn attempt(&self, candidate: &UpstreamCandidate) -> Result<UpstreamStream, SelectionError> {
        match tokio::time::timeout(self.timeout, connect_async(candidate.url.as_str())).await {
            Ok(Ok((stream, response))) => {
                debug!("上游握手完成: status={}", response.status());
                Ok(stream)
            }
            Ok(Err(e)) => Err(SelectionError::Handshake(e)),
            Err(_) => Err(SelectionError::Timeout(self.timeout)),
        }
    }

    /// 依次尝试候选，返回第一个成功的上游
    pub async fn select(
        &self,
        candidates: &[UpstreamCandidate],
        preferred_model: &str,
    ) -> Result<SelectedUpstream, SelectionError> {
        for (index, candidate) in candidates.iter().enumerate() {
            let redacted = redact_key(&candidate.url);
            info!("尝试上游候选 [{}/{}]: {}", index + 1, candidates.len(), redacted);

            match self.attempt(candidate).await {
                Ok(stream) => {
                    metrics::CANDIDATE_ATTEMPTS_TOTAL
                        .with_label_values(&["success"])
                        .inc();

                    let resolved_model = candidate
                        .model()
                        .unwrap_or_else(|| preferred_model.to_string());

                    info!(
                        "✅ 上游已连接: {} (model={}, snake_case={})",
                        redacted, resolved_model, candidate.requires_snake_case
                    );

                    return Ok(SelectedUpstream {
                        stream,
                        candidate: candidate.clone(),
                        resolved_model,
                        index,
                    });
                }
                Err(e) => {
                    metrics::CANDIDATE_ATTEMPTS_TOTAL
                        .with_label_values(&[e.metric_label()])
                        .inc();
                    warn!("上游候选失败: {}: {}", redacted, e);
                }
            }
        }

        Err(SelectionError::NoUpstream {
            attempted: candidates.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::test_support::{refused_addr, spawn_fake_upstream};

    fn candidate(addr: std::net::SocketAddr, path: &str) -> UpstreamCandidate {
        UpstreamCandidate::new(format!("ws://{}{}?key=test", addr, path))
    }

    #[tokio::test]
    async fn test_first_open_candidate_wins() {
        let first = spawn_fake_upstream(|_| false).await;
        let second = spawn_fake_upstream(|_| false).await;

        let candidates = vec![
            candidate(first.addr, "/ws/v1beta/models/model-a:streamGenerateContent"),
            candidate(second.addr, "/ws/v1beta/models/model-b:streamGenerateContent"),
        ];

        let selector = UpstreamSelector::new(Duration::from_secs(2));
        let selected = selector.select(&candidates, "preferred").await.unwrap();

        assert_eq!(selected.index, 0);
        assert_eq!(selected.resolved_model, "model-a");
        assert!(!selected.use_snake_case());
    }

    #[tokio::test]
    async fn test_skips_refused_candidates() {
        let refused = refused_addr().await;
        let upstream = spawn_fake_upstream(|_| false).await;

        let candidates = vec![
            candidate(refused, "/ws/x.GenerativeService/BidiGenerateContent"),
            candidate(refused, "/ws/x.GenerativeService.BidiGenerateContent"),
            candidate(upstream.addr, "/ws/v1beta/models/gemini-x:streamGenerateContent"),
        ];

        let selector = UpstreamSelector::new(Duration::from_secs(2));
        let selected = selector.select(&candidates, "preferred").await.unwrap();

        assert_eq!(selected.index, 2);
        assert_eq!(selected.resolved_model, "gemini-x");
        assert!(!selected.use_snake_case());
    }

    #[tokio::test]
    async fn test_service_path_uses_preferred_model() {
        let upstream = spawn_fake_upstream(|_| false).await;
        let candidates = vec![candidate(
            upstream.addr,
            "/ws/x.GenerativeService/BidiGenerateContent",
        )];

        let selector = UpstreamSelector::new(Duration::from_secs(2));
        let selected = selector.select(&candidates, "gemini-pref").await.unwrap();

        assert_eq!(selected.resolved_model, "gemini-pref");
        assert!(selected.use_snake_case());
    }

    #[tokio::test]
    async fn test_rejected_handshake_fails() {
        let upstream = spawn_fake_upstream(|path| path.contains("BidiGenerateContent")).await;
        let selector = UpstreamSelector::new(Duration::from_secs(2));

        let result = selector
            .attempt(&candidate(upstream.addr, "/ws/x.GenerativeService/BidiGenerateContent"))
            .await;
        assert!(matches!(result, Err(SelectionError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_silent_candidate_times_out() {
        // 只接受 TCP 连接、从不完成握手
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let selector = UpstreamSelector::new(Duration::from_millis(200));
        let result = selector.attempt(&candidate(addr, "/ws/silent")).await;
        assert!(matches!(result, Err(SelectionError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_all_candidates_fail() {
        let refused = refused_addr().await;
        let candidates = vec![
            candidate(refused, "/a"),
            candidate(refused, "/b"),
        ];

        let selector = UpstreamSelector::new(Duration::from_secs(1));
        match selector.select(&candidates, "m").await {
            Err(SelectionError::NoUpstream { attempted }) => assert_eq!(attempted, 2),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected failure"),
        }
    }
}
