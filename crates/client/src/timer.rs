/// 定时器抽象
///
/// 重连等待通过注入的 Timer 完成，测试中可以替换为记录型实现。

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Timer: Send + Sync + 'static {
    /// 等待指定时间
    async fn sleep(&self, delay: Duration);
}

/// 基于 tokio 的定时器
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// 立即返回并记录每次等待时间
    #[derive(Debug, Clone, Default)]
    pub(crate) struct RecordingTimer {
        delays: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingTimer {
        pub(crate) fn delays_ms(&self) -> Vec<u64> {
            self.delays
                .lock()
                .unwrap()
                .iter()
                .map(|d| d.as_millis() as u64)
                .collect()
        }
    }

    #[async_trait]
    impl Timer for RecordingTimer {
        async fn sleep(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
            tokio::task::yield_now().await;
        }
    }
}
