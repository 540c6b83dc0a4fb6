/// Prometheus 指标
///
/// 会话数、上游候选尝试结果与转发帧数

use axum::http::StatusCode;
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};
use tracing::error;

lazy_static! {
    /// 当前活跃的桥接会话
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "live_relay_sessions_active",
        "Number of active bridge sessions"
    )
    .expect("注册 live_relay_sessions_active 失败");

    /// 会话总数（按结果）
    pub static ref SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "live_relay_sessions_total",
        "Total number of client sessions",
        &["outcome"]  // "bridged" or "no_upstream"
    )
    .expect("注册 live_relay_sessions_total 失败");

    /// 上游候选尝试次数（按结果）
    pub static ref CANDIDATE_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "live_relay_candidate_attempts_total",
        "Total number of upstream candidate connection attempts",
        &["result"]  // "success", "timeout", "handshake"
    )
    .expect("注册 live_relay_candidate_attempts_total 失败");

    /// 转发帧数（按方向）
    pub static ref FRAMES_FORWARDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "live_relay_frames_forwarded_total",
        "Total number of frames forwarded across the bridge",
        &["direction"]  // "client_to_upstream" or "upstream_to_client"
    )
    .expect("注册 live_relay_frames_forwarded_total 失败");
}

/// 以文本格式导出所有指标
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

/// GET /metrics
pub async fn metrics_handler() -> (StatusCode, String) {
    match render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("导出指标失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error encoding metrics".to_string())
        }
    }
}
