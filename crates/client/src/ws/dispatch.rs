/// 入站帧分类
///
/// 同时接受驼峰与下划线两种字段命名；不认识的帧形状直接忽略。

use crate::state::ConnectionState;
use common::frame::{field, Content, FunctionCall};
use serde_json::Value;
use tracing::debug;

/// 客户端事件
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// 连接状态变化
    StateChanged(ConnectionState),
    /// 上游确认 setup
    SetupComplete,
    /// 模型回复的第一个文本片段
    Text(String),
    /// 模型发起的函数调用
    FunctionCall(FunctionCall),
    TurnComplete,
    Interrupted,
    /// Relay 或上游返回的 `{"error": ...}` 帧
    RelayError { error: String, message: Option<String> },
    /// 策略违规关闭，不会重连
    Fatal { code: u16, reason: String },
}

fn is_true(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}

fn error_event(frame: &Value, error: &Value) -> ClientEvent {
    let message = frame
        .get("message")
        .or_else(|| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let error = match error {
        Value::String(s) => s.clone(),
        other => other
            .get("status")
            .or_else(|| other.get("code"))
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .unwrap_or_else(|| other.to_string()),
    };

    ClientEvent::RelayError { error, message }
}

/// 将一帧入站文本分类为事件列表
pub fn classify(raw: &str) -> Vec<ClientEvent> {
    let frame: Value = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(_) => {
            debug!("忽略非 JSON 入站帧");
            return Vec::new();
        }
    };

    let mut events = Vec::new();

    if field(&frame, "setupComplete", "setup_complete").is_some() {
        events.push(ClientEvent::SetupComplete);
    }

    if let Some(error) = frame.get("error") {
        events.push(error_event(&frame, error));
    }

    if let Some(content) = field(&frame, "serverContent", "server_content") {
        if let Some(turn) = field(content, "modelTurn", "model_turn") {
            match serde_json::from_value::<Content>(turn.clone()) {
                Ok(turn) => {
                    if let Some(text) = turn.first_text() {
                        events.push(ClientEvent::Text(text.to_string()));
                    }
                    events.extend(
                        turn.parts
                            .into_iter()
                            .filter_map(|part| part.function_call)
                            .map(ClientEvent::FunctionCall),
                    );
                }
                Err(e) => debug!("无法解析 modelTurn: {}", e),
            }
        }

        if is_true(content.get("interrupted")) {
            events.push(ClientEvent::Interrupted);
        }
        if is_true(field(content, "turnComplete", "turn_complete")) {
            events.push(ClientEvent::TurnComplete);
        }
    }

    if let Some(calls) = field(&frame, "toolCall", "tool_call")
        .and_then(|tool_call| field(tool_call, "functionCalls", "function_calls"))
        .and_then(Value::as_array)
    {
        events.extend(
            calls
                .iter()
                .filter_map(|call| serde_json::from_value::<FunctionCall>(call.clone()).ok())
                .map(ClientEvent::FunctionCall),
        );
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_complete_either_casing() {
        assert_eq!(classify(r#"{"setupComplete":{}}"#), vec![ClientEvent::SetupComplete]);
        assert_eq!(classify(r#"{"setup_complete":{}}"#), vec![ClientEvent::SetupComplete]);
    }

    #[test]
    fn test_first_text_part_surfaced() {
        let raw = json!({
            "serverContent": {
                "modelTurn": {"role": "model", "parts": [{"text": "三加四"}, {"text": "等于七"}]},
                "turnComplete": true
            }
        })
        .to_string();

        assert_eq!(
            classify(&raw),
            vec![ClientEvent::Text("三加四".to_string()), ClientEvent::TurnComplete]
        );
    }

    #[test]
    fn test_snake_case_server_content() {
        let raw = json!({
            "server_content": {
                "model_turn": {"parts": [{"text": "hi"}]},
                "turn_complete": true
            }
        })
        .to_string();

        assert_eq!(
            classify(&raw),
            vec![ClientEvent::Text("hi".to_string()), ClientEvent::TurnComplete]
        );
    }

    #[test]
    fn test_function_calls() {
        let raw = json!({
            "serverContent": {
                "modelTurn": {"parts": [{"functionCall": {"name": "draw_circle", "args": {"r": 3}}}]}
            }
        })
        .to_string();
        assert_eq!(
            classify(&raw),
            vec![ClientEvent::FunctionCall(FunctionCall {
                name: "draw_circle".to_string(),
                args: json!({"r": 3}),
            })]
        );

        let raw = json!({"toolCall": {"functionCalls": [{"name": "clear"}]}}).to_string();
        assert_eq!(
            classify(&raw),
            vec![ClientEvent::FunctionCall(FunctionCall {
                name: "clear".to_string(),
                args: Value::Null,
            })]
        );
    }

    #[test]
    fn test_interrupted() {
        let raw = r#"{"serverContent":{"interrupted":true}}"#;
        assert_eq!(classify(raw), vec![ClientEvent::Interrupted]);
    }

    #[test]
    fn test_relay_error_frame() {
        let raw = r#"{"error":"no_upstream","attempted":10,"message":"no upstream candidate accepted the connection"}"#;
        assert_eq!(
            classify(raw),
            vec![ClientEvent::RelayError {
                error: "no_upstream".to_string(),
                message: Some("no upstream candidate accepted the connection".to_string()),
            }]
        );
    }

    #[test]
    fn test_unknown_shapes_ignored() {
        assert!(classify("not json").is_empty());
        assert!(classify(r#"{"usageMetadata":{"totalTokenCount":12}}"#).is_empty());
        assert!(classify(r#"[1,2,3]"#).is_empty());
    }
}
