/// 帧方言编解码
///
/// 客户端统一使用驼峰（model 方言）字段，服务方言的上游需要下划线字段。
/// 映射表是固定的，未知字段原样保留。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 上游方言
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// 驼峰字段（按模型路径访问的上游）
    Model,
    /// 下划线字段（GenerativeService 双向流上游）
    Service,
}

impl Dialect {
    pub fn from_snake_case(use_snake_case: bool) -> Self {
        if use_snake_case {
            Self::Service
        } else {
            Self::Model
        }
    }

    pub fn is_snake_case(&self) -> bool {
        matches!(self, Self::Service)
    }

    /// 按方言转换一帧
    pub fn apply(&self, frame: Value) -> Value {
        match self {
            Self::Model => frame,
            Self::Service => to_service_dialect(frame),
        }
    }
}

/// 驼峰 -> 下划线 字段映射表
pub const SERVICE_KEY_MAP: &[(&str, &str)] = &[
    ("generationConfig", "generation_config"),
    ("systemInstruction", "system_instruction"),
    ("clientContent", "client_content"),
    ("turnComplete", "turn_complete"),
    ("inlineData", "inline_data"),
    ("mimeType", "mime_type"),
    ("responseModalities", "response_modalities"),
    ("maxOutputTokens", "max_output_tokens"),
    ("topP", "top_p"),
    ("topK", "top_k"),
    ("functionDeclarations", "function_declarations"),
    ("realtimeInput", "realtime_input"),
    ("mediaChunks", "media_chunks"),
    ("toolResponse", "tool_response"),
    ("functionResponses", "function_responses"),
];

/// 查询驼峰字段对应的下划线字段
pub fn service_key(key: &str) -> Option<&'static str> {
    SERVICE_KEY_MAP
        .iter()
        .find(|(camel, _)| *camel == key)
        .map(|(_, snake)| *snake)
}

/// 递归地把已知驼峰字段改写为下划线字段
///
/// 同一对象中驼峰与下划线字段同时存在时，以驼峰字段的值为准。
pub fn to_service_dialect(frame: Value) -> Value {
    match frame {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            let mut renamed = Vec::new();

            for (key, value) in map {
                match service_key(&key) {
                    Some(snake) => renamed.push((snake, value)),
                    None => {
                        out.insert(key, to_service_dialect(value));
                    }
                }
            }

            for (snake, value) in renamed {
                out.insert(snake.to_string(), to_service_dialect(value));
            }

            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(to_service_dialect).collect()),
        other => other,
    }
}

/// 按 驼峰优先、其次下划线 的顺序读取字段
pub fn field<'a>(obj: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel).or_else(|| obj.get(snake))
}
