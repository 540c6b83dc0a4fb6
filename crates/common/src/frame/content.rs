/// 内容帧
///
/// 客户端内容帧（clientContent）与模型回复中的内容片段。
/// 反序列化时同时接受驼峰与下划线字段。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::Role;

/// 一轮对话内容
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(default)]
    pub parts: Vec<Part>,
}

/// 内容片段
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", alias = "inline_data")]
    pub inline_data: Option<InlineData>,

    #[serde(skip_serializing_if = "Option::is_none", alias = "function_call")]
    pub function_call: Option<FunctionCall>,
}

/// 内联二进制数据（base64）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(alias = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

/// 模型发起的函数调用
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// 客户端内容帧
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

impl Content {
    pub fn text(role: Option<Role>, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
        }
    }

    /// 第一个文本片段
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| part.text.as_deref())
    }
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn inline(data: InlineData) -> Self {
        Self {
            inline_data: Some(data),
            ..Default::default()
        }
    }
}

impl InlineData {
    /// 从原始字节构造（base64 编码）
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }
}

impl ClientContent {
    /// 用户文本轮次
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            turns: vec![Content::text(Some(Role::User), text)],
            turn_complete: true,
        }
    }

    /// 用户图像轮次（可附带提示文本）
    pub fn user_image(mime_type: &str, bytes: &[u8], prompt: Option<&str>) -> Self {
        let mut parts = vec![Part::inline(InlineData::from_bytes(mime_type, bytes))];
        if let Some(prompt) = prompt {
            parts.push(Part::text(prompt));
        }

        Self {
            turns: vec![Content {
                role: Some(Role::User),
                parts,
            }],
            turn_complete: true,
        }
    }

    /// 包装为 `{"clientContent": {...}}` 帧
    pub fn to_frame(&self) -> Result<Value, serde_json::Error> {
        Ok(json!({ "clientContent": serde_json::to_value(self)? }))
    }
}
