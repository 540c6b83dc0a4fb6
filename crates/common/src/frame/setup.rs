/// setup 帧
///
/// 会话的第一帧，携带模型、生成参数与系统指令。Relay 在转发前会补全模型字段并修正字段命名。

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::codec::{field, Dialect};
use super::content::Content;
use crate::models::constants::MODEL_PREFIX;

/// 会话配置（驼峰字段）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetupConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
}

/// 生成参数
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
}

/// 工具声明
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<Value>,
}

impl SetupConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
            .temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
            .max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn with_system_instruction(mut self, text: impl Into<String>) -> Self {
        self.system_instruction = Some(Content::text(None, text));
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.get_or_insert_with(Vec::new).push(tool);
        self
    }

    /// 包装为 `{"setup": {...}}` 帧
    pub fn to_frame(&self) -> Result<Value, serde_json::Error> {
        Ok(json!({ "setup": serde_json::to_value(self)? }))
    }
}

/// 去掉 `models/` 前缀
pub fn strip_model_prefix(model: &str) -> &str {
    model.strip_prefix(MODEL_PREFIX).unwrap_or(model)
}

/// 生成 `models/<id>` 资源名
pub fn qualified_model(id: &str) -> String {
    format!("{}{}", MODEL_PREFIX, strip_model_prefix(id))
}

fn has_response_modalities(setup: &Map<String, Value>) -> bool {
    if setup.contains_key("responseModalities") || setup.contains_key("response_modalities") {
        return true;
    }

    setup
        .get("generationConfig")
        .or_else(|| setup.get("generation_config"))
        .map(|config| field(config, "responseModalities", "response_modalities").is_some())
        .unwrap_or(false)
}

/// 改写 setup 帧
///
/// 返回帧中是否含有可改写的 `setup` 对象。
pub fn rewrite_setup(frame: &mut Value, resolved_model: &str, dialect: Dialect) -> bool {
    let Some(setup) = frame.get_mut("setup").and_then(Value::as_object_mut) else {
        return false;
    };

    let needs_model = match setup.get("model").and_then(Value::as_str) {
        Some(model) => !model.starts_with(MODEL_PREFIX),
        None => true,
    };
    if needs_model {
        setup.insert("model".to_string(), Value::String(qualified_model(resolved_model)));
    }

    // 放错位置的 generation_config；两者并存时保留驼峰
    if let Some(misplaced) = setup.remove("generation_config") {
        if !setup.contains_key("generationConfig") {
            setup.insert("generationConfig".to_string(), misplaced);
        }
    }

    if dialect.is_snake_case() && !has_response_modalities(setup) {
        setup.insert("responseModalities".to_string(), json!(["TEXT"]));
    }

    true
}

/// 处理一帧客户端 -> 上游 的 JSON
pub fn prepare_client_frame(mut frame: Value, resolved_model: &str, dialect: Dialect) -> Value {
    rewrite_setup(&mut frame, resolved_model, dialect);
    dialect.apply(frame)
}
