/// 帧模块
///
/// Live 协议帧的方言转换、setup 帧改写以及内容帧构造

pub mod close;
pub mod codec;
pub mod content;
pub mod setup;

pub use close::{CloseCode, NoUpstreamPayload};
pub use codec::{field, to_service_dialect, Dialect, SERVICE_KEY_MAP};
pub use content::{ClientContent, Content, FunctionCall, InlineData, Part};
pub use setup::{
    prepare_client_frame, qualified_model, rewrite_setup, strip_model_prefix, GenerationConfig,
    SetupConfig, Tool,
};
