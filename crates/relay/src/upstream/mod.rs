/// 上游模块
///
/// 生成候选上游地址并选出第一个可用的上游

pub mod candidate;
pub mod selector;

pub use candidate::CandidatePlanner;
pub use selector::{SelectionError, UpstreamSelector, UpstreamStream};
