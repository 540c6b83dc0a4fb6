/// 上游候选地址
///
/// 同一个上游服务存在多种历史/备用协议入口，按固定顺序生成候选列表。

use common::frame::strip_model_prefix;
use common::models::constants::{FALLBACK_MODELS, SERVICE_NAMESPACE};
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// 上游候选
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamCandidate {
    pub url: String,
    pub requires_snake_case: bool,
}

impl UpstreamCandidate {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let requires_snake_case = is_service_path(&url);
        Self {
            url,
            requires_snake_case,
        }
    }

    /// URL 路径中携带的模型
    pub fn model(&self) -> Option<String> {
        model_from_url(&self.url)
    }
}

/// 是否是 GenerativeService 双向流入口（服务方言）
pub fn is_service_path(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());

    path.contains("GenerativeService") && path.contains("BidiGenerateContent")
}

/// 从 `.../models/<model>:method` 形式的路径中提取模型
pub fn model_from_url(url: &str) -> Option<String> {
    let path = Url::parse(url).ok()?.path().to_string();
    let (_, rest) = path.split_once("/models/")?;
    let model: String = rest
        .chars()
        .take_while(|c| *c != ':' && *c != '/')
        .collect();

    if model.is_empty() {
        None
    } else {
        Some(model)
    }
}

/// 候选列表生成器
#[derive(Clone)]
pub struct CandidatePlanner {
    base_url: String,
    api_key: String,
    preferred_model: String,
    fallback_models: Vec<String>,
}

impl CandidatePlanner {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        preferred_model: impl Into<String>,
    ) -> Self {
        let preferred_model = preferred_model.into();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            preferred_model: strip_model_prefix(&preferred_model).to_string(),
            fallback_models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn with_fallback_models(mut self, models: Vec<String>) -> Self {
        self.fallback_models = models;
        self
    }

    pub fn preferred_model(&self) -> &str {
        &self.preferred_model
    }

    fn key_query(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("key", &self.api_key)
            .finish()
    }

    /// 按尝试顺序生成去重后的候选列表
    pub fn candidates(&self) -> Vec<UpstreamCandidate> {
        let query = self.key_query();
        let mut urls = vec![
            format!(
                "{}/ws/{}.GenerativeService/BidiGenerateContent?{}",
                self.base_url, SERVICE_NAMESPACE, query
            ),
            format!(
                "{}/ws/{}.GenerativeService.BidiGenerateContent?{}",
                self.base_url, SERVICE_NAMESPACE, query
            ),
        ];

        let models = std::iter::once(self.preferred_model.as_str())
            .chain(self.fallback_models.iter().map(|m| strip_model_prefix(m)));
        for model in models {
            for method in ["streamGenerateContent", "generateContent"] {
                urls.push(format!(
                    "{}/ws/v1beta/models/{}:{}?{}",
                    self.base_url, model, method, query
                ));
            }
        }

        let mut seen = HashSet::new();
        urls.into_iter()
            .filter(|url| seen.insert(url.clone()))
            .map(UpstreamCandidate::new)
            .collect()
    }
}

impl fmt::Debug for CandidatePlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidatePlanner")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("preferred_model", &self.preferred_model)
            .field("fallback_models", &self.fallback_models)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> CandidatePlanner {
        CandidatePlanner::new("wss://example.com/", "k1", "gemini-2.5-flash")
    }

    #[test]
    fn test_candidate_order() {
        let candidates = planner().candidates();

        assert_eq!(
            candidates[0].url,
            "wss://example.com/ws/google.ai.generativelanguage.v1beta.GenerativeService/BidiGenerateContent?key=k1"
        );
        assert_eq!(
            candidates[1].url,
            "wss://example.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent?key=k1"
        );
        assert_eq!(
            candidates[2].url,
            "wss://example.com/ws/v1beta/models/gemini-2.5-flash:streamGenerateContent?key=k1"
        );
        assert_eq!(
            candidates[3].url,
            "wss://example.com/ws/v1beta/models/gemini-2.5-flash:generateContent?key=k1"
        );
        // 2 个服务入口 + 4 个模型 x 2 个方法
        assert_eq!(candidates.len(), 10);
    }

    #[test]
    fn test_snake_case_only_for_service_paths() {
        let candidates = planner().candidates();
        assert!(candidates[0].requires_snake_case);
        assert!(candidates[1].requires_snake_case);
        assert!(candidates[2..].iter().all(|c| !c.requires_snake_case));
    }

    #[test]
    fn test_deduplicates_preferred_fallback() {
        let candidates = CandidatePlanner::new("wss://example.com", "k", "models/gemini-1.5-flash")
            .with_fallback_models(vec!["gemini-1.5-flash".into(), "gemini-1.5-pro".into()])
            .candidates();

        let urls: HashSet<_> = candidates.iter().map(|c| c.url.clone()).collect();
        assert_eq!(urls.len(), candidates.len());
        assert_eq!(candidates.len(), 2 + 2 * 2);
        assert_eq!(candidates[2].model().as_deref(), Some("gemini-1.5-flash"));
        assert_eq!(candidates[4].model().as_deref(), Some("gemini-1.5-pro"));
    }

    #[test]
    fn test_model_from_url() {
        assert_eq!(
            model_from_url("wss://h/ws/v1beta/models/gemini-x:streamGenerateContent?key=a").as_deref(),
            Some("gemini-x")
        );
        assert_eq!(
            model_from_url("wss://h/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent?key=a"),
            None
        );
        assert_eq!(model_from_url("not a url"), None);
    }

    #[test]
    fn test_key_is_url_encoded() {
        let candidates = CandidatePlanner::new("wss://example.com", "a b&c", "m").candidates();
        assert!(candidates[0].url.ends_with("?key=a+b%26c"));
    }

    #[test]
    fn test_debug_hides_key() {
        let debug = format!("{:?}", planner());
        assert!(!debug.contains("k1"));
    }
}
