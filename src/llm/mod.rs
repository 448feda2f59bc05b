//! LLM 层：Tier 2 兜底分类使用的客户端抽象与实现

pub mod message;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod traits;

use std::sync::Arc;

use crate::config::ClassifierSection;

pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use provider::Provider;
pub use traits::LlmClient;

/// 分类只需要一个短 JSON：低温、短输出
const CLASSIFY_TEMPERATURE: f32 = 0.1;
const CLASSIFY_MAX_TOKENS: u32 = 100;

/// 按 [classifier] 段创建 Tier 2 使用的 LLM 客户端
///
/// 兜底分类关闭、provider 未知或缺少 API Key 时返回 None，分类器只跑 Tier 1。
pub fn create_llm_from_config(cfg: &ClassifierSection) -> Option<Arc<dyn LlmClient>> {
    if !cfg.fallback_enabled {
        tracing::info!("Fallback classifier disabled");
        return None;
    }

    let provider: Provider = match cfg.provider.parse() {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("{}, fallback classifier disabled", e);
            return None;
        }
    };
    let Some(api_key) = provider.api_key() else {
        tracing::warn!(
            "{} not set, fallback classifier disabled",
            provider.key_vars().join(" / ")
        );
        return None;
    };

    let base_url = cfg
        .base_url
        .as_deref()
        .unwrap_or_else(|| provider.default_base_url());
    let model = cfg
        .model
        .as_deref()
        .unwrap_or_else(|| provider.default_model());
    tracing::info!(provider = %provider, model = %model, base_url = %base_url, "Fallback classifier LLM");

    let client = OpenAiClient::new(base_url, model, &api_key)
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);
    Some(Arc::new(client))
}
