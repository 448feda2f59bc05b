//! LLM 客户端抽象

use async_trait::async_trait;

use super::Message;
use crate::core::ClassifyError;

/// Tier 2 只需要非流式完成：一组消息进，一段文本出
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, ClassifyError>;
}
