//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 固定返回同一段文本或同一个错误，并记录调用次数。

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{LlmClient, Message};
use crate::core::ClassifyError;

#[derive(Debug)]
pub struct MockLlmClient {
    reply: Result<String, ClassifyError>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    /// 每次调用都返回 `reply`
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// 每次调用都以 `ClassifyError::Llm` 失败
    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            reply: Err(ClassifyError::Llm(error.into())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}
