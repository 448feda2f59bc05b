//! 两级分类器：自由文本 → Command
//!
//! - **Tier 1**：有序正则规则，同步、纯函数，命中即返回（置信度 0.95）
//! - **Tier 2**：兜底分类（通常是 LLM），仅在 Tier 1 未命中时调用，带独立超时；
//!   失败、超时或输出不可解析时返回「澄清」命令（置信度 0.2）
//!
//! classify 永不失败，总是返回一个 Command。

mod fallback;
mod rules;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::command::{ClassifyMethod, Command};

pub use fallback::{parse_fallback_reply, FallbackClassifier, LlmFallback};
pub use rules::{Rule, RuleSet};

/// Tier 1 命中的置信度
pub const PATTERN_CONFIDENCE: f64 = 0.95;
/// Tier 2 置信度区间
pub const FALLBACK_MIN_CONFIDENCE: f64 = 0.5;
pub const FALLBACK_MAX_CONFIDENCE: f64 = 0.8;
/// 澄清命令的置信度
pub const CLARIFY_CONFIDENCE: f64 = 0.2;

/// Tier 2 默认超时
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// 分类统计（累计值）
#[derive(Debug, Default)]
struct ClassifierStats {
    pattern_hits: AtomicU64,
    fallback_hits: AtomicU64,
    clarifications: AtomicU64,
}

/// 分类统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub pattern_hits: u64,
    pub fallback_hits: u64,
    pub clarifications: u64,
}

/// 两级分类器
pub struct Classifier {
    rules: RuleSet,
    fallback: Option<Arc<dyn FallbackClassifier>>,
    fallback_timeout: Duration,
    stats: ClassifierStats,
}

impl Classifier {
    /// 仅 Tier 1；未命中时直接返回澄清命令
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            fallback: None,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            stats: ClassifierStats::default(),
        }
    }

    /// 挂载 Tier 2
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackClassifier>, timeout: Duration) -> Self {
        self.fallback = Some(fallback);
        self.fallback_timeout = timeout;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Tier 1：同步匹配，不挂起
    pub fn classify_pattern(&self, text: &str) -> Option<Command> {
        let input = text.trim();
        if input.is_empty() {
            return None;
        }
        let (rule, params) = self.rules.find(input)?;
        Some(
            Command::new(rule.agent(), rule.action(), text, ClassifyMethod::Pattern)
                .with_params(params)
                .with_confidence(PATTERN_CONFIDENCE),
        )
    }

    /// 先 Tier 1，未命中再 Tier 2
    pub async fn classify(&self, text: &str) -> Command {
        if let Some(command) = self.classify_pattern(text) {
            self.stats.pattern_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(agent = ?command.agent, action = %command.action, "pattern matched");
            return command;
        }
        self.run_fallback(text).await
    }

    /// 跳过 Tier 1，直接走 Tier 2（调用方显式要求深度分类）
    pub async fn classify_deep(&self, text: &str) -> Command {
        self.run_fallback(text).await
    }

    async fn run_fallback(&self, text: &str) -> Command {
        if text.trim().is_empty() {
            return self.clarify(text);
        }
        let Some(fallback) = &self.fallback else {
            return self.clarify(text);
        };

        match tokio::time::timeout(self.fallback_timeout, fallback.classify_fallback(text)).await {
            Ok(Ok(mut command)) => {
                // 无论实现如何，统一收敛到 Tier 2 的置信度区间
                command.confidence = if command.confidence.is_finite() {
                    command
                        .confidence
                        .clamp(FALLBACK_MIN_CONFIDENCE, FALLBACK_MAX_CONFIDENCE)
                } else {
                    FALLBACK_MIN_CONFIDENCE
                };
                command.method = ClassifyMethod::Fallback;
                command.raw_input = text.to_string();
                self.stats.fallback_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(agent = ?command.agent, action = %command.action, "fallback classified");
                command
            }
            Ok(Err(e)) => {
                tracing::warn!("Fallback classifier failed: {}", e);
                self.clarify(text)
            }
            Err(_) => {
                tracing::warn!(
                    "Fallback classifier timed out after {:?}",
                    self.fallback_timeout
                );
                self.clarify(text)
            }
        }
    }

    fn clarify(&self, text: &str) -> Command {
        self.stats.clarifications.fetch_add(1, Ordering::Relaxed);
        Command::clarify(text)
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            pattern_hits: self.stats.pattern_hits.load(Ordering::Relaxed),
            fallback_hits: self.stats.fallback_hits.load(Ordering::Relaxed),
            clarifications: self.stats.clarifications.load(Ordering::Relaxed),
        }
    }
}
