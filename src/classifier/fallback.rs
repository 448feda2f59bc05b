//! Tier 2 兜底分类
//!
//! 仅在 Tier 1 未命中（或调用方显式要求深度分类）时调用。对分类器而言是黑盒：
//! 输入文本，输出结构化 Command；输出必须是 JSON，字段只认 agent/action/params/confidence。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::command::{AgentKind, ClassifyMethod, Command, ParamValue, Params};
use crate::core::{ClassifyError, UnknownAgent};
use crate::llm::{LlmClient, Message};

use super::{FALLBACK_MAX_CONFIDENCE, FALLBACK_MIN_CONFIDENCE};

/// 只检查 LLM 输出的前 N 个字符
const MAX_REPLY_CHARS: usize = 2000;

/// 兜底分类器接口
#[async_trait]
pub trait FallbackClassifier: Send + Sync {
    async fn classify_fallback(&self, text: &str) -> Result<Command, ClassifyError>;
}

const SYSTEM_PROMPT: &str = r#"You are an intent classifier for a desktop agent suite.
Classify the user's command and return ONLY one JSON object (no markdown, no explanation):
{"agent": "browser|desktop|vision|memory|todo|reader|research|brain|system", "action": "verb", "params": {"key": "value"}, "confidence": 0.5-0.8}

Examples:
"Find GPUs on ebay" -> {"agent": "browser", "action": "search_site", "params": {"query": "GPUs", "site": "ebay"}, "confidence": 0.8}
"Add buy milk" -> {"agent": "todo", "action": "add", "params": {"item": "buy milk"}, "confidence": 0.8}
"Read this to me" -> {"agent": "reader", "action": "speak", "params": {"text": "this"}, "confidence": 0.7}
"Click submit button" -> {"agent": "desktop", "action": "click", "params": {"element": "submit button"}, "confidence": 0.8}"#;

/// 基于 LLM 的兜底分类器
pub struct LlmFallback {
    llm: Arc<dyn LlmClient>,
}

impl LlmFallback {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl FallbackClassifier for LlmFallback {
    async fn classify_fallback(&self, text: &str) -> Result<Command, ClassifyError> {
        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(format!("Command: {text}")),
        ];
        let reply = self.llm.complete(&messages).await?;
        parse_fallback_reply(&reply, text)
    }
}

#[derive(Debug, Deserialize)]
struct FallbackReply {
    #[serde(alias = "target")]
    agent: String,
    action: String,
    #[serde(default)]
    params: serde_json::Map<String, serde_json::Value>,
    confidence: Option<f64>,
}

/// 从 LLM 输出中提取首个 `{` 到最后一个 `}` 之间的 JSON 并转为 Command
///
/// 置信度缺省为上限，给出时裁剪到 [FALLBACK_MIN_CONFIDENCE, FALLBACK_MAX_CONFIDENCE]。
pub fn parse_fallback_reply(reply: &str, raw_input: &str) -> Result<Command, ClassifyError> {
    let window: String = reply.chars().take(MAX_REPLY_CHARS).collect();
    let json = match (window.find('{'), window.rfind('}')) {
        (Some(start), Some(end)) if end > start => &window[start..=end],
        _ => return Err(ClassifyError::Unparsable("no JSON object in reply".to_string())),
    };

    let parsed: FallbackReply =
        serde_json::from_str(json).map_err(|e| ClassifyError::Unparsable(e.to_string()))?;

    let agent: AgentKind = parsed
        .agent
        .parse()
        .map_err(|e: UnknownAgent| ClassifyError::Unparsable(e.to_string()))?;

    let action = parsed.action.trim();
    if action.is_empty() {
        return Err(ClassifyError::Unparsable("empty action".to_string()));
    }

    let params: Params = parsed
        .params
        .into_iter()
        .map(|(k, v)| (k, ParamValue::from_json(v)))
        .collect();

    let confidence = parsed
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(FALLBACK_MAX_CONFIDENCE)
        .clamp(FALLBACK_MIN_CONFIDENCE, FALLBACK_MAX_CONFIDENCE);

    Ok(Command::new(agent, action, raw_input, ClassifyMethod::Fallback)
        .with_params(params)
        .with_confidence(confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_parse_reply_with_noise() {
        let reply = "Sure! ```json\n{\"agent\": \"todo\", \"action\": \"add\", \"params\": {\"item\": \"buy milk\"}}\n```";
        let cmd = parse_fallback_reply(reply, "please add buy milk").unwrap();
        assert_eq!(cmd.agent, Some(AgentKind::Todo));
        assert_eq!(cmd.action, "add");
        assert_eq!(cmd.param("item").and_then(|v| v.as_text()), Some("buy milk"));
        assert_eq!(cmd.confidence, FALLBACK_MAX_CONFIDENCE);
        assert_eq!(cmd.method, ClassifyMethod::Fallback);
        assert_eq!(cmd.raw_input, "please add buy milk");
    }

    #[test]
    fn test_parse_reply_target_alias_and_clamp() {
        let reply = r#"{"target": "browser", "action": "search", "params": {"query": "gpu"}, "confidence": 0.99}"#;
        let cmd = parse_fallback_reply(reply, "x").unwrap();
        assert_eq!(cmd.agent, Some(AgentKind::Browser));
        assert_eq!(cmd.confidence, FALLBACK_MAX_CONFIDENCE);

        let reply = r#"{"agent": "browser", "action": "search", "confidence": 0.1}"#;
        let cmd = parse_fallback_reply(reply, "x").unwrap();
        assert_eq!(cmd.confidence, FALLBACK_MIN_CONFIDENCE);
    }

    #[test]
    fn test_parse_reply_rejects_unknown_agent() {
        let reply = r#"{"agent": "floater", "action": "unknown"}"#;
        assert!(matches!(
            parse_fallback_reply(reply, "x"),
            Err(ClassifyError::Unparsable(_))
        ));
    }

    #[test]
    fn test_parse_reply_rejects_non_json() {
        assert!(parse_fallback_reply("I think this is a browser command", "x").is_err());
        assert!(parse_fallback_reply("} nope {", "x").is_err());
        assert!(parse_fallback_reply(r#"{"agent": "todo", "action": "  "}"#, "x").is_err());
    }

    #[tokio::test]
    async fn test_llm_fallback_uses_client() {
        let llm = Arc::new(MockLlmClient::replying(
            r#"{"agent": "desktop", "action": "click", "params": {"element": "ok"}, "confidence": 0.7}"#,
        ));
        let fallback = LlmFallback::new(llm.clone());
        let cmd = fallback.classify_fallback("hit the ok button").await.unwrap();
        assert_eq!(cmd.agent, Some(AgentKind::Desktop));
        assert_eq!(cmd.confidence, 0.7);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_llm_fallback_propagates_llm_error() {
        let fallback = LlmFallback::new(Arc::new(MockLlmClient::failing("connection refused")));
        let err = fallback.classify_fallback("anything").await.unwrap_err();
        assert!(matches!(err, ClassifyError::Llm(msg) if msg.contains("refused")));
    }
}
