//! 调度结果
//!
//! 所有失败都以 Response 的形式返回，调用方无需处理 Err。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::AgentKind;
use crate::core::ErrorKind;

/// 失败信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    /// 相关 Agent（若已知）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentKind>,
}

/// Router 的输出
///
/// `result` 仅在成功时存在，`error` 仅在失败时存在。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// 与 ExecutionRecord.id 一致
    pub execution_id: String,
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
}

impl Response {
    pub fn succeeded(execution_id: impl Into<String>, result: Value, elapsed: Duration) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            execution_id: execution_id.into(),
            elapsed,
        }
    }

    pub fn failed(
        execution_id: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        agent: Option<AgentKind>,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(ErrorInfo {
                kind,
                message: message.into(),
                agent,
            }),
            execution_id: execution_id.into(),
            elapsed,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// 面向用户的提示
    ///
    /// - LowConfidence / MalformedReply：请用户换个说法
    /// - AgentUnavailable / Timeout / WorkerFailure：点名受影响的 Agent
    /// - Cancelled 与成功：不提示
    pub fn user_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        let agent = error
            .agent
            .map(|a| a.to_string())
            .unwrap_or_else(|| "requested".to_string());
        match error.kind {
            ErrorKind::LowConfidence | ErrorKind::MalformedReply => Some(
                "I'm not sure what you meant. Could you rephrase that?".to_string(),
            ),
            ErrorKind::AgentUnavailable => {
                Some(format!("The {agent} agent is unavailable right now."))
            }
            ErrorKind::Timeout => Some(format!("The {agent} agent did not respond in time.")),
            ErrorKind::WorkerFailure => Some(format!(
                "The {agent} agent reported a problem: {}",
                error.message
            )),
            ErrorKind::Cancelled => None,
        }
    }
}

/// Duration 以毫秒整数序列化
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
