//! 错误类型
//!
//! - ErrorKind：调度结果中的错误分类（始终封装在 Response 中返回，不向调用方抛出）
//! - ConfigError：启动期配置错误，快速失败
//! - TransportError / ClassifyError：Worker 传输层与 Tier 2 分类的内部错误

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 调度失败的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 分类置信度低于阈值，需要用户换个说法
    LowConfidence,
    /// 未配置该 Agent，或已被标记为不可达
    AgentUnavailable,
    /// Worker 未在超时内回复
    Timeout,
    /// Worker 返回显式错误，或连接失败/中断
    WorkerFailure,
    /// 调用方取消
    Cancelled,
    /// Worker 回复无法解析为约定格式
    MalformedReply,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::LowConfidence => "low_confidence",
            ErrorKind::AgentUnavailable => "agent_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::WorkerFailure => "worker_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::MalformedReply => "malformed_reply",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知的 Agent 名称
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown agent: {0}")]
pub struct UnknownAgent(pub String);

/// 启动期配置错误（无 Agent、未知名称、非法正则等）
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config load failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("No agents configured")]
    NoAgents,

    #[error(transparent)]
    UnknownAgent(#[from] UnknownAgent),

    #[error("Duplicate endpoint for agent: {0}")]
    DuplicateAgent(String),

    #[error("Invalid pattern for {agent}/{action}: {source}")]
    InvalidPattern {
        agent: String,
        action: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid rules file {path}: {reason}")]
    Rules { path: PathBuf, reason: String },

    #[error("Invalid endpoint address for {agent}: {address}")]
    InvalidAddress { agent: String, address: String },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Execution log {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Worker 传输层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("Connection closed before reply")]
    Disconnected,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Malformed reply: {0}")]
    Malformed(String),
}

impl TransportError {
    /// 是否属于连接层故障（用于设置软性「不可达」标记）
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            TransportError::Connect { .. } | TransportError::Disconnected | TransportError::Send(_)
        )
    }
}

/// Tier 2 分类失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Unparsable classifier output: {0}")]
    Unparsable(String),
}
