//! Worker 线协议（JSON）
//!
//! 请求：`{"type":"command","id":"..","action":"..","params":{..}}`，另有 `cancel` / `ping`；
//! 回复：`{"type":"result","id":"..","content":<any>}`、`{"type":"error","id":"..","message":".."}`、`{"type":"pong","id":".."}`。
//! 回复必须带显式的 `type`，缺字段或未知类型一律视为格式错误。
//! 兼容旧版 Worker 的字段名：`command_id`（= `id`）、`data`（= `content`）、`error_message`（= `message`）。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::{Command, Params};
use crate::core::TransportError;

/// Router → Worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Command {
        id: String,
        action: String,
        #[serde(default)]
        params: Params,
    },
    /// 尽力而为的取消通知，Worker 可忽略
    Cancel { id: String },
    /// 健康检查
    Ping { id: String },
}

impl WorkerRequest {
    pub fn command(id: impl Into<String>, command: &Command) -> Self {
        WorkerRequest::Command {
            id: id.into(),
            action: command.action.clone(),
            params: command.parameters.clone(),
        }
    }

    pub fn ping(id: impl Into<String>) -> Self {
        WorkerRequest::Ping { id: id.into() }
    }

    pub fn cancel(id: impl Into<String>) -> Self {
        WorkerRequest::Cancel { id: id.into() }
    }

    /// 关联 ID
    pub fn id(&self) -> &str {
        match self {
            WorkerRequest::Command { id, .. }
            | WorkerRequest::Cancel { id }
            | WorkerRequest::Ping { id } => id,
        }
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Send(e.to_string()))
    }
}

/// Worker → Router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    Result {
        #[serde(default, alias = "command_id", skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(alias = "data")]
        content: Value,
    },
    Error {
        #[serde(default, alias = "command_id", skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(alias = "error_message")]
        message: String,
    },
    Pong {
        #[serde(default, alias = "command_id", skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl WorkerReply {
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        serde_json::from_str(text).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    pub fn from_value(value: Value) -> Result<Self, TransportError> {
        serde_json::from_value(value).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            WorkerReply::Result { id, .. }
            | WorkerReply::Error { id, .. }
            | WorkerReply::Pong { id } => id.as_deref(),
        }
    }
}
