//! 执行记录：日志中的一行

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::router::Response;

/// 一次调度的完整记录，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// 与 Response.execution_id 一致
    pub id: String,
    pub input: String,
    pub command: Command,
    pub response: Response,
    /// Unix 毫秒
    pub timestamp: i64,
}

impl ExecutionRecord {
    pub fn new(command: Command, response: Response) -> Self {
        Self {
            id: response.execution_id.clone(),
            input: command.raw_input.clone(),
            command,
            response,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.response.success
    }
}
