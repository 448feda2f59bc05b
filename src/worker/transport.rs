//! Worker 传输抽象
//!
//! 一次 call 对应一次出站请求；超时与取消由 Router 在外层控制，传输层只负责收发与按 ID 关联。

use async_trait::async_trait;

use super::{Protocol, WorkerReply, WorkerRequest};
use crate::core::TransportError;

#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// 发送请求并等待对应 ID 的回复
    async fn call(&self, request: WorkerRequest) -> Result<WorkerReply, TransportError>;

    /// 尽力发送取消通知；不支持时为空操作
    async fn notify_cancel(&self, _id: &str) {}

    fn protocol(&self) -> Protocol;
}
