//! 集成测试共用：可编排行为的内存传输

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hndl::command::AgentKind;
use hndl::core::TransportError;
use hndl::worker::{Protocol, WorkerEndpoint, WorkerReply, WorkerRequest, WorkerTransport};
use serde_json::{json, Value};

/// 下一次调用的行为
#[derive(Debug, Clone)]
pub enum Behavior {
    /// 回复 result，content 为 `{"action": .., "params": ..}`
    Echo,
    /// 延迟后回显
    Delayed(Duration),
    /// 回复 error
    Fail(String),
    /// 永不回复
    Hang,
    /// 连接失败
    Refuse,
    /// 回复格式错误
    Garbage,
}

pub struct ScriptedTransport {
    behavior: Mutex<Behavior>,
    calls: Mutex<Vec<WorkerRequest>>,
    cancels: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            calls: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// 收到的 command 请求（不含 ping）
    pub fn commands(&self) -> Vec<WorkerRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches!(r, WorkerRequest::Command { .. }))
            .cloned()
            .collect()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().unwrap().clone()
    }
}

fn echo(request: &WorkerRequest) -> WorkerReply {
    match request {
        WorkerRequest::Command { id, action, params } => WorkerReply::Result {
            id: Some(id.clone()),
            content: json!({ "action": action, "params": params }),
        },
        WorkerRequest::Ping { id } | WorkerRequest::Cancel { id } => {
            WorkerReply::Pong { id: Some(id.clone()) }
        }
    }
}

#[async_trait]
impl WorkerTransport for ScriptedTransport {
    async fn call(&self, request: WorkerRequest) -> Result<WorkerReply, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            Behavior::Echo => Ok(echo(&request)),
            Behavior::Delayed(delay) => {
                tokio::time::sleep(delay).await;
                Ok(echo(&request))
            }
            Behavior::Fail(message) => Ok(WorkerReply::Error {
                id: Some(request.id().to_string()),
                message,
            }),
            Behavior::Hang => std::future::pending().await,
            Behavior::Refuse => Err(TransportError::Connect {
                address: "scripted".into(),
                reason: "connection refused".into(),
            }),
            Behavior::Garbage => Err(TransportError::Malformed("expected value at line 1".into())),
        }
    }

    async fn notify_cancel(&self, id: &str) {
        self.cancels.lock().unwrap().push(id.to_string());
    }

    fn protocol(&self) -> Protocol {
        Protocol::WebSocket
    }
}

pub fn endpoint(agent: AgentKind, transport: &Arc<ScriptedTransport>, timeout: Duration) -> WorkerEndpoint {
    WorkerEndpoint::new(agent, format!("scripted://{agent}"), timeout, transport.clone())
}

/// content 中回显的参数
pub fn echoed_params(result: &Option<Value>) -> Value {
    result
        .as_ref()
        .and_then(|v| v.get("params"))
        .cloned()
        .unwrap_or(Value::Null)
}

/// 轮询等待条件成立（用于后台发送的取消通知）
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
