//! Worker 端点：地址、协议、超时，以及软性「不可达」标记
//!
//! 标记只在内存中，不持久化。连接失败时置位；成功调度、健康检查通过或超过 TTL 后清除，
//! 避免把暂时掉线的 Worker 永久拉黑。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::{HttpTransport, WebSocketTransport, WorkerTransport};
use crate::command::AgentKind;
use crate::core::ConfigError;

/// 默认的「不可达」标记有效期
pub const DEFAULT_UNREACHABLE_TTL: Duration = Duration::from_secs(30);

/// 传输协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// 持久双工连接，按关联 ID 匹配回复
    #[default]
    #[serde(rename = "websocket", alias = "ws")]
    WebSocket,
    /// 每次请求一个 HTTP POST
    Http,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::WebSocket => "websocket",
            Protocol::Http => "http",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个 Worker 的端点
pub struct WorkerEndpoint {
    agent: AgentKind,
    address: String,
    timeout: Duration,
    unreachable_ttl: Duration,
    unreachable_since: Mutex<Option<Instant>>,
    transport: Arc<dyn WorkerTransport>,
}

impl WorkerEndpoint {
    /// 使用给定的传输（测试或自定义传输）
    pub fn new(
        agent: AgentKind,
        address: impl Into<String>,
        timeout: Duration,
        transport: Arc<dyn WorkerTransport>,
    ) -> Self {
        Self {
            agent,
            address: address.into(),
            timeout,
            unreachable_ttl: DEFAULT_UNREACHABLE_TTL,
            unreachable_since: Mutex::new(None),
            transport,
        }
    }

    /// 按协议创建内置传输；地址 scheme 必须与协议匹配（连接延迟到首次调度）
    pub fn from_address(
        agent: AgentKind,
        address: &str,
        protocol: Protocol,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let scheme_ok = match protocol {
            Protocol::WebSocket => address.starts_with("ws://") || address.starts_with("wss://"),
            Protocol::Http => address.starts_with("http://") || address.starts_with("https://"),
        };
        if !scheme_ok {
            return Err(ConfigError::InvalidAddress {
                agent: agent.to_string(),
                address: address.to_string(),
            });
        }

        let transport: Arc<dyn WorkerTransport> = match protocol {
            Protocol::WebSocket => Arc::new(WebSocketTransport::new(address)),
            Protocol::Http => Arc::new(HttpTransport::new(address)),
        };
        Ok(Self::new(agent, address, timeout, transport))
    }

    pub fn with_unreachable_ttl(mut self, ttl: Duration) -> Self {
        self.unreachable_ttl = ttl;
        self
    }

    pub fn agent(&self) -> AgentKind {
        self.agent
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn protocol(&self) -> Protocol {
        self.transport.protocol()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &Arc<dyn WorkerTransport> {
        &self.transport
    }

    /// 标记仍在有效期内时返回 true；过期的标记在此处被清除
    pub fn is_unreachable(&self) -> bool {
        let mut since = self
            .unreachable_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *since {
            Some(at) if at.elapsed() < self.unreachable_ttl => true,
            Some(_) => {
                *since = None;
                false
            }
            None => false,
        }
    }

    pub fn mark_unreachable(&self) {
        let mut since = self
            .unreachable_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if since.is_none() {
            tracing::warn!(agent = %self.agent, address = %self.address, "Worker marked unreachable");
        }
        *since = Some(Instant::now());
    }

    pub fn mark_reachable(&self) {
        let mut since = self
            .unreachable_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if since.take().is_some() {
            tracing::info!(agent = %self.agent, "Worker reachable again");
        }
    }
}

impl std::fmt::Debug for WorkerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerEndpoint")
            .field("agent", &self.agent)
            .field("address", &self.address)
            .field("protocol", &self.protocol())
            .field("timeout", &self.timeout)
            .finish()
    }
}
