//! Router / Dispatcher：校验 Command 并调度到对应 Worker
//!
//! 状态机：
//! - Received → Clarify（置信度低于阈值或澄清命令）→ LowConfidence
//! - Received → Unconfigured（未配置或被标记为不可达）→ AgentUnavailable
//! - Received → Dispatching → Succeeded / TimedOut / WorkerError / Cancelled / MalformedReply
//!
//! 每个终态都恰好追加一条 ExecutionRecord；进入 Dispatching 的调用恰好发出一次 Worker 请求，不自动重试。

mod builder;
mod response;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classifier::{Classifier, StatsSnapshot};
use crate::command::{AgentKind, Command};
use crate::core::{ErrorKind, TransportError};
use crate::history::{ExecutionLog, ExecutionRecord};
use crate::worker::{WorkerEndpoint, WorkerReply, WorkerRequest};

pub use builder::RouterBuilder;
pub use response::{ErrorInfo, Response};

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;
/// 默认单次调度超时
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);
/// 默认健康检查超时
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// 调度失败（内部），最终折叠进 Response
struct Failure {
    kind: ErrorKind,
    message: String,
}

impl Failure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// 单个 Worker 的健康检查结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub agent: AgentKind,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    fn up(agent: AgentKind, latency: Duration) -> Self {
        Self {
            agent,
            healthy: true,
            latency_ms: Some(latency.as_millis() as u64),
            error: None,
        }
    }

    fn down(agent: AgentKind, error: impl Into<String>) -> Self {
        Self {
            agent,
            healthy: false,
            latency_ms: None,
            error: Some(error.into()),
        }
    }
}

pub struct Router {
    classifier: Classifier,
    endpoints: BTreeMap<AgentKind, Arc<WorkerEndpoint>>,
    log: ExecutionLog,
    confidence_threshold: f64,
    health_check_timeout: Duration,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// 分类 + 调度，唯一的公共入口
    pub async fn process(&self, text: &str) -> Response {
        self.process_with_cancel(text, &CancellationToken::new()).await
    }

    /// 同 process，调用方可通过 token 取消进行中的调度
    pub async fn process_with_cancel(&self, text: &str, cancel: &CancellationToken) -> Response {
        self.classify_and_dispatch(text, false, cancel).await
    }

    /// 跳过规则，直接使用兜底分类后调度
    pub async fn process_deep(&self, text: &str, cancel: &CancellationToken) -> Response {
        self.classify_and_dispatch(text, true, cancel).await
    }

    /// Tier 2 分类期间同样响应取消，并记录一条 Cancelled
    async fn classify_and_dispatch(
        &self,
        text: &str,
        deep: bool,
        cancel: &CancellationToken,
    ) -> Response {
        let started = Instant::now();
        let classify = async {
            if deep {
                self.classifier.classify_deep(text).await
            } else {
                self.classifier.classify(text).await
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let command = self
                    .classifier
                    .classify_pattern(text)
                    .unwrap_or_else(|| Command::clarify(text));
                let failure = Failure::new(ErrorKind::Cancelled, "cancelled during classification");
                self.conclude(Uuid::new_v4().to_string(), command, Err(failure), started.elapsed())
            }
            command = classify => self.dispatch_with_cancel(command, cancel).await,
        }
    }

    pub async fn classify(&self, text: &str) -> Command {
        self.classifier.classify(text).await
    }

    pub async fn dispatch(&self, command: Command) -> Response {
        self.dispatch_with_cancel(command, &CancellationToken::new()).await
    }

    /// 调度一条命令；永不返回 Err，所有失败都在 Response 中
    pub async fn dispatch_with_cancel(&self, command: Command, cancel: &CancellationToken) -> Response {
        let execution_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let outcome = self.run(&execution_id, &command, cancel).await;
        self.conclude(execution_id, command, outcome, started.elapsed())
    }

    /// 终态：生成 Response、审计并追加执行记录
    fn conclude(
        &self,
        execution_id: String,
        command: Command,
        outcome: Result<Value, Failure>,
        elapsed: Duration,
    ) -> Response {
        let response = match outcome {
            Ok(content) => Response::succeeded(execution_id, content, elapsed),
            Err(f) => Response::failed(execution_id, f.kind, f.message, command.agent, elapsed),
        };

        audit(&command, &response);
        self.log.append(ExecutionRecord::new(command, response.clone()));
        response
    }

    async fn run(
        &self,
        execution_id: &str,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<Value, Failure> {
        // NaN 与无穷大同样视为置信度不足
        let confident =
            command.confidence.is_finite() && command.confidence >= self.confidence_threshold;
        if command.is_clarify() || !confident {
            return Err(Failure::new(
                ErrorKind::LowConfidence,
                format!(
                    "confidence {:.2} below threshold {:.2}",
                    command.confidence, self.confidence_threshold
                ),
            ));
        }

        let Some(agent) = command.agent else {
            return Err(Failure::new(ErrorKind::AgentUnavailable, "no agent named"));
        };
        let Some(endpoint) = self.endpoints.get(&agent) else {
            return Err(Failure::new(
                ErrorKind::AgentUnavailable,
                format!("no worker configured for {agent}"),
            ));
        };
        if endpoint.is_unreachable() {
            return Err(Failure::new(
                ErrorKind::AgentUnavailable,
                format!("{agent} worker is marked unreachable"),
            ));
        }
        if cancel.is_cancelled() {
            return Err(Failure::new(ErrorKind::Cancelled, "cancelled before dispatch"));
        }

        tracing::debug!(agent = %agent, action = %command.action, id = %execution_id, "Dispatching");
        let request = WorkerRequest::command(execution_id, command);
        let transport = endpoint.transport();
        let call = tokio::time::timeout(endpoint.timeout(), transport.call(request));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let transport = Arc::clone(transport);
                let id = execution_id.to_string();
                tokio::spawn(async move { transport.notify_cancel(&id).await });
                Err(Failure::new(ErrorKind::Cancelled, "cancelled by caller"))
            }
            outcome = call => settle(endpoint, outcome),
        }
    }

    pub fn history(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.log.recent(limit)
    }

    /// 仅作建议：不会据此跳过分类或调度
    pub fn find_similar(&self, text: &str) -> Option<ExecutionRecord> {
        self.log.find_similar(text)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.classifier.stats()
    }

    pub fn agents(&self) -> Vec<AgentKind> {
        self.endpoints.keys().copied().collect()
    }

    pub fn endpoint(&self, agent: AgentKind) -> Option<&WorkerEndpoint> {
        self.endpoints.get(&agent).map(Arc::as_ref)
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    /// 显式健康检查：ping → pong
    ///
    /// 不受「不可达」标记影响；收到任何合法回复即清除标记，连接失败则置位。
    pub async fn health_check(&self, agent: AgentKind) -> HealthStatus {
        let Some(endpoint) = self.endpoints.get(&agent) else {
            return HealthStatus::down(agent, "not configured");
        };

        let started = Instant::now();
        let ping = WorkerRequest::ping(Uuid::new_v4().to_string());
        match tokio::time::timeout(self.health_check_timeout, endpoint.transport().call(ping)).await {
            Ok(Ok(WorkerReply::Pong { .. })) => {
                endpoint.mark_reachable();
                HealthStatus::up(agent, started.elapsed())
            }
            Ok(Ok(other)) => {
                endpoint.mark_reachable();
                HealthStatus::down(agent, format!("unexpected reply to ping: {other:?}"))
            }
            Ok(Err(e)) => {
                if e.is_connection_failure() {
                    endpoint.mark_unreachable();
                }
                HealthStatus::down(agent, e.to_string())
            }
            Err(_) => HealthStatus::down(
                agent,
                format!("no pong within {:?}", self.health_check_timeout),
            ),
        }
    }

    /// 并发检查所有已配置的 Worker
    pub async fn health_check_all(&self) -> Vec<HealthStatus> {
        let checks = self.endpoints.keys().map(|agent| self.health_check(*agent));
        futures_util::future::join_all(checks).await
    }
}

/// 将 Worker 往返的结果映射为调度结果，并维护「不可达」标记
fn settle(
    endpoint: &WorkerEndpoint,
    outcome: Result<Result<WorkerReply, TransportError>, Elapsed>,
) -> Result<Value, Failure> {
    let agent = endpoint.agent();
    match outcome {
        Err(_) => Err(Failure::new(
            ErrorKind::Timeout,
            format!("{agent} did not reply within {:?}", endpoint.timeout()),
        )),
        Ok(Ok(WorkerReply::Result { content, .. })) => {
            endpoint.mark_reachable();
            Ok(content)
        }
        Ok(Ok(WorkerReply::Error { message, .. })) => {
            endpoint.mark_reachable();
            Err(Failure::new(ErrorKind::WorkerFailure, message))
        }
        Ok(Ok(WorkerReply::Pong { .. })) => Err(Failure::new(
            ErrorKind::MalformedReply,
            "pong received in reply to a command",
        )),
        Ok(Err(e)) if e.is_connection_failure() => {
            endpoint.mark_unreachable();
            Err(Failure::new(ErrorKind::WorkerFailure, e.to_string()))
        }
        Ok(Err(e)) => Err(Failure::new(ErrorKind::MalformedReply, e.to_string())),
    }
}

/// 结构化审计日志（每次调度一条）
fn audit(command: &Command, response: &Response) {
    let outcome = response
        .error_kind()
        .map(|k| k.as_str())
        .unwrap_or("success");
    let audit = serde_json::json!({
        "event": "dispatch_audit",
        "execution_id": response.execution_id,
        "agent": command.agent.map(|a| a.as_str()),
        "action": command.action,
        "method": command.method,
        "confidence": command.confidence,
        "ok": response.success,
        "outcome": outcome,
        "duration_ms": response.elapsed.as_millis() as u64,
        "params_preview": params_preview(command),
    });
    tracing::info!(audit = %audit, "dispatch");
}

fn params_preview(command: &Command) -> String {
    let s = serde_json::to_string(&command.parameters).unwrap_or_default();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
