//! Router 构建器：手动组装（测试、嵌入）或从 AppConfig 构建

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::{Router, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_HEALTH_CHECK_TIMEOUT};
use crate::classifier::{Classifier, LlmFallback, RuleSet};
use crate::command::AgentKind;
use crate::config::AppConfig;
use crate::core::ConfigError;
use crate::history::ExecutionLog;
use crate::llm::create_llm_from_config;
use crate::worker::WorkerEndpoint;

pub struct RouterBuilder {
    classifier: Option<Classifier>,
    endpoints: BTreeMap<AgentKind, Arc<WorkerEndpoint>>,
    duplicate: Option<AgentKind>,
    log: Option<ExecutionLog>,
    confidence_threshold: f64,
    health_check_timeout: Duration,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            classifier: None,
            endpoints: BTreeMap::new(),
            duplicate: None,
            log: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            health_check_timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
        }
    }

    /// 未设置时使用仅含内置规则、无兜底的分类器
    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// 注册 Worker 端点；同一 Agent 注册两次在 build 时报错
    pub fn endpoint(mut self, endpoint: WorkerEndpoint) -> Self {
        let agent = endpoint.agent();
        if self.endpoints.insert(agent, Arc::new(endpoint)).is_some() {
            self.duplicate.get_or_insert(agent);
        }
        self
    }

    pub fn log(mut self, log: ExecutionLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = timeout;
        self
    }

    /// 启动期校验，失败即返回 ConfigError
    pub fn build(self) -> Result<Router, ConfigError> {
        if let Some(agent) = self.duplicate {
            return Err(ConfigError::DuplicateAgent(agent.to_string()));
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoAgents);
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid {
                field: "router.confidence_threshold".into(),
                reason: format!("{} is outside [0, 1]", self.confidence_threshold),
            });
        }

        let classifier = match self.classifier {
            Some(c) => c,
            None => Classifier::new(RuleSet::builtin()?),
        };

        Ok(Router {
            classifier,
            endpoints: self.endpoints,
            log: self.log.unwrap_or_default(),
            confidence_threshold: self.confidence_threshold,
            health_check_timeout: self.health_check_timeout,
        })
    }
}

impl Router {
    /// 按配置构建：校验 → 规则表 → 兜底 LLM → 端点 → 执行日志
    pub async fn from_config(cfg: &AppConfig) -> Result<Router, ConfigError> {
        cfg.validate()?;

        let mut classifier = Classifier::new(cfg.classifier.rules()?);
        if let Some(llm) = create_llm_from_config(&cfg.classifier) {
            classifier = classifier.with_fallback(
                Arc::new(LlmFallback::new(llm)),
                Duration::from_secs(cfg.classifier.fallback_timeout_secs),
            );
        }

        let log = match &cfg.log.path {
            Some(path) => {
                ExecutionLog::open(path, cfg.log.max_in_memory, cfg.log.similarity_threshold).await?
            }
            None => ExecutionLog::with_limits(cfg.log.max_in_memory, cfg.log.similarity_threshold),
        };

        let mut builder = Router::builder()
            .classifier(classifier)
            .log(log)
            .confidence_threshold(cfg.router.confidence_threshold)
            .health_check_timeout(Duration::from_secs(cfg.router.health_check_timeout_secs));
        for endpoint in cfg.endpoints()? {
            tracing::info!(
                agent = %endpoint.agent(),
                address = %endpoint.address(),
                protocol = %endpoint.protocol(),
                "Worker endpoint registered"
            );
            builder = builder.endpoint(endpoint);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Protocol;

    fn endpoint(agent: AgentKind) -> WorkerEndpoint {
        WorkerEndpoint::from_address(agent, "ws://127.0.0.1:9", Protocol::WebSocket, Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn test_no_agents_fails_fast() {
        assert!(matches!(Router::builder().build(), Err(ConfigError::NoAgents)));
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let err = Router::builder()
            .endpoint(endpoint(AgentKind::Browser))
            .endpoint(endpoint(AgentKind::Browser))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::DuplicateAgent(a) if a == "browser"));
    }

    #[test]
    fn test_threshold_range_checked() {
        let err = Router::builder()
            .endpoint(endpoint(AgentKind::Todo))
            .confidence_threshold(1.5)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_defaults() {
        let router = Router::builder()
            .endpoint(endpoint(AgentKind::Todo))
            .endpoint(endpoint(AgentKind::Browser))
            .build()
            .unwrap();
        assert_eq!(router.confidence_threshold(), DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(router.agents(), vec![AgentKind::Browser, AgentKind::Todo]);
        assert!(router.history(10).is_empty());
    }
}
