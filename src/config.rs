//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HNDL__*` 覆盖（双下划线表示嵌套，如 `HNDL__ROUTER__CONFIDENCE_THRESHOLD=0.8`）。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::classifier::{RuleSet, DEFAULT_FALLBACK_TIMEOUT};
use crate::command::AgentKind;
use crate::core::ConfigError;
use crate::router::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_DISPATCH_TIMEOUT, DEFAULT_HEALTH_CHECK_TIMEOUT,
};
use crate::worker::{Protocol, WorkerEndpoint, DEFAULT_UNREACHABLE_TTL};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub router: RouterSection,
    pub classifier: ClassifierSection,
    pub log: LogSection,
    /// Agent 名 → 端点；名称在 validate 时解析为 AgentKind
    pub agents: BTreeMap<String, AgentSection>,
}

/// [router] 段：置信度阈值与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    pub confidence_threshold: f64,
    /// 单次调度的全局默认超时（秒），可按 Agent 覆盖
    pub default_timeout_secs: u64,
    /// 「不可达」标记的有效期（秒）
    pub unreachable_ttl_secs: u64,
    pub health_check_timeout_secs: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            default_timeout_secs: DEFAULT_DISPATCH_TIMEOUT.as_secs(),
            unreachable_ttl_secs: DEFAULT_UNREACHABLE_TTL.as_secs(),
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT.as_secs(),
        }
    }
}

/// [classifier] 段：规则来源与 Tier 2 LLM
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    pub fallback_enabled: bool,
    pub fallback_timeout_secs: u64,
    /// 是否加载内置规则
    pub builtin_rules: bool,
    /// 额外规则文件（TOML，`[[rules]]`），排在内置规则之前
    pub rules_path: Option<PathBuf>,
    /// ollama / openai / deepseek
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            fallback_timeout_secs: DEFAULT_FALLBACK_TIMEOUT.as_secs(),
            builtin_rules: true,
            rules_path: None,
            provider: "ollama".to_string(),
            model: None,
            base_url: None,
        }
    }
}

impl ClassifierSection {
    /// 组装规则表：自定义规则在前，内置规则在后
    pub fn rules(&self) -> Result<RuleSet, ConfigError> {
        let mut rules = match &self.rules_path {
            Some(path) => RuleSet::load_file(path)?,
            None => RuleSet::new(),
        };
        if self.builtin_rules {
            rules.extend(RuleSet::builtin()?);
        }
        Ok(rules)
    }
}

/// [log] 段：执行日志
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// JSONL 文件；未设置时仅保存在内存
    pub path: Option<PathBuf>,
    pub max_in_memory: usize,
    pub similarity_threshold: f32,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            path: None,
            max_in_memory: crate::history::DEFAULT_MAX_IN_MEMORY,
            similarity_threshold: crate::history::DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// [agents.<name>] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    pub address: String,
    #[serde(default)]
    pub protocol: Protocol,
    /// 覆盖 router.default_timeout_secs
    pub timeout_secs: Option<u64>,
}

impl AppConfig {
    /// 启动期校验：任何一项不合法都快速失败
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::NoAgents);
        }
        let threshold = self.router.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "router.confidence_threshold",
                format!("{threshold} is outside [0, 1]"),
            ));
        }
        if !(0.0..=1.0).contains(&self.log.similarity_threshold) {
            return Err(invalid(
                "log.similarity_threshold",
                format!("{} is outside [0, 1]", self.log.similarity_threshold),
            ));
        }
        for (field, value) in [
            ("router.default_timeout_secs", self.router.default_timeout_secs),
            ("router.health_check_timeout_secs", self.router.health_check_timeout_secs),
            ("classifier.fallback_timeout_secs", self.classifier.fallback_timeout_secs),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero".to_string()));
            }
        }
        if self.log.max_in_memory == 0 {
            return Err(invalid("log.max_in_memory", "must be greater than zero".to_string()));
        }

        self.classifier.rules()?;
        self.endpoints()?;
        Ok(())
    }

    /// 解析 [agents]：名称转为 AgentKind，地址按协议校验；别名重复（如 read 与 reader）视为重复配置
    pub fn endpoints(&self) -> Result<Vec<WorkerEndpoint>, ConfigError> {
        let default_timeout = self.router.default_timeout_secs;
        let ttl = Duration::from_secs(self.router.unreachable_ttl_secs);

        let mut seen = Vec::new();
        let mut endpoints = Vec::with_capacity(self.agents.len());
        for (name, section) in &self.agents {
            let agent: AgentKind = name.parse()?;
            if seen.contains(&agent) {
                return Err(ConfigError::DuplicateAgent(agent.to_string()));
            }
            seen.push(agent);

            let timeout_secs = section.timeout_secs.unwrap_or(default_timeout);
            if timeout_secs == 0 {
                return Err(invalid(
                    &format!("agents.{name}.timeout_secs"),
                    "must be greater than zero".to_string(),
                ));
            }
            let endpoint = WorkerEndpoint::from_address(
                agent,
                &section.address,
                section.protocol,
                Duration::from_secs(timeout_secs),
            )?
            .with_unreachable_ttl(ttl);
            endpoints.push(endpoint);
        }
        Ok(endpoints)
    }
}

fn invalid(field: &str, reason: String) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason,
    }
}

/// 从 config 目录加载配置，环境变量 HNDL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HNDL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignoring", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HNDL")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置；是否用新配置重建 Router 由调用方决定
pub fn reload_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    load_config(config_path)
}
