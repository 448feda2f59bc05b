//! 结构化命令：分类器的输出、路由器的输入
//!
//! AgentKind 为封闭枚举，名称在配置加载阶段即校验，调度时不再做字符串查找。

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::UnknownAgent;

/// 目标 Agent（Worker）类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// 浏览器控制（导航、搜索）
    Browser,
    /// 桌面控制（输入、点击、截图、滚动）
    Desktop,
    /// 屏幕视觉分析
    Vision,
    /// 记忆检索与存储
    Memory,
    /// 待办事项
    Todo,
    /// 朗读 / 摘要
    Reader,
    /// 深度研究
    Research,
    /// 问答
    Brain,
    /// 系统命令（状态、退出）
    System,
}

impl AgentKind {
    pub const ALL: [AgentKind; 9] = [
        AgentKind::Browser,
        AgentKind::Desktop,
        AgentKind::Vision,
        AgentKind::Memory,
        AgentKind::Todo,
        AgentKind::Reader,
        AgentKind::Research,
        AgentKind::Brain,
        AgentKind::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Browser => "browser",
            AgentKind::Desktop => "desktop",
            AgentKind::Vision => "vision",
            AgentKind::Memory => "memory",
            AgentKind::Todo => "todo",
            AgentKind::Reader => "reader",
            AgentKind::Research => "research",
            AgentKind::Brain => "brain",
            AgentKind::System => "system",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = UnknownAgent;

    /// 大小写不敏感；接受 read / retrieval 等历史别名
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "browser" => Ok(AgentKind::Browser),
            "desktop" => Ok(AgentKind::Desktop),
            "vision" => Ok(AgentKind::Vision),
            "memory" | "retrieval" => Ok(AgentKind::Memory),
            "todo" => Ok(AgentKind::Todo),
            "reader" | "read" => Ok(AgentKind::Reader),
            "research" => Ok(AgentKind::Research),
            "brain" => Ok(AgentKind::Brain),
            "system" => Ok(AgentKind::System),
            _ => Err(UnknownAgent(s.to_string())),
        }
    }
}

/// 参数值：字符串或数字
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            ParamValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(_) => None,
        }
    }

    /// 将任意 JSON 值收敛为 ParamValue（布尔、数组、对象按 JSON 文本保存）
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => ParamValue::Text(s),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => ParamValue::Number(f),
                None => ParamValue::Text(n.to_string()),
            },
            other => ParamValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

/// 有序参数表（按键排序，序列化稳定）
pub type Params = BTreeMap<String, ParamValue>;

/// 命令来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyMethod {
    /// Tier 1 规则命中
    Pattern,
    /// Tier 2 兜底分类
    Fallback,
    /// 无法分类，需要用户澄清
    Clarify,
}

/// 分类器输出的结构化命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// 目标 Agent；澄清命令为 None
    pub agent: Option<AgentKind>,
    pub action: String,
    pub parameters: Params,
    /// 置信度，始终位于 [0, 1]
    pub confidence: f64,
    pub raw_input: String,
    pub method: ClassifyMethod,
}

/// 澄清命令的动作名
pub const CLARIFY_ACTION: &str = "clarify";

impl Command {
    pub fn new(
        agent: AgentKind,
        action: impl Into<String>,
        raw_input: impl Into<String>,
        method: ClassifyMethod,
    ) -> Self {
        Self {
            agent: Some(agent),
            action: action.into(),
            parameters: Params::new(),
            confidence: 1.0,
            raw_input: raw_input.into(),
            method,
        }
    }

    /// 终止态「澄清」命令：不指向任何 Agent，置信度 ≤ 0.3
    pub fn clarify(raw_input: impl Into<String>) -> Self {
        Self {
            agent: None,
            action: CLARIFY_ACTION.to_string(),
            parameters: Params::new(),
            confidence: crate::classifier::CLARIFY_CONFIDENCE,
            raw_input: raw_input.into(),
            method: ClassifyMethod::Clarify,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.parameters = params;
        self
    }

    /// 设置置信度；非有限值按 0 处理，其余裁剪到 [0, 1]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.parameters.get(key)
    }

    pub fn is_clarify(&self) -> bool {
        self.method == ClassifyMethod::Clarify
    }
}
