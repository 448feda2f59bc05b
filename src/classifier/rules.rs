//! Tier 1 规则表
//!
//! 有序映射：Agent → [(正则, 动作)]。匹配规则：
//! - 大小写不敏感，且必须匹配整条输入（自动加 `^(?:...)$`）
//! - 按 Agent 声明顺序、再按规则声明顺序遍历，首个命中者胜出
//! - 命名捕获组写入参数；声明为数字的槽位能解析时输出数字

use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::command::{AgentKind, ParamValue, Params};
use crate::core::ConfigError;

/// 单条规则
#[derive(Debug, Clone)]
pub struct Rule {
    agent: AgentKind,
    action: String,
    source: String,
    pattern: Regex,
    numeric_slots: Vec<String>,
}

impl Rule {
    pub fn new(agent: AgentKind, action: &str, pattern: &str) -> Result<Self, ConfigError> {
        let compiled = RegexBuilder::new(&format!("^(?:{pattern})$"))
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                agent: agent.to_string(),
                action: action.to_string(),
                source,
            })?;
        Ok(Self {
            agent,
            action: action.to_string(),
            source: pattern.to_string(),
            pattern: compiled,
            numeric_slots: Vec::new(),
        })
    }

    /// 将某个命名捕获组声明为数字槽位
    pub fn numeric(mut self, slot: &str) -> Self {
        self.numeric_slots.push(slot.to_string());
        self
    }

    pub fn agent(&self) -> AgentKind {
        self.agent
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// 声明时的原始正则文本（不含自动添加的锚点）
    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// 命中时返回由命名捕获组构成的参数；空捕获跳过
    pub fn captures(&self, input: &str) -> Option<Params> {
        let caps = self.pattern.captures(input)?;
        let mut params = Params::new();
        for name in self.pattern.capture_names().flatten() {
            let Some(m) = caps.name(name) else {
                continue;
            };
            let text = m.as_str().trim();
            if text.is_empty() {
                continue;
            }
            let value = if self.numeric_slots.iter().any(|s| s == name) {
                text.parse::<f64>()
                    .map(ParamValue::Number)
                    .unwrap_or_else(|_| ParamValue::Text(text.to_string()))
            } else {
                ParamValue::Text(text.to_string())
            };
            params.insert(name.to_string(), value);
        }
        Some(params)
    }
}

/// 某个 Agent 下的规则组
#[derive(Debug, Clone)]
struct AgentRules {
    agent: AgentKind,
    rules: Vec<Rule>,
}

/// 有序规则表
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    groups: Vec<AgentRules>,
}

/// 规则文件格式（TOML）
#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    agent: String,
    action: String,
    pattern: String,
    #[serde(default)]
    numeric: Vec<String>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加规则：Agent 首次出现时在末尾新建分组
    pub fn push(&mut self, rule: Rule) {
        match self.groups.iter_mut().find(|g| g.agent == rule.agent) {
            Some(group) => group.rules.push(rule),
            None => self.groups.push(AgentRules {
                agent: rule.agent,
                rules: vec![rule],
            }),
        }
    }

    /// 链式追加
    pub fn rule(mut self, rule: Rule) -> Self {
        self.push(rule);
        self
    }

    /// 追加另一张表的全部规则（保持其顺序，排在已有规则之后）
    pub fn extend(&mut self, other: RuleSet) {
        for group in other.groups {
            for rule in group.rules {
                self.push(rule);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 迭代顺序即匹配顺序
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.groups.iter().flat_map(|g| g.rules.iter())
    }

    /// 首个命中的规则及其参数
    pub fn find(&self, input: &str) -> Option<(&Rule, Params)> {
        self.iter()
            .find_map(|rule| rule.captures(input).map(|params| (rule, params)))
    }

    /// 从 TOML 文本加载（`[[rules]]` 数组）
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let file: RulesFile = toml::from_str(text).map_err(|e| ConfigError::Rules {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut set = RuleSet::new();
        for entry in file.rules {
            let agent: AgentKind = entry.agent.parse()?;
            let mut rule = Rule::new(agent, &entry.action, &entry.pattern)?;
            for slot in &entry.numeric {
                rule = rule.numeric(slot);
            }
            set.push(rule);
        }
        Ok(set)
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Rules {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text, path)
    }

    /// 内置规则表
    ///
    /// Agent 顺序：system → vision → browser → todo → reader → desktop → memory → research → brain。
    /// 更具体的规则排在通用规则之前（如 "search X on Y" 先于 "search X"）。
    pub fn builtin() -> Result<Self, ConfigError> {
        use AgentKind::*;

        let set = RuleSet::new()
            // 系统
            .rule(Rule::new(System, "quit", r"(?:quit|exit|shutdown)")?)
            .rule(Rule::new(System, "restart", r"(?:restart|reload)")?)
            .rule(Rule::new(System, "status", r"(?:status|health)")?)
            // 视觉
            .rule(Rule::new(
                Vision,
                "analyze",
                r"(?:analyze|describe|look at) (?:the |my )?screen(?:\s+(?:for|and)\s+(?P<prompt>.+))?",
            )?)
            .rule(Rule::new(Vision, "analyze", r"what(?:'s| is) on (?:the |my )?screen\??")?)
            // 浏览器
            .rule(Rule::new(
                Browser,
                "navigate",
                r"(?:go to|open|browse|visit|navigate to)\s+(?P<target>.+)",
            )?)
            .rule(Rule::new(
                Browser,
                "search_site",
                r"(?:search|find)\s+(?:for\s+)?(?P<query>.+?)\s+on\s+(?P<site>\S+)",
            )?)
            .rule(Rule::new(
                Browser,
                "search",
                r"(?:search|google|look up)\s+(?:for\s+)?(?P<query>.+)",
            )?)
            // 待办
            .rule(Rule::new(
                Todo,
                "list",
                r"(?:show|list|view)\s+(?:my\s+)?(?:todos?|tasks?)",
            )?)
            .rule(Rule::new(
                Todo,
                "add",
                r"(?:add|remind me to|todo|task)\s+(?P<item>.+)",
            )?)
            .rule(Rule::new(
                Todo,
                "complete",
                r"(?:complete|done|finish|check off)\s+(?P<item>.+)",
            )?)
            // 朗读
            .rule(Rule::new(Reader, "speak", r"(?:read|say|speak)\s+(?P<text>.+)")?)
            .rule(Rule::new(
                Reader,
                "summarize",
                r"(?:summarize|summary of)\s+(?P<text>.+)",
            )?)
            // 桌面
            .rule(Rule::new(Desktop, "type", r"(?:type|input)\s+(?P<text>.+)")?)
            .rule(Rule::new(Desktop, "click", r"(?:click|press|tap)\s+(?:on\s+)?(?P<element>.+)")?)
            .rule(Rule::new(Desktop, "screenshot", r"(?:screenshot|snap|take a screenshot)")?)
            .rule(
                Rule::new(
                    Desktop,
                    "scroll",
                    r"scroll\s+(?P<direction>up|down)(?:\s+(?P<amount>\d+))?",
                )?
                .numeric("amount"),
            )
            // 记忆
            .rule(Rule::new(
                Memory,
                "store",
                r"(?:store|remember this:?|save to memory)\s+(?P<content>.+)",
            )?)
            .rule(Rule::new(
                Memory,
                "search",
                r"(?:recall|what did i|history of)\s+(?P<query>.+)",
            )?)
            // 研究
            .rule(Rule::new(
                Research,
                "analyze",
                r"(?:research|analyze|deep dive(?: into)?|study)\s+(?P<topic>.+)",
            )?)
            // 问答
            .rule(Rule::new(
                Brain,
                "answer",
                r"(?:what is|what's|whats|who is|who's|explain|tell me about|describe|why|how)\s+(?P<question>.+)",
            )?);

        Ok(set)
    }
}
