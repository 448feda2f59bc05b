//! Tier 2 的 LLM 提供方
//!
//! 三者都是 OpenAI 兼容端点：
//!
//! | provider | 默认 base_url | 默认模型 | API Key |
//! |----------|---------------|----------|---------|
//! | ollama   | http://localhost:11434/v1 | gemma2:2b | 不需要 |
//! | openai   | https://api.openai.com/v1 | gpt-4o-mini | `OPENAI_API_KEY` |
//! | deepseek | https://api.deepseek.com | deepseek-chat | `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const OLLAMA_DEFAULT_MODEL: &str = "gemma2:2b";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_DEFAULT_MODEL: &str = "deepseek-chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    OpenAi,
    DeepSeek,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
            Provider::DeepSeek => "deepseek",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Ollama => OLLAMA_BASE_URL,
            Provider::OpenAi => OPENAI_BASE_URL,
            Provider::DeepSeek => DEEPSEEK_BASE_URL,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Ollama => OLLAMA_DEFAULT_MODEL,
            Provider::OpenAi => OPENAI_DEFAULT_MODEL,
            Provider::DeepSeek => DEEPSEEK_DEFAULT_MODEL,
        }
    }

    /// 按顺序查找的 Key 环境变量；为空表示不需要 Key
    pub fn key_vars(&self) -> &'static [&'static str] {
        match self {
            Provider::Ollama => &[],
            Provider::OpenAi => &["OPENAI_API_KEY"],
            Provider::DeepSeek => &["DEEPSEEK_API_KEY", "OPENAI_API_KEY"],
        }
    }

    /// 解析 API Key；需要 Key 却找不到时返回 None
    pub fn api_key(&self) -> Option<String> {
        self.resolve_key(|name| std::env::var(name).ok())
    }

    fn resolve_key(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        let vars = self.key_vars();
        if vars.is_empty() {
            // Ollama 忽略 Key，但 OpenAI 兼容客户端要求非空
            return Some(self.as_str().to_string());
        }
        vars.iter()
            .filter_map(|name| lookup(name))
            .find(|key| !key.trim().is_empty())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAi),
            "deepseek" => Ok(Provider::DeepSeek),
            other => Err(format!("unknown LLM provider '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        assert_eq!("ollama".parse::<Provider>(), Ok(Provider::Ollama));
        assert_eq!(" DeepSeek ".parse::<Provider>(), Ok(Provider::DeepSeek));
        assert!("carrier-pigeon".parse::<Provider>().is_err());
    }

    #[test]
    fn test_key_lookup_order() {
        let env = |name: &str| match name {
            "OPENAI_API_KEY" => Some("sk-openai".to_string()),
            "DEEPSEEK_API_KEY" => Some("  ".to_string()),
            _ => None,
        };
        // 空白 Key 视为未设置
        assert_eq!(Provider::DeepSeek.resolve_key(env).as_deref(), Some("sk-openai"));
        assert_eq!(Provider::OpenAi.resolve_key(|_| None), None);
        assert_eq!(Provider::Ollama.resolve_key(|_| None).as_deref(), Some("ollama"));
    }
}
