//! hndl - 自然语言命令编排器
//!
//! 自由文本 → 两级分类 → 结构化 Command → 调度到外部 Worker → Response → 执行日志。
//!
//! 模块划分：
//! - **command**: Command、AgentKind、参数值
//! - **classifier**: Tier 1 正则规则 + Tier 2 兜底分类
//! - **llm**: Tier 2 使用的 LLM 客户端（OpenAI 兼容 / Ollama / DeepSeek / Mock）
//! - **worker**: Worker 线协议、传输（WebSocket / HTTP）与端点
//! - **router**: 调度状态机、取消、健康检查
//! - **history**: 执行日志、JSONL 持久化、相似检索
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **observability**: 日志初始化
//! - **api**: HTTP 接口（需 `http` feature）

pub mod classifier;
pub mod command;
pub mod config;
pub mod core;
pub mod history;
pub mod llm;
pub mod observability;
pub mod router;
pub mod worker;

pub use classifier::Classifier;
pub use command::{AgentKind, ClassifyMethod, Command, ParamValue, Params};
pub use core::ErrorKind;
pub use history::{ExecutionLog, ExecutionRecord};
pub use router::{Response, Router};

#[cfg(feature = "http")]
pub mod api;
