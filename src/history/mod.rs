//! 执行历史：记录、日志、持久化与相似检索

mod log;
mod persistence;
mod record;
pub mod tokenizer;

pub use log::{ExecutionLog, DEFAULT_MAX_IN_MEMORY, DEFAULT_SIMILARITY_THRESHOLD};
pub use persistence::JsonlSink;
pub use record::ExecutionRecord;
