//! 核心类型：错误分类与配置/传输/分类错误

pub mod error;

pub use error::{ClassifyError, ConfigError, ErrorKind, TransportError, UnknownAgent};
