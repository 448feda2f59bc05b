//! Worker 契约：线协议、传输抽象与端点配置
//!
//! Worker 是独立进程（浏览器、桌面、视觉、记忆等），对 Router 而言是黑盒，只需遵守统一的请求/回复格式。

mod endpoint;
mod http;
mod protocol;
mod transport;
mod websocket;

pub use endpoint::{Protocol, WorkerEndpoint, DEFAULT_UNREACHABLE_TTL};
pub use http::HttpTransport;
pub use protocol::{WorkerReply, WorkerRequest};
pub use transport::WorkerTransport;
pub use websocket::WebSocketTransport;
