//! WebSocket 传输：单条持久连接 + 关联 ID
//!
//! - 首次调用时才建立连接，连接断开后下一次调用自动重连
//! - 写入经由 mpsc 交给后台写任务，读任务按 `id` 把回复投递给等待方
//! - Worker 回显关联 ID（`id` 或 `command_id`）后，同一连接上可以有多个并发请求，回复按 ID 而非到达顺序匹配
//! - 在此之前（或 Worker 从不回显 ID）请求逐个进行，无 ID 的回复交给唯一的等待方
//! - `status` 进度帧忽略

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::{Protocol, WorkerReply, WorkerRequest, WorkerTransport};
use crate::core::TransportError;

type ReplySender = oneshot::Sender<Result<WorkerReply, TransportError>>;
type PendingMap = Arc<Mutex<HashMap<String, ReplySender>>>;

/// 一条已建立的连接
struct Connection {
    outbound: mpsc::UnboundedSender<WsMessage>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    /// Worker 是否回显关联 ID
    correlated: Arc<AtomicBool>,
    /// 未确认关联 ID 时，请求按此锁串行
    turn: tokio::sync::Mutex<()>,
    reader: JoinHandle<()>,
}

impl Connection {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// 等待方放弃（超时 / 取消）时移除挂起项
struct PendingGuard {
    pending: PendingMap,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

pub struct WebSocketTransport {
    address: String,
    conn: tokio::sync::Mutex<Option<Arc<Connection>>>,
}

impl WebSocketTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            conn: tokio::sync::Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// 复用已打开的连接，否则重新连接
    async fn connection(&self) -> Result<Arc<Connection>, TransportError> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            if conn.is_open() {
                return Ok(Arc::clone(conn));
            }
            tracing::debug!(address = %self.address, "WebSocket connection closed, reconnecting");
        }

        let (stream, _) = tokio_tungstenite::connect_async(self.address.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!(address = %self.address, "Connected to worker");

        let (mut sink, mut source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let correlated = Arc::new(AtomicBool::new(false));

        let writer_closed = Arc::clone(&closed);
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    tracing::warn!("WebSocket write failed: {}", e);
                    break;
                }
            }
            writer_closed.store(true, Ordering::SeqCst);
            let _ = sink.close().await;
        });

        let reader_pending = Arc::clone(&pending);
        let reader_closed = Arc::clone(&closed);
        let reader_correlated = Arc::clone(&correlated);
        let address = self.address.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(t)) => t,
                    Ok(WsMessage::Binary(b)) => match String::from_utf8(b) {
                        Ok(s) => s,
                        Err(_) => continue,
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(address = %address, "WebSocket read error: {}", e);
                        break;
                    }
                };
                deliver(&reader_pending, &reader_correlated, &text);
            }

            // 先置位再清空，保证之后注册的请求能看到 closed
            reader_closed.store(true, Ordering::SeqCst);
            let mut pending = reader_pending.lock().unwrap_or_else(PoisonError::into_inner);
            for (_, tx) in pending.drain() {
                let _ = tx.send(Err(TransportError::Disconnected));
            }
            tracing::debug!(address = %address, "WebSocket reader stopped");
        });

        let conn = Arc::new(Connection {
            outbound,
            pending,
            closed,
            correlated,
            turn: tokio::sync::Mutex::new(()),
            reader,
        });
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }
}

/// 投递一条回复
///
/// 带 ID 的回复按 ID 投递，并记下该 Worker 会回显 ID；无 ID 的回复仅在恰好一个请求等待时交给它。
fn deliver(pending: &PendingMap, correlated: &AtomicBool, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Dropping non-JSON worker message: {}", e);
            return;
        }
    };
    if value.get("type").and_then(Value::as_str) == Some("status") {
        tracing::trace!(status = ?value.get("status"), "Worker status");
        return;
    }
    let id = ["id", "command_id"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    let reply = WorkerReply::from_value(value);
    let waiter = {
        let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
        match id {
            Some(id) => {
                let waiter = pending.remove(&id);
                if waiter.is_some() {
                    correlated.store(true, Ordering::SeqCst);
                } else {
                    tracing::debug!(id = %id, "Reply for unknown or abandoned request");
                }
                waiter
            }
            None if pending.len() == 1 => {
                correlated.store(false, Ordering::SeqCst);
                let only = pending.keys().next().cloned();
                only.and_then(|key| pending.remove(&key))
            }
            None => {
                tracing::warn!(waiting = pending.len(), "Dropping worker reply without id");
                None
            }
        }
    };
    if let Some(tx) = waiter {
        let _ = tx.send(reply);
    }
}

#[async_trait]
impl WorkerTransport for WebSocketTransport {
    async fn call(&self, request: WorkerRequest) -> Result<WorkerReply, TransportError> {
        let json = request.to_json()?;
        let id = request.id().to_string();
        let conn = self.connection().await?;
        let _turn = if conn.correlated.load(Ordering::SeqCst) {
            None
        } else {
            Some(conn.turn.lock().await)
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = conn.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if conn.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Disconnected);
            }
            pending.insert(id.clone(), tx);
        }
        let _guard = PendingGuard {
            pending: Arc::clone(&conn.pending),
            id,
        };

        conn.outbound
            .send(WsMessage::Text(json))
            .map_err(|_| TransportError::Send("connection writer stopped".to_string()))?;

        rx.await.unwrap_or(Err(TransportError::Disconnected))
    }

    async fn notify_cancel(&self, id: &str) {
        let conn = self.conn.lock().await.as_ref().map(Arc::clone);
        let Some(conn) = conn.filter(|c| c.is_open()) else {
            return;
        };
        if let Ok(json) = WorkerRequest::cancel(id).to_json() {
            let _ = conn.outbound.send(WsMessage::Text(json));
        }
    }

    fn protocol(&self) -> Protocol {
        Protocol::WebSocket
    }
}
