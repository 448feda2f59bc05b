//! 真实 WebSocket Worker 的端到端测试
//!
//! 测试 Worker 按 `target` 决定行为：slow.* 延迟回复，fail.* 回复 error，
//! hang.* 不回复，drop.* 直接断开连接，其余回显。
//! 回复风格可选：回显 `id`、不带任何 ID、或旧版的 `command_id` / `data` / `error_message`
//! （后两种在每个回复前先发 `status` 帧）。

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use futures_util::{SinkExt, StreamExt};
    use hndl::command::AgentKind;
    use hndl::worker::{Protocol, WorkerEndpoint};
    use hndl::{ErrorKind, Router};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Seen {
        commands: Mutex<Vec<String>>,
        cancels: Mutex<Vec<String>>,
        connections: Mutex<usize>,
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Style {
        Echoing,
        Anonymous,
        Legacy,
    }

    fn result(style: Style, id: &str, content: Value) -> Value {
        match style {
            Style::Echoing => json!({"type": "result", "id": id, "content": content}),
            Style::Anonymous => json!({"type": "result", "content": content}),
            Style::Legacy => json!({"type": "result", "command_id": id, "data": content, "timestamp": 0.0}),
        }
    }

    fn error(style: Style, id: &str, message: String) -> Value {
        match style {
            Style::Echoing => json!({"type": "error", "id": id, "message": message}),
            Style::Anonymous => json!({"type": "error", "message": message}),
            Style::Legacy => json!({"type": "error", "command_id": id, "error_message": message}),
        }
    }

    fn pong(style: Style, id: &str) -> Value {
        match style {
            Style::Echoing => json!({"type": "pong", "id": id}),
            Style::Anonymous => json!({"type": "pong"}),
            Style::Legacy => json!({"type": "pong", "command_id": id}),
        }
    }

    enum Out {
        Frame(Value),
        Close,
    }

    async fn spawn_worker() -> (SocketAddr, Arc<Seen>) {
        spawn_styled_worker(Style::Echoing).await
    }

    async fn spawn_styled_worker(style: Style) -> (SocketAddr, Arc<Seen>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Seen::default());

        let server_seen = Arc::clone(&seen);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen = Arc::clone(&server_seen);
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    *seen.connections.lock().unwrap() += 1;
                    serve(ws, seen, style).await;
                });
            }
        });
        (addr, seen)
    }

    async fn serve(
        ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
        seen: Arc<Seen>,
        style: Style,
    ) {
        let (mut sink, mut source) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Out>();

        let writer = tokio::spawn(async move {
            while let Some(out) = out_rx.recv().await {
                match out {
                    Out::Frame(value) => {
                        if sink.send(Message::Text(value.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Out::Close => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        });

        while let Some(Ok(Message::Text(text))) = source.next().await {
            let request: Value = serde_json::from_str(&text).unwrap();
            let id = request["id"].as_str().unwrap_or_default().to_string();
            match request["type"].as_str() {
                Some("ping") => {
                    let _ = out_tx.send(Out::Frame(pong(style, &id)));
                }
                Some("cancel") => seen.cancels.lock().unwrap().push(id),
                Some("command") => {
                    seen.commands.lock().unwrap().push(id.clone());
                    let target = request["params"]["target"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    if target.starts_with("drop.") {
                        let _ = out_tx.send(Out::Close);
                        break;
                    }
                    if style != Style::Echoing {
                        let _ = out_tx.send(Out::Frame(json!({"type": "status", "status": "working"})));
                    }
                    let out_tx = out_tx.clone();
                    tokio::spawn(async move {
                        let reply = if target.starts_with("slow.") {
                            tokio::time::sleep(Duration::from_millis(300)).await;
                            result(style, &id, json!({"target": target}))
                        } else if target.starts_with("fail.") {
                            error(style, &id, format!("cannot open {target}"))
                        } else if target.starts_with("hang.") {
                            return;
                        } else {
                            result(style, &id, json!({"target": target}))
                        };
                        let _ = out_tx.send(Out::Frame(reply));
                    });
                }
                _ => {}
            }
        }
        drop(out_tx);
        let _ = writer.await;
    }

    fn router(addr: SocketAddr, timeout: Duration) -> Router {
        let endpoint = WorkerEndpoint::from_address(
            AgentKind::Browser,
            &format!("ws://{addr}"),
            Protocol::WebSocket,
            timeout,
        )
        .unwrap();
        Router::builder().endpoint(endpoint).build().unwrap()
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_echo_over_websocket() {
        let (addr, seen) = spawn_worker().await;
        let router = router(addr, Duration::from_secs(2));

        let response = router.process("go to reddit.com").await;
        assert!(response.success, "{response:?}");
        assert_eq!(response.result, Some(json!({"target": "reddit.com"})));
        assert_eq!(seen.commands.lock().unwrap().clone(), vec![response.execution_id.clone()]);

        // 复用同一条连接
        let response = router.process("go to example.com").await;
        assert!(response.success);
        assert_eq!(*seen.connections.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replies_matched_by_id_not_order() {
        let (addr, _seen) = spawn_worker().await;
        let router = Arc::new(router(addr, Duration::from_secs(2)));
        // 第一个回复确认 Worker 回显 ID，之后同一连接上的请求才并发
        assert!(router.process("go to warmup.com").await.success);

        let slow = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.process("go to slow.com").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fast = router.process("go to fast.com").await;
        assert!(fast.success);
        assert_eq!(fast.result, Some(json!({"target": "fast.com"})));
        assert!(!slow.is_finished(), "fast reply must not wait for the slow one");

        let slow = slow.await.unwrap();
        assert!(slow.success);
        assert_eq!(slow.result, Some(json!({"target": "slow.com"})));
    }

    #[tokio::test]
    async fn test_worker_error_reply() {
        let (addr, _seen) = spawn_worker().await;
        let router = router(addr, Duration::from_secs(2));

        let response = router.process("go to fail.com").await;
        assert_eq!(response.error_kind(), Some(ErrorKind::WorkerFailure));
        assert_eq!(response.error.unwrap().message, "cannot open fail.com");
        assert!(!router.endpoint(AgentKind::Browser).unwrap().is_unreachable());
    }

    #[tokio::test]
    async fn test_timeout_then_connection_still_usable() {
        let (addr, seen) = spawn_worker().await;
        let router = router(addr, Duration::from_millis(200));

        let started = Instant::now();
        let response = router.process("go to hang.com").await;
        assert_eq!(response.error_kind(), Some(ErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(1));

        let response = router.process("go to reddit.com").await;
        assert!(response.success);
        assert_eq!(*seen.connections.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_health_check_ping_pong() {
        let (addr, _seen) = spawn_worker().await;
        let router = router(addr, Duration::from_secs(2));

        let status = router.health_check(AgentKind::Browser).await;
        assert!(status.healthy, "{status:?}");
        assert!(status.latency_ms.is_some());
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_cancel_notice_reaches_worker() {
        let (addr, seen) = spawn_worker().await;
        let router = Arc::new(router(addr, Duration::from_secs(10)));

        let cancel = CancellationToken::new();
        let task = {
            let router = Arc::clone(&router);
            let cancel = cancel.clone();
            tokio::spawn(async move { router.process_with_cancel("go to hang.com", &cancel).await })
        };
        assert!(eventually(|| seen.commands.lock().unwrap().len() == 1).await);

        cancel.cancel();
        let response = task.await.unwrap();
        assert_eq!(response.error_kind(), Some(ErrorKind::Cancelled));
        assert!(
            eventually(|| seen.cancels.lock().unwrap().contains(&response.execution_id)).await
        );
    }

    #[tokio::test]
    async fn test_dropped_connection_marks_unreachable() {
        let (addr, seen) = spawn_worker().await;
        let router = router(addr, Duration::from_secs(2));

        let response = router.process("go to drop.com").await;
        assert_eq!(response.error_kind(), Some(ErrorKind::WorkerFailure));
        assert!(router.endpoint(AgentKind::Browser).unwrap().is_unreachable());

        let response = router.process("go to reddit.com").await;
        assert_eq!(response.error_kind(), Some(ErrorKind::AgentUnavailable));
        assert_eq!(seen.commands.lock().unwrap().len(), 1);

        // 健康检查重新连接并清除标记
        let status = router.health_check(AgentKind::Browser).await;
        assert!(status.healthy, "{status:?}");
        assert_eq!(*seen.connections.lock().unwrap(), 2);

        let response = router.process("go to reddit.com").await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        // 先占用再释放端口，保证无人监听
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let router = router(addr, Duration::from_secs(2));

        let response = router.process("go to reddit.com").await;
        assert_eq!(response.error_kind(), Some(ErrorKind::WorkerFailure));
        assert!(response.user_message().unwrap().contains("browser"));
        assert!(router.endpoint(AgentKind::Browser).unwrap().is_unreachable());
    }

    #[tokio::test]
    async fn test_worker_without_ids_is_served_one_at_a_time() {
        let (addr, seen) = spawn_styled_worker(Style::Anonymous).await;
        let router = Arc::new(router(addr, Duration::from_secs(2)));

        let response = router.process("go to reddit.com").await;
        assert!(response.success, "{response:?}");
        assert_eq!(response.result, Some(json!({"target": "reddit.com"})));

        // 无关联 ID：并发调度在连接上串行，回复仍归属正确
        let slow = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.process("go to slow.com").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fast = router.process("go to fast.com").await;
        let slow = slow.await.unwrap();
        assert_eq!(slow.result, Some(json!({"target": "slow.com"})));
        assert_eq!(fast.result, Some(json!({"target": "fast.com"})));
        assert_eq!(seen.commands.lock().unwrap().len(), 3);

        let response = router.process("go to fail.com").await;
        assert_eq!(response.error_kind(), Some(ErrorKind::WorkerFailure));
        assert!(router.health_check(AgentKind::Browser).await.healthy);
    }

    #[tokio::test]
    async fn test_worker_with_legacy_fields() {
        let (addr, _seen) = spawn_styled_worker(Style::Legacy).await;
        let router = Arc::new(router(addr, Duration::from_secs(2)));

        let response = router.process("go to reddit.com").await;
        assert!(response.success, "{response:?}");
        assert_eq!(response.result, Some(json!({"target": "reddit.com"})));

        let response = router.process("go to fail.com").await;
        assert_eq!(response.error.unwrap().message, "cannot open fail.com");

        // command_id 同样可用于并发匹配
        let slow = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.process("go to slow.com").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fast = router.process("go to fast.com").await;
        assert_eq!(fast.result, Some(json!({"target": "fast.com"})));
        assert!(!slow.is_finished());
        assert!(slow.await.unwrap().success);
    }
}
