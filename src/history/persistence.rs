//! JSON Lines 持久化：每行一个 ExecutionRecord
//!
//! 追加由后台任务顺序写入，append 本身不挂起；启动时读取已有记录，损坏的行跳过。

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use super::ExecutionRecord;

enum SinkOp {
    Append(String),
    Flush(oneshot::Sender<()>),
}

/// 后台追加写入器
pub struct JsonlSink {
    path: PathBuf,
    tx: mpsc::UnboundedSender<SinkOp>,
}

impl JsonlSink {
    /// 打开（必要时创建）文件并启动写任务
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<SinkOp>();
        let log_path = path.display().to_string();
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    SinkOp::Append(line) => {
                        let written = async {
                            file.write_all(line.as_bytes()).await?;
                            file.write_all(b"\n").await?;
                            file.flush().await
                        }
                        .await;
                        if let Err(e) = written {
                            tracing::warn!(path = %log_path, "Execution log write failed: {}", e);
                        }
                    }
                    SinkOp::Flush(done) => {
                        let _ = file.flush().await;
                        let _ = done.send(());
                    }
                }
            }
        });

        Ok(Self {
            path: path.to_path_buf(),
            tx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &ExecutionRecord) {
        match serde_json::to_string(record) {
            Ok(line) => {
                if self.tx.send(SinkOp::Append(line)).is_err() {
                    tracing::warn!("Execution log writer stopped, record {} not persisted", record.id);
                }
            }
            Err(e) => tracing::warn!("Execution record {} not serializable: {}", record.id, e),
        }
    }

    /// 等待此前的追加全部落盘
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(SinkOp::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// 读取已有记录（按文件顺序，即最旧在前）；文件不存在时为空
    pub async fn load(path: &Path) -> std::io::Result<Vec<ExecutionRecord>> {
        let text = match fs::read_to_string(path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<ExecutionRecord>(line) {
                Ok(r) => records.push(r),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!(path = %path.display(), skipped, "Skipped unreadable execution log lines");
        }
        Ok(records)
    }
}
