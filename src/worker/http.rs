//! HTTP 传输：每次调用一个 POST，请求体即线协议 JSON，响应体为回复 JSON

use async_trait::async_trait;

use super::{Protocol, WorkerReply, WorkerRequest, WorkerTransport};
use crate::core::TransportError;

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_send_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_connect() {
            TransportError::Connect {
                address: self.url.clone(),
                reason: e.to_string(),
            }
        } else {
            TransportError::Send(e.to_string())
        }
    }
}

#[async_trait]
impl WorkerTransport for HttpTransport {
    async fn call(&self, request: WorkerRequest) -> Result<WorkerReply, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|_| TransportError::Disconnected)?;

        if !status.is_success() {
            // 带协议格式的错误体按原样返回，否则合成一个 error 回复
            return match WorkerReply::parse(&body) {
                Ok(reply @ WorkerReply::Error { .. }) => Ok(reply),
                _ => Ok(WorkerReply::Error {
                    id: Some(request.id().to_string()),
                    message: format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
                }),
            };
        }

        let reply = WorkerReply::parse(&body)?;
        match reply.id() {
            Some(id) if id != request.id() => Err(TransportError::Malformed(format!(
                "reply id {id} does not match request {}",
                request.id()
            ))),
            _ => Ok(reply),
        }
    }

    async fn notify_cancel(&self, id: &str) {
        let result = self
            .client
            .post(&self.url)
            .json(&WorkerRequest::cancel(id))
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(id = %id, "Cancel notice not delivered: {}", e);
        }
    }

    fn protocol(&self) -> Protocol {
        Protocol::Http
    }
}
