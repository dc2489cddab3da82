use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::debug;

use super::{ChatError, CompletionRequest, CompletionResponse, CompletionTransport};
use crate::config::AssistantConfig;

/// Posts transcripts to the hosted assistant function over HTTPS.
pub struct HttpCompletionTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpCompletionTransport {
    /// No overall deadline: a long reply keeps streaming as long as each
    /// read arrives within `read_timeout`.
    pub fn new(
        endpoint: String,
        api_key: String,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, ChatError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| ChatError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn from_config(config: &AssistantConfig) -> Result<Self, ChatError> {
        Self::new(
            config.endpoint.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.read_timeout_secs),
        )
    }
}

#[async_trait]
impl CompletionTransport for HttpCompletionTransport {
    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, ChatError> {
        debug!(
            "Posting {} messages to {}",
            request.messages.len(),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::RequestFailed(e.to_string())))
            .boxed();

        Ok(CompletionResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{ChatRequestContext, ChatSession};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Consumes headers and the `Content-Length` body.
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed before sending the request");
            request.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&request);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Serves one chunked reply: `frames` SSE lines, one every `gap`.
    async fn slow_stream_server(frames: Vec<&'static str>, gap: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\
                      Transfer-Encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();
            for text in frames {
                tokio::time::sleep(gap).await;
                let line = format!(
                    "data: {}\n",
                    serde_json::json!({"choices": [{"delta": {"content": text}}]})
                );
                let chunk = format!("{:x}\r\n{}\r\n", line.len(), line);
                socket.write_all(chunk.as_bytes()).await.unwrap();
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
        });

        format!("http://{}/functions/v1/ai-assistant", addr)
    }

    #[tokio::test]
    async fn reply_may_outlast_the_read_timeout() {
        // Five reads 300ms apart: 1.5s in total against a 1s read timeout
        let endpoint =
            slow_stream_server(vec!["a", "b", "c", "d", "e"], Duration::from_millis(300)).await;
        let transport = HttpCompletionTransport::new(
            endpoint,
            "test-key".to_string(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        let session = ChatSession::new(Arc::new(transport), "hi");

        session
            .submit("count", &ChatRequestContext::default())
            .await
            .unwrap();

        assert_eq!(session.transcript().last().unwrap().content, "abcde");
    }
}
