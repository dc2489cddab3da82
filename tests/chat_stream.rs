use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::sync::Notify;

use vyapar::assistant::{
    ChatError, ChatRequestContext, ChatSession, CompletionRequest, CompletionResponse,
    CompletionTransport, Role,
};

const GREETING: &str = "Hello from the shop assistant";

/// Replays a fixed status and body, optionally holding the response until released.
struct ScriptedTransport {
    status: u16,
    chunks: Vec<Vec<u8>>,
    gate: Option<Arc<Notify>>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedTransport {
    fn new(status: u16, chunks: Vec<Vec<u8>>) -> Self {
        Self {
            status,
            chunks,
            gate: None,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, ChatError> {
        self.seen.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let chunks: Vec<Result<Bytes, ChatError>> = self
            .chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.clone())))
            .collect();
        Ok(CompletionResponse {
            status: self.status,
            body: stream::iter(chunks).boxed(),
        })
    }
}

struct UnreachableTransport;

#[async_trait]
impl CompletionTransport for UnreachableTransport {
    async fn send(&self, _request: &CompletionRequest) -> Result<CompletionResponse, ChatError> {
        Err(ChatError::RequestFailed("dns error: no such host".to_string()))
    }
}

/// Answers 200, sends `first`, then loses the connection.
struct DroppedStreamTransport {
    first: String,
}

#[async_trait]
impl CompletionTransport for DroppedStreamTransport {
    async fn send(&self, _request: &CompletionRequest) -> Result<CompletionResponse, ChatError> {
        let chunks: Vec<Result<Bytes, ChatError>> = vec![
            Ok(Bytes::from(self.first.clone())),
            Err(ChatError::RequestFailed("connection reset by peer".to_string())),
        ];
        Ok(CompletionResponse {
            status: 200,
            body: stream::iter(chunks).boxed(),
        })
    }
}

fn frame(text: &str) -> String {
    format!(
        "data: {}\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    )
}

fn split_every(body: &[u8], size: usize) -> Vec<Vec<u8>> {
    body.chunks(size).map(|c| c.to_vec()).collect()
}

#[tokio::test]
async fn assembles_reply_across_any_read_split() {
    let body = format!("{}{}data: [DONE]\n", frame("He"), frame("llo"));

    for size in 1..=body.len() {
        let transport = Arc::new(ScriptedTransport::new(200, split_every(body.as_bytes(), size)));
        let session = ChatSession::new(transport, GREETING);

        session
            .submit("hi", &ChatRequestContext::default())
            .await
            .unwrap();

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 3, "split size {}", size);
        assert_eq!(transcript[0].content, GREETING);
        assert_eq!(transcript[1].role, Role::User);
        assert_eq!(transcript[2].role, Role::Assistant);
        assert_eq!(transcript[2].content, "Hello", "split size {}", size);
    }
}

#[tokio::test]
async fn malformed_frame_does_not_stop_the_stream() {
    let body = format!("{}data: {{not json\n{}data: [DONE]\n", frame("Good "), frame("day"));
    let transport = Arc::new(ScriptedTransport::new(200, vec![body.into_bytes()]));
    let session = ChatSession::new(transport, GREETING);

    session
        .submit("hello", &ChatRequestContext::default())
        .await
        .unwrap();

    assert_eq!(session.transcript().last().unwrap().content, "Good day");
}

#[tokio::test]
async fn rate_limit_leaves_exactly_one_notice() {
    let transport = Arc::new(ScriptedTransport::new(429, vec![]));
    let session = ChatSession::new(transport, GREETING);

    let err = session
        .submit("how are sales?", &ChatRequestContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::RateLimited));

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[2].role, Role::Assistant);
    assert!(transcript[2].content.contains("Rate limit"));
    assert!(transcript.iter().all(|m| !m.content.is_empty()));
}

#[tokio::test]
async fn status_codes_map_to_errors() {
    let cases: [(u16, fn(&ChatError) -> bool); 2] = [
        (402, |e| matches!(e, ChatError::CreditsExhausted)),
        (500, |e| matches!(e, ChatError::RequestFailed(_))),
    ];

    for (status, expected) in cases {
        let transport = Arc::new(ScriptedTransport::new(status, vec![]));
        let session = ChatSession::new(transport, GREETING);
        let err = session
            .submit("hi", &ChatRequestContext::default())
            .await
            .unwrap_err();
        assert!(expected(&err), "status {}", status);
        assert_eq!(session.transcript().len(), 3);
    }
}

#[tokio::test]
async fn network_failure_is_reported_as_generic_failure() {
    let session = ChatSession::new(Arc::new(UnreachableTransport), GREETING);

    let err = session
        .submit("hi", &ChatRequestContext::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::RequestFailed(_)));
    let transcript = session.transcript();
    assert_eq!(transcript.last().unwrap().content, "Failed to get response");
    assert!(!session.is_busy());
}

#[tokio::test]
async fn blank_input_is_rejected_without_touching_transcript() {
    let transport = Arc::new(ScriptedTransport::new(200, vec![]));
    let session = ChatSession::new(transport.clone(), GREETING);

    let err = session
        .submit("   \n", &ChatRequestContext::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::EmptyMessage));
    assert_eq!(session.transcript().len(), 1);
    assert!(transport.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn second_submit_while_streaming_is_rejected() {
    let gate = Arc::new(Notify::new());
    let mut transport = ScriptedTransport::new(200, vec![frame("done").into_bytes()]);
    transport.gate = Some(gate.clone());
    let session = ChatSession::new(Arc::new(transport), GREETING);
    let ctx = ChatRequestContext::default();

    let first = session.submit("first", &ctx);
    let second = async {
        // Let the first submit reach the transport before trying again
        tokio::task::yield_now().await;
        let result = session.submit("second", &ctx).await;
        gate.notify_one();
        result
    };
    let (first, second) = tokio::join!(first, second);

    first.unwrap();
    assert!(matches!(second, Err(ChatError::Busy)));

    let transcript = session.transcript();
    let users: Vec<_> = transcript.iter().filter(|m| m.role == Role::User).collect();
    assert_eq!(users.len(), 1);
    assert_eq!(transcript.last().unwrap().content, "done");
}

#[tokio::test]
async fn request_carries_transcript_and_context() {
    let transport = Arc::new(ScriptedTransport::new(200, vec![frame("ok").into_bytes()]));
    let session = ChatSession::new(transport.clone(), GREETING);
    let ctx = ChatRequestContext {
        context_type: Some("inventory".to_string()),
        context_data: Some(serde_json::json!({"low_stock": 3})),
        user_id: Some("owner-1".to_string()),
    };

    session.submit("what is low?", &ctx).await.unwrap();

    let seen = transport.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let request = &seen[0];
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[1].content, "what is low?");
    assert_eq!(request.context_type.as_deref(), Some("inventory"));
    assert_eq!(request.user_id.as_deref(), Some("owner-1"));
}

#[tokio::test]
async fn subscribers_see_the_reply_grow() {
    let body = format!("{}{}{}", frame("a"), frame("b"), frame("c"));
    let transport = Arc::new(ScriptedTransport::new(200, vec![body.into_bytes()]));
    let session = ChatSession::new(transport, GREETING);
    let mut updates = session.subscribe();

    session
        .submit("letters", &ChatRequestContext::default())
        .await
        .unwrap();

    assert!(updates.has_changed().unwrap());
    let latest = updates.borrow_and_update().clone();
    assert_eq!(latest.last().unwrap().content, "abc");
}

#[tokio::test]
async fn connection_lost_midway_keeps_partial_reply_then_notice() {
    let transport = Arc::new(DroppedStreamTransport { first: frame("par") });
    let session = ChatSession::new(transport, GREETING);

    let err = session
        .submit("stock report", &ChatRequestContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::RequestFailed(_)));

    let transcript = session.transcript();
    let contents: Vec<&str> = transcript.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![GREETING, "stock report", "par", "Failed to get response"]
    );
    assert_eq!(transcript[2].role, Role::Assistant);
    assert_eq!(transcript[3].role, Role::Assistant);
    assert!(!session.is_busy());

    // The session is usable again afterwards
    let retry = session.submit("again", &ChatRequestContext::default()).await;
    assert!(matches!(retry, Err(ChatError::RequestFailed(_))));
}
