use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::decoder::{StreamDecoder, StreamEvent};
use super::models::{ChatMessage, ChatRequestContext, CompletionRequest};
use super::{ChatError, CompletionTransport};

/// One assistant conversation.
///
/// The transcript lives in a watch channel: every append and every streamed
/// delta publishes a fresh snapshot to whoever called [`ChatSession::subscribe`].
/// Only one submit may be in flight at a time.
pub struct ChatSession {
    transport: Arc<dyn CompletionTransport>,
    transcript: watch::Sender<Vec<ChatMessage>>,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChatSession {
    pub fn new(transport: Arc<dyn CompletionTransport>, greeting: impl Into<String>) -> Self {
        let (transcript, _) = watch::channel(vec![ChatMessage::assistant(greeting)]);
        Self {
            transport,
            transcript,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.transcript.subscribe()
    }

    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.transcript.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Sends `input` with the running transcript and streams the reply into it.
    ///
    /// Exchange failures are appended as an assistant message and also
    /// returned. `EmptyMessage` and `Busy` leave the transcript untouched.
    pub async fn submit(&self, input: &str, context: &ChatRequestContext) -> Result<(), ChatError> {
        if input.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let _guard = InFlight::acquire(&self.in_flight).ok_or(ChatError::Busy)?;

        self.transcript
            .send_modify(|messages| messages.push(ChatMessage::user(input)));
        let request = CompletionRequest::new(self.transcript(), context);

        match self.exchange(&request).await {
            Ok(reply_len) => {
                info!("Assistant reply complete ({} chars)", reply_len);
                Ok(())
            }
            Err(e) => {
                warn!("Assistant exchange failed: {:?}", e);
                let notice = e.to_string();
                self.transcript
                    .send_modify(|messages| messages.push(ChatMessage::assistant(notice)));
                Err(e)
            }
        }
    }

    async fn exchange(&self, request: &CompletionRequest) -> Result<usize, ChatError> {
        let response = self.transport.send(request).await?;

        match response.status {
            429 => return Err(ChatError::RateLimited),
            402 => return Err(ChatError::CreditsExhausted),
            200..=299 => {}
            status => {
                return Err(ChatError::RequestFailed(format!(
                    "completion endpoint returned {}",
                    status
                )))
            }
        }

        self.transcript
            .send_modify(|messages| messages.push(ChatMessage::assistant(String::new())));

        let mut reply = String::new();
        let mut decoder = StreamDecoder::new();
        let mut body = response.body;

        while let Some(chunk) = body.next().await {
            let bytes = chunk?;
            for event in decoder.feed(&bytes) {
                self.apply(event, &mut reply);
            }
        }
        for event in decoder.finish() {
            self.apply(event, &mut reply);
        }

        Ok(reply.chars().count())
    }

    fn apply(&self, event: StreamEvent, reply: &mut String) {
        match event {
            StreamEvent::Frame(frame) => {
                let Some(delta) = frame.delta_text().filter(|d| !d.is_empty()) else {
                    return;
                };
                reply.push_str(delta);
                let current = reply.clone();
                self.transcript.send_modify(|messages| {
                    if let Some(last) = messages.last_mut() {
                        last.content = current;
                    }
                });
            }
            StreamEvent::Done => {}
            StreamEvent::ParseSkip(reason) => debug!("Dropped stream frame: {}", reason),
        }
    }
}
