use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Caller supplied metadata forwarded untouched with every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequestContext {
    pub context_type: Option<String>,
    pub context_data: Option<serde_json::Value>,
    pub user_id: Option<String>,
}

/// Body posted to the completion endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_data: Option<serde_json::Value>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>, context: &ChatRequestContext) -> Self {
        Self {
            messages,
            user_id: context.user_id.clone(),
            context_type: context.context_type.clone(),
            context_data: context.context_data.clone(),
        }
    }
}

// One `data: ` record of the response stream: {"choices":[{"delta":{"content":"..."}}]}
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub choices: Vec<FrameChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameChoice {
    #[serde(default)]
    pub delta: FrameDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameDelta {
    pub content: Option<String>,
}

impl StreamFrame {
    pub fn delta_text(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_absent_context() {
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")], &ChatRequestContext::default());
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body, json!({"messages": [{"role": "user", "content": "hi"}]}));
    }

    #[test]
    fn request_forwards_context_verbatim() {
        let ctx = ChatRequestContext {
            context_type: Some("invoice".to_string()),
            context_data: Some(json!({"id": 7, "lines": [1, 2]})),
            user_id: Some("u-1".to_string()),
        };
        let req = CompletionRequest::new(vec![ChatMessage::assistant("hello")], &ctx);
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["userId"], "u-1");
        assert_eq!(body["contextType"], "invoice");
        assert_eq!(body["contextData"], json!({"id": 7, "lines": [1, 2]}));
        assert_eq!(body["messages"][0]["role"], "assistant");
    }

    #[test]
    fn frame_without_delta_content_has_no_text() {
        let frame: StreamFrame = serde_json::from_str(r#"{"choices":[{"delta":{}}]}"#).unwrap();
        assert_eq!(frame.delta_text(), None);
        let frame: StreamFrame = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert_eq!(frame.delta_text(), None);
    }
}
