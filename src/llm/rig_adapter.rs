//! Bridges rig-core's `CompletionModel` to `LlmProvider`.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel};
use rig::message::Message;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};

pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// Split into (preamble, history, final prompt). System messages are joined
/// into the preamble; the last user message is the prompt.
fn split_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<Message>, String) {
    let mut system = Vec::new();
    let mut turns = Vec::new();
    for msg in messages {
        match msg.role {
            Role::System => system.push(msg.content),
            _ => turns.push(msg),
        }
    }

    let prompt = match turns.last() {
        Some(last) if last.role == Role::User => turns.pop().map(|m| m.content).unwrap_or_default(),
        _ => String::new(),
    };
    let history = turns
        .into_iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content),
            _ => Message::user(m.content),
        })
        .collect();
    let preamble = (!system.is_empty()).then(|| system.join("\n\n"));
    (preamble, history, prompt)
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, history, prompt) = split_messages(request.messages);

        let mut builder = self.model.completion_request(Message::user(prompt));
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if !history.is_empty() {
            builder = builder.messages(history);
        }
        if let Some(t) = request.temperature {
            builder = builder.temperature(f64::from(t));
        }
        if let Some(max) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max));
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let input_tokens = u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX);
        let output_tokens = u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX);
        debug!(
            model = %self.model_name,
            input_tokens,
            output_tokens,
            "LLM completion"
        );

        Ok(CompletionResponse {
            finish_reason: if content.is_empty() {
                FinishReason::Unknown
            } else {
                FinishReason::Stop
            },
            content,
            input_tokens,
            output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_become_preamble() {
        let (preamble, history, prompt) = split_messages(vec![
            ChatMessage::system("a"),
            ChatMessage::system("b"),
            ChatMessage::user("hello"),
        ]);
        assert_eq!(preamble.as_deref(), Some("a\n\nb"));
        assert!(history.is_empty());
        assert_eq!(prompt, "hello");
    }

    #[test]
    fn earlier_turns_become_history() {
        let (preamble, history, prompt) = split_messages(vec![
            ChatMessage::user("q1"),
            ChatMessage::assistant("a1"),
            ChatMessage::user("q2"),
        ]);
        assert!(preamble.is_none());
        assert_eq!(history.len(), 2);
        assert_eq!(prompt, "q2");
    }
}
