//! `LlmProvider`: a streaming chat-completion contract, and a concrete
//! AWS Bedrock Converse API implementation.
//!
//! Grounded on this pack's Bedrock chat-model integration (`ChatBedrock`):
//! same `aws-config` credential chain, `converse_stream` call, and
//! `ContentBlockDelta::Text` event shape, narrowed from a tool-calling
//! general-purpose chat model down to plain text deltas.

use std::pin::Pin;

use async_stream::stream;
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ContentBlockDelta, ConversationRole, ConverseStreamOutput, InferenceConfiguration,
    Message as BedrockMessage, SystemContentBlock,
};
use aws_sdk_bedrockruntime::Client as BedrockClient;
use futures_util::Stream;
use tracing::debug;

use super::{ChatMessage, LlmError};
use crate::session::Role;

pub type LlmStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

const MAX_TOKENS: i32 = 180;
const TEMPERATURE: f32 = 0.2;
const TOP_P: f32 = 0.7;

/// Abstracts the streaming chat-completion provider. One method: take a
/// system prompt and the full turn history, return a stream of text
/// deltas as the model generates its reply.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn stream_reply(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
    ) -> Result<LlmStream, LlmError>;
}

pub struct BedrockChatProvider {
    client: BedrockClient,
    model_id: String,
}

impl BedrockChatProvider {
    pub async fn new(region: impl Into<String>, model_id: impl Into<String>) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self {
            client: BedrockClient::new(&config),
            model_id: model_id.into(),
        }
    }

    fn convert_history(history: &[ChatMessage]) -> Vec<BedrockMessage> {
        history
            .iter()
            .filter_map(|turn| {
                let role = match turn.role {
                    Role::User => ConversationRole::User,
                    Role::Assistant => ConversationRole::Assistant,
                };
                BedrockMessage::builder()
                    .role(role)
                    .content(ContentBlock::Text(turn.text.clone()))
                    .build()
                    .ok()
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for BedrockChatProvider {
    async fn stream_reply(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
    ) -> Result<LlmStream, LlmError> {
        let messages = Self::convert_history(history);
        let inference_config = InferenceConfiguration::builder()
            .max_tokens(MAX_TOKENS)
            .temperature(TEMPERATURE)
            .top_p(TOP_P)
            .build();

        let output = self
            .client
            .converse_stream()
            .model_id(&self.model_id)
            .set_messages(Some(messages))
            .system(SystemContentBlock::Text(system_prompt.to_string()))
            .inference_config(inference_config)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let mut event_stream = output.stream;

        let out = stream! {
            loop {
                match event_stream.recv().await {
                    Ok(Some(ConverseStreamOutput::ContentBlockDelta(delta))) => {
                        if let Some(ContentBlockDelta::Text(text)) = delta.delta {
                            yield Ok(text);
                        }
                    }
                    Ok(Some(ConverseStreamOutput::MessageStop(_))) => break,
                    Ok(Some(_)) => continue,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(LlmError::StreamError(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_history_maps_roles() {
        let history = vec![
            ChatMessage {
                role: Role::User,
                text: "hello".into(),
            },
            ChatMessage {
                role: Role::Assistant,
                text: "hi".into(),
            },
        ];
        let converted = BedrockChatProvider::convert_history(&history);
        assert_eq!(converted.len(), 2);
        debug!("converted {} bedrock messages", converted.len());
    }
}
