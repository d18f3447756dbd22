use async_trait::async_trait;
use std::error::Error as StdError;
use log::{ debug, info };

use super::{ ChatClient, CompletionResponse };
use crate::llm::LlmConfig;
use rllm::chat::{ ChatMessage, ChatRole, MessageType };
use rllm::builder::{ LLMBackend, LLMBuilder };
use rllm::LLMProvider;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiChatClient {
    llm: Box<dyn LLMProvider + Send + Sync>,
    model: String,
    base_url: Option<String>,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        let mut builder = LLMBuilder::new()
            .backend(LLMBackend::Google)
            .api_key(api_key)
            .model(&chat_model)
            .stream(false);

        if let Some(url) = &base_url {
            builder = builder.base_url(url);
        }

        let llm_provider = builder.build()?;

        Ok(Self {
            llm: llm_provider,
            model: chat_model,
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Google API key is required for GeminiChatClient".to_string())?;

        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }
}

/// A reply with no usable text is a failed completion, not an empty message.
fn reply_text(text: Option<String>) -> Result<String, Box<dyn StdError + Send + Sync>> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err("Gemini returned no text".into()),
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(
        &self,
        prompt: &str
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            content: prompt.to_string(),
            message_type: MessageType::Text,
        }];
        info!("GeminiChatClient::complete() → model={} base_url={:?}", self.model, self.base_url);

        let resp = self.llm.chat(&messages).await?;
        let text = reply_text(resp.text().map(|s| s.to_string()))?;
        debug!("Gemini returned {} bytes", text.len());
        Ok(CompletionResponse { response: text })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_text_keeps_real_text() {
        assert_eq!(reply_text(Some("Hi! How can I help?".into())).unwrap(), "Hi! How can I help?");
    }

    #[test]
    fn missing_or_blank_reply_is_an_error() {
        assert!(reply_text(None).is_err());
        assert!(reply_text(Some(String::new())).is_err());
        assert!(reply_text(Some("  \n".into())).is_err());
    }

    #[test]
    fn from_config_requires_an_api_key() {
        let config = LlmConfig { api_key: None, ..LlmConfig::default() };
        assert!(GeminiChatClient::from_config(&config).is_err());
    }
}
