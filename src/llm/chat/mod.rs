pub mod ollama;
pub mod openai;
pub mod gemini;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use self::gemini::GeminiChatClient;

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

/// Text in, text out. The relay treats the model behind it as opaque.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Gemini => {
            let specific_client = GeminiChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}
