use async_trait::async_trait;
use log::info;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ ChatClient, CompletionResponse };
use crate::llm::LlmConfig;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let chat_model = model.unwrap_or_else(|| "gpt-4o".to_string());
        let api_url = base_url.unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            model: chat_model,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "OpenAI API key is required for OpenAIChatClient".to_string())?;

        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(
        &self,
        prompt: &str
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        info!("OpenAIChatClient::complete() → model={} url={}", self.model, self.base_url);
        let req = OpenAIChatRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let resp = self.http.post(&self.base_url).json(&req).send().await?.error_for_status()?;
        let data = resp.json::<OpenAIResponse>().await?;
        let choice = data.choices
            .into_iter()
            .next()
            .ok_or("OpenAI response contained no choices")?;

        Ok(CompletionResponse { response: choice.message.content })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
