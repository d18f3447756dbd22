pub mod chat;
use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Gemini,
    OpenAI,
    Ollama,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}
impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmType::Gemini),
            "openai" => Ok(LlmType::OpenAI),
            "ollama" => Ok(LlmType::Ollama),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmType::Gemini => write!(f, "gemini"),
            LlmType::OpenAI => write!(f, "openai"),
            LlmType::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Gemini,
            api_key: None,
            completion_model: None,
            base_url: None,
        }
    }
}

impl LlmConfig {
    /// Empty strings from the environment count as unset.
    pub fn from_parts(
        llm_type: &str,
        api_key: &str,
        completion_model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, ParseLlmTypeError> {
        Ok(Self {
            llm_type: llm_type.parse()?,
            api_key: Some(api_key.to_string()).filter(|k| !k.is_empty()),
            completion_model: completion_model.filter(|m| !m.trim().is_empty()),
            base_url: base_url.filter(|u| !u.trim().is_empty()),
        })
    }
}
