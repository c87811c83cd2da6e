//! # API Module
//!
//! Text generation over OpenAI-compatible chat completion APIs (OpenAI, Ollama, LM Studio,
//! vLLM and friends).
//!
//! The pipeline only needs one capability from a chat model: prompt in, text out. That is the
//! [`LanguageModel`] trait. [`OpenAiLanguageModel`] implements it with `async-openai`, sending
//! the template's system prompt followed by the composed prompt as a single user message.
//!
//! # Example
//!
//! ```no_run
//! use awful_rag::api::{LanguageModel, OpenAiLanguageModel};
//!
//! # async fn run() -> awful_rag::Result<()> {
//! let model = OpenAiLanguageModel::new(
//!     "http://localhost:11434/v1",
//!     "ollama",
//!     "deepseek-r1:1.5b",
//!     "You answer questions about documents.",
//! );
//! let answer = model.generate("What is the meaning of life?").await?;
//! println!("{answer}");
//! # Ok(()) }
//! ```
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use tracing::debug;

use crate::config::RagConfig;
use crate::template::PromptTemplate;
use crate::{RagError, Result};

/// Prompt in, generated text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Chat completion client for any OpenAI-compatible endpoint.
pub struct OpenAiLanguageModel {
    client: Client<OpenAIConfig>,
    model: String,
    system_prompt: String,
}

impl OpenAiLanguageModel {
    pub fn new(api_base: &str, api_key: &str, model: &str, system_prompt: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        debug!("Client created for {} at {}", model, api_base);
        Self {
            client: Client::with_config(openai_config),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
        }
    }

    pub fn from_config(config: &RagConfig, template: &PromptTemplate) -> Self {
        Self::new(
            &config.api_base,
            &config.api_key,
            &config.model,
            &template.system_prompt,
        )
    }

    fn messages(&self, prompt: &str) -> Vec<ChatCompletionRequestMessage> {
        vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(
                    self.system_prompt.clone(),
                ),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
                name: None,
            }),
        ]
    }
}

fn generation_error(err: impl std::fmt::Display) -> RagError {
    RagError::Generation(err.to_string())
}

#[async_trait]
impl LanguageModel for OpenAiLanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(self.messages(prompt))
            .build()
            .map_err(generation_error)?;

        debug!("Sending request: {:?}", request);

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(generation_error)?;

        let mut response_string = String::new();
        response.choices.iter().for_each(|chat_choice| {
            if let Some(message_text) = &chat_choice.message.content {
                response_string.push_str(message_text);
            }
        });

        Ok(response_string)
    }
}
