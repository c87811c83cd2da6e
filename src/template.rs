//! # Prompt templates
//!
//! A [`PromptTemplate`] decides how retrieved context and the user's question are put in front
//! of the language model. It is a small YAML document:
//!
//! ```yaml
//! # <config_dir>/templates/rag_answer.yaml
//! system_prompt: "You are a careful assistant that answers questions about a document."
//! prompt: |
//!   Use the following pieces of context to answer the question at the end.
//!
//!   {context}
//!
//!   Question: {question}
//!   Helpful Answer:
//! ```
//!
//! `{context}` receives the retrieved chunks joined by blank lines and `{question}` the query.
//! Both placeholders must be present.
//!
//! Templates are resolved from `<config_dir>/templates/<name>.yaml`, where `<config_dir>` comes
//! from [`crate::config_dir()`]. When no name is configured the built-in
//! [`PromptTemplate::default`] is used.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::{RagError, Result};

pub const DEFAULT_TEMPLATE_NAME: &str = "rag_answer";
pub const CONTEXT_PLACEHOLDER: &str = "{context}";
pub const QUESTION_PLACEHOLDER: &str = "{question}";

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that answers questions about a single document.";

const DEFAULT_PROMPT: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.

{context}

Question: {question}
Helpful Answer:";

/// Instructions plus a prompt body with `{context}` and `{question}` slots.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// Sent as the system message on every request.
    pub system_prompt: String,

    pub prompt: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Fill both placeholders in a single left-to-right pass.
    ///
    /// Placeholder text appearing inside `context` or `question` is left untouched.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut rendered = String::with_capacity(self.prompt.len() + context.len() + question.len());
        let mut rest = self.prompt.as_str();

        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let tail = &rest[start..];
            if tail.starts_with(CONTEXT_PLACEHOLDER) {
                rendered.push_str(context);
                rest = &tail[CONTEXT_PLACEHOLDER.len()..];
            } else if tail.starts_with(QUESTION_PLACEHOLDER) {
                rendered.push_str(question);
                rest = &tail[QUESTION_PLACEHOLDER.len()..];
            } else {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
        rendered.push_str(rest);
        rendered
    }

    pub fn validate(&self) -> Result<()> {
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !self.prompt.contains(placeholder) {
                return Err(RagError::Config(format!(
                    "prompt template is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(())
    }
}

/// Load a prompt template by name from `<config_dir>/templates/<name>.yaml`.
pub fn load_template(name: &str) -> Result<PromptTemplate> {
    let path = crate::config_dir()?
        .join("templates")
        .join(format!("{name}.yaml"));
    load_template_from(&path)
}

/// Load and validate a prompt template from an explicit path.
pub fn load_template_from(path: &Path) -> Result<PromptTemplate> {
    tracing::info!("Loading template: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        RagError::Config(format!("cannot read template {}: {e}", path.display()))
    })?;
    let template: PromptTemplate = serde_yaml::from_str(&content)?;
    template.validate()?;
    Ok(template)
}

/// The named template, or the built-in default when `name` is `None`.
pub fn resolve(name: Option<&str>) -> Result<PromptTemplate> {
    match name {
        Some(name) => load_template(name),
        None => Ok(PromptTemplate::default()),
    }
}
