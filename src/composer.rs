//! # Answer composer
//!
//! Stuffs retrieved chunks into the prompt template and asks the language model.

use tracing::debug;

use crate::api::LanguageModel;
use crate::segmenter::Chunk;
use crate::template::PromptTemplate;
use crate::Result;

pub const CONTEXT_SEPARATOR: &str = "\n\n";

pub struct AnswerComposer<'a> {
    model: &'a dyn LanguageModel,
    template: &'a PromptTemplate,
}

impl<'a> AnswerComposer<'a> {
    pub fn new(model: &'a dyn LanguageModel, template: &'a PromptTemplate) -> Self {
        Self { model, template }
    }

    /// Chunk texts in rank order, separated by a blank line.
    pub fn context_block(chunks: &[Chunk]) -> String {
        chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }

    pub fn compose_prompt(&self, question: &str, chunks: &[Chunk]) -> String {
        self.template
            .render(&Self::context_block(chunks), question)
    }

    /// One generation call over the composed prompt. An empty `chunks` still asks the model.
    pub async fn answer(&self, question: &str, chunks: &[Chunk]) -> Result<String> {
        let prompt = self.compose_prompt(question, chunks);
        debug!(
            "Composed prompt from {} chunks ({} chars)",
            chunks.len(),
            prompt.chars().count()
        );
        self.model.generate(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use crate::RagError;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            heading: None,
            text: text.to_string(),
            sequence_index: 0,
        }
    }

    fn template() -> PromptTemplate {
        PromptTemplate {
            system_prompt: "sys".into(),
            prompt: "{context}\n---\n{question}".into(),
        }
    }

    #[test]
    fn context_preserves_rank_order() {
        let block = AnswerComposer::context_block(&[chunk("second best"), chunk("best")]);
        assert_eq!(block, "second best\n\nbest");
        assert_eq!(AnswerComposer::context_block(&[]), "");
    }

    #[tokio::test]
    async fn answer_sends_one_prompt() {
        let model = ScriptedModel::answering("forty-two");
        let template = template();
        let composer = AnswerComposer::new(&model, &template);

        let answer = composer
            .answer("What is the answer?", &[chunk("a"), chunk("b")])
            .await
            .unwrap();

        assert_eq!(answer, "forty-two");
        assert_eq!(model.prompts(), vec!["a\n\nb\n---\nWhat is the answer?"]);
    }

    #[tokio::test]
    async fn empty_context_still_generates() {
        let model = ScriptedModel::answering("I don't know.");
        let template = template();
        let composer = AnswerComposer::new(&model, &template);

        assert_eq!(composer.answer("q", &[]).await.unwrap(), "I don't know.");
        assert_eq!(model.prompts(), vec!["\n---\nq"]);
    }

    #[tokio::test]
    async fn generation_errors_propagate() {
        let model = ScriptedModel::failing("model offline");
        let template = template();
        let composer = AnswerComposer::new(&model, &template);
        assert!(matches!(
            composer.answer("q", &[chunk("a")]).await,
            Err(RagError::Generation(_))
        ));
    }
}
