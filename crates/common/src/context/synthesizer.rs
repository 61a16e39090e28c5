//! Answer synthesis - grounds the language model in the retrieved context

use super::assembler::RetrievalContext;
use crate::errors::Result;
use crate::llm::{collect_stream, CompletionRequest, LanguageModel};
use std::sync::Arc;

/// Synthesis options
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Sentence the model must use when the context is insufficient
    pub fallback_answer: String,

    /// Provider default when `None`
    pub temperature: Option<f32>,
}

/// Streams a grounded answer for an assembled context
pub struct Synthesizer {
    llm: Arc<dyn LanguageModel>,
    options: SynthesisOptions,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>, options: SynthesisOptions) -> Self {
        Self { llm, options }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are an assistant specialised in regulatory documents.\n\
            You will be given two kinds of information:\n\
            1. 'CONTEXT (seed chunk)': passages directly related to the question, labelled with \
            their institution and source document.\n\
            2. 'RELATED CITATIONS' and 'ADDITIONAL CONTEXT': citations from those passages to \
            other documents, and the text of the cited articles.\n\n\
            Combine this information to answer the question thoroughly.\n\
            Base your answer ONLY on the information provided.\n\
            If the answer is not in the context, reply exactly: '{}'\n\
            Answer clearly and concisely.",
            self.options.fallback_answer
        )
    }

    /// Build the completion request for a context
    pub fn build_request(&self, context: &RetrievalContext) -> CompletionRequest {
        let user = format!("CONTEXT:\n{}\n\nQUESTION: {}", context.render(), context.query);
        CompletionRequest::text(self.system_prompt(), user).with_temperature(self.options.temperature)
    }

    /// Stream the answer, forwarding each fragment to `on_token`
    pub async fn synthesize<F>(&self, context: &RetrievalContext, on_token: F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let request = self.build_request(context);
        let stream = self.llm.complete_stream(&request).await?;
        collect_stream(stream, on_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SeedChunk;
    use crate::llm::ScriptedLanguageModel;

    fn context() -> RetrievalContext {
        RetrievalContext {
            query: "When are licence fees due?".into(),
            seeds: vec![SeedChunk {
                chunk_id: "k0".into(),
                text: "Article 9\nFees are due in January.".into(),
                document: "Licensing Regulation".into(),
                institution: Some("Energy Regulator".into()),
                score: 0.8,
            }],
            relations: vec![],
        }
    }

    fn options() -> SynthesisOptions {
        SynthesisOptions {
            fallback_answer: "Not in the documents.".into(),
            temperature: None,
        }
    }

    #[test]
    fn test_prompt_carries_context_question_and_fallback() {
        let synthesizer = Synthesizer::new(Arc::new(ScriptedLanguageModel::new("")), options());
        let request = synthesizer.build_request(&context());

        assert!(request.system.contains("'Not in the documents.'"));
        assert!(request.user.starts_with("CONTEXT:\n--- CONTEXT 1 (seed chunk)"));
        assert!(request.user.ends_with("QUESTION: When are licence fees due?"));
    }

    #[tokio::test]
    async fn test_streamed_answer_is_concatenated() {
        let llm = Arc::new(ScriptedLanguageModel::new("Fees are due in January."));
        let synthesizer = Synthesizer::new(llm.clone(), options());

        let mut fragments = 0;
        let answer = synthesizer
            .synthesize(&context(), |_| fragments += 1)
            .await
            .unwrap();

        assert_eq!(answer, "Fees are due in January.");
        assert_eq!(fragments, 5);
        assert_eq!(llm.requests().len(), 1);
    }
}
