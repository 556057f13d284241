//! Assembles ranked search hits into a context prompt and invokes a
//! [`ChatModel`] for a generated answer, attaching the source
//! references the answer was grounded on.

use crate::backend::ChatModel;
use crate::error::Result;
use crate::model::{HybridResult, ScoredDocument};
use std::sync::Arc;

const MAX_PASSAGES: usize = 8;
const MAX_PASSAGE_CHARS: usize = 2000;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ComposedAnswer {
    pub answer: String,
    pub references: Vec<String>,
}

pub struct AnswerComposer {
    chat_model: Arc<dyn ChatModel>,
}

impl AnswerComposer {
    pub fn new(chat_model: Arc<dyn ChatModel>) -> Self {
        Self { chat_model }
    }

    /// Builds a context prompt from `result`'s top passages and asks
    /// the chat model to answer `question` grounded on them. An empty
    /// result set still produces an answer (the model is told there is
    /// no supporting context) rather than short-circuiting.
    pub async fn compose(&self, question: &str, result: &HybridResult) -> Result<ComposedAnswer> {
        let passages: Vec<&ScoredDocument> = result.documents.iter().take(MAX_PASSAGES).collect();
        let prompt = build_prompt(question, &passages);
        let answer = self.chat_model.complete(&prompt).await?;
        let references = passages.iter().map(|p| p.id.clone()).collect();
        Ok(ComposedAnswer { answer, references })
    }
}

fn build_prompt(question: &str, passages: &[&ScoredDocument]) -> String {
    let mut prompt = String::new();
    prompt.push_str("Answer the question using only the context passages below. Cite passage ids you relied on.\n\n");
    if passages.is_empty() {
        prompt.push_str("Context: (no passages retrieved)\n\n");
    } else {
        for (i, passage) in passages.iter().enumerate() {
            let content = passage_text(passage);
            prompt.push_str(&format!("[{}] id={}\n{}\n\n", i + 1, passage.id, content));
        }
    }
    prompt.push_str(&format!("Question: {question}\n"));
    prompt
}

fn passage_text(passage: &ScoredDocument) -> String {
    let text = passage
        .source_json
        .get("content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .unwrap_or_default();
    truncate_chars(&text, MAX_PASSAGE_CHARS)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
