//! Prompt assembly.
//!
//! Merges retrieved chunks into a labelled context block and renders the
//! system/user message pair sent to the chat provider. The user message is
//! the verbatim visitor question; conversation history is not fed back in,
//! so each turn stands alone.

use crate::models::RetrievedChunk;

/// The two messages handed to a chat provider.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// Render the prompt for one question. `name` is the person the assistant
/// represents.
pub fn assemble(chunks: &[RetrievedChunk], question: &str, name: &str) -> RenderedPrompt {
    let context = context_block(chunks);

    let system = format!(
        "You are the portfolio assistant for {name}. You help visitors learn about \
         {name}'s projects, skills, and experience. Be friendly, professional, and \
         informative, and answer using the provided context. For questions about \
         education or work history, rely on the resume content in the context. \
         If the context does not contain the answer, say so honestly.\n\n\
         Context:\n{context}",
        name = name,
        context = context,
    );

    RenderedPrompt {
        system,
        user: question.to_string(),
    }
}

/// Label each chunk with its ordinal and source type so the model can tell
/// repository facts from resume facts.
fn context_block(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[Source {} - {}]: {}",
                i + 1,
                chunk.metadata.source_type,
                chunk.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
