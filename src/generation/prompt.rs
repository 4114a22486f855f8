use crate::store::ScoredDocument;

/// Fixed reply the model is told to give when the context has no answer
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found in the knowledge base.";

/// Concatenate retrieved passages, best match first
#[inline]
pub fn build_context(hits: &[ScoredDocument]) -> String {
    hits.iter()
        .map(|hit| hit.document.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Grounded answering prompt; an empty context still yields a prompt
#[inline]
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Use ONLY the following context to answer the question.\n\
         You MUST detect the language of the question below and respond ONLY in that language.\n\
         If the context does not contain relevant information to answer the question, respond with '{NO_RELEVANT_INFORMATION}'\n\
         If the question asks for a table, return it as clean markdown using pipe syntax (no code fences).\n\
         If it asks for a single number/year, return only that value.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Answer:"
    )
}
