//! LLM prompts for summarization, section selection and answer refinement.
//!
//! Placeholders in braces (`{question}`) are substituted with
//! [`Prompts::fill`] before sending.

/// Collection of prompts used by the prompt executor.
pub struct Prompts;

impl Prompts {
    /// System prompt shared by every call.
    pub fn system_document_analyst() -> &'static str {
        "You are an expert document analyst. You read sections of long PDF documents \
         and answer strictly from their content."
    }

    /// Prompt to summarize a single section.
    pub fn summarize_section() -> &'static str {
        r#"Summarize the following section of a document so that a reader can decide whether the section is relevant to a question without reading it.

Keep the summary short (at most three sentences) and mention concrete entities, figures and topics the section covers.
If the section carries no meaningful information (e.g. it only repeats the heading), leave the summary empty.

Section title: {section_title}

Section text:
{section_text}"#
    }

    /// Prompt to choose which sections to fetch for a question.
    pub fn select_sections() -> &'static str {
        r#"You are given the summaries of all sections of a document, keyed by section ID, and a question about the document.

Section summaries:
{section_summaries}

Question: {question}

If some sections might contain the answer, call the `fetch_sections` function with the exact IDs of those sections and explain your reasoning.
If the question can be answered without reading any section, answer it directly."#
    }

    /// Prompt to refine an intermediate answer with one more section.
    pub fn refine_answer() -> &'static str {
        r#"You are answering a question by reading the sections of a document one at a time.

Question: {question}

Your current intermediate answer and the IDs of the sections it is based on:
{refine_io}

Next section:
{section}

Refine the intermediate answer using the new section. If the section does not help, return the previous answer unchanged.
Add the section's ID to the list of section IDs only if you used it; keep the IDs that were already there."#
    }

    /// Substitute `{key}` placeholders in a template.
    pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
        values
            .iter()
            .fold(template.to_string(), |acc, (key, value)| {
                acc.replace(&format!("{{{}}}", key), value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_replaces_all_placeholders() {
        let prompt = Prompts::fill(
            Prompts::select_sections(),
            &[("section_summaries", "{\"1\": \"Intro\"}"), ("question", "Why?")],
        );
        assert!(prompt.contains("Question: Why?"));
        assert!(prompt.contains("{\"1\": \"Intro\"}"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn test_templates_declare_placeholders() {
        assert!(Prompts::summarize_section().contains("{section_title}"));
        assert!(Prompts::summarize_section().contains("{section_text}"));
        assert!(Prompts::refine_answer().contains("{refine_io}"));
        assert!(Prompts::refine_answer().contains("{section}"));
    }
}
