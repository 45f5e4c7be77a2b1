//! Deterministic prompt-preamble assembly.
//!
//! Composes memory, goals, and retrieval results into the labeled sections
//! appended to the system prompt. A section is emitted only when its source
//! is non-empty; with nothing to say, the preamble is the empty string.

use crate::index::SearchHit;
use crate::retrieval::format_rag_context;
use crate::stores::Goal;

const MEMORY_HEADER: &str = "### Previous Learning Context:";
const GOALS_HEADER: &str = "### User's Goals:";
const RAG_HEADER: &str = "### Relevant Document Context:";

const MEMORY_FOOTER: &str =
    "Use this context to personalize your responses and build upon previous interactions.";
const GOALS_FOOTER: &str = "Keep these goals in mind when providing assistance. Help the user \
     work towards achieving these goals and provide relevant progress updates.";
const RAG_FOOTER: &str = "Use this document context to provide accurate, detailed answers. \
     Always cite the source document when referencing information from the uploaded documents.";

/// Formats one goal as `- {title} (Status: {status})[: {description}]
/// [ [Deadline: YYYY-MM-DD]]`.
#[must_use]
pub fn format_goal(goal: &Goal) -> String {
    let mut line = format!("- {} (Status: {})", goal.title, goal.status);
    if !goal.description.is_empty() {
        line.push_str(": ");
        line.push_str(&goal.description);
    }
    if let Some(deadline) = goal.deadline {
        line.push_str(&format!(" [Deadline: {}]", deadline.format("%Y-%m-%d")));
    }
    line
}

/// Assembles the prompt preamble from memory, goals, and retrieval results.
///
/// Empty sources contribute nothing; all-empty input yields an empty string
/// with no stray headers.
#[must_use]
pub fn compose(memory: &str, goals: &[Goal], hits: &[SearchHit]) -> String {
    let mut preamble = String::new();

    let memory = memory.trim();
    if !memory.is_empty() {
        preamble.push_str(&format!("\n\n{MEMORY_HEADER}\n{memory}\n\n{MEMORY_FOOTER}"));
    }

    if !goals.is_empty() {
        let lines: Vec<String> = goals.iter().map(format_goal).collect();
        preamble.push_str(&format!(
            "\n\n{GOALS_HEADER}\n{}\n\n{GOALS_FOOTER}",
            lines.join("\n")
        ));
    }

    if !hits.is_empty() {
        preamble.push_str(&format!(
            "\n\n{RAG_HEADER}\n{}\n\n{RAG_FOOTER}",
            format_rag_context(hits)
        ));
    }

    preamble
}
