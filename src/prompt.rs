//! Prompt templates for the generation tasks.
//!
//! Pure string rendering, no I/O. Four templates: summary (style and
//! language), highlights (language, fixed JSON schema), presentation
//! outline (fixed JSON schema), and question answering over retrieved
//! context with an explicit refusal instruction.

use std::str::FromStr;

use crate::error::Error;

/// Separator placed between retrieved segments in the Q&A context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Marker inserted where the middle of an over-budget document was cut.
pub const TRUNCATION_MARKER: &str = "\n\n[... middle of document truncated ...]\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryStyle {
    Paragraph,
    Bullets,
    Executive,
}

impl SummaryStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStyle::Paragraph => "paragraph",
            SummaryStyle::Bullets => "bullets",
            SummaryStyle::Executive => "executive",
        }
    }
}

impl std::fmt::Display for SummaryStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paragraph" => Ok(SummaryStyle::Paragraph),
            "bullets" => Ok(SummaryStyle::Bullets),
            "executive" => Ok(SummaryStyle::Executive),
            other => Err(Error::Config(format!(
                "unknown summary style '{}', expected paragraph, bullets, or executive",
                other
            ))),
        }
    }
}

fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "cs" => "Czech",
        other => other,
    }
}

fn language_instruction(language: &str) -> String {
    format!("Write your response in {}.", language_name(language))
}

pub fn build_summary_prompt(text: &str, style: SummaryStyle, language: &str) -> String {
    let instruction = match style {
        SummaryStyle::Paragraph => {
            "Write a concise 3-5 paragraph executive summary of the following document."
        }
        SummaryStyle::Bullets => {
            "Summarize the following document as 7-10 bullet points. Be specific."
        }
        SummaryStyle::Executive => {
            "Write a 1-page executive summary suitable for C-level readers. \
             Include: Purpose, Key Findings, Recommendations, and Next Steps."
        }
    };

    format!(
        "{instruction}\n{lang}\n\nDOCUMENT:\n\"\"\"\n{text}\n\"\"\"\n\nSUMMARY:",
        instruction = instruction,
        lang = language_instruction(language),
        text = text,
    )
}

pub fn build_highlights_prompt(text: &str, language: &str) -> String {
    format!(
        "Analyze the following document and extract:\n\
         1. The 5 most important key concepts (as a numbered list).\n\
         2. The 5 most significant key sentences verbatim from the text (as a numbered list).\n\
         3. The main topics covered (as a comma-separated list).\n\
         {lang}\n\n\
         DOCUMENT:\n\"\"\"\n{text}\n\"\"\"\n\n\
         Respond in valid JSON with keys: \"key_concepts\", \"key_sentences\", \"topics\".\n\
         JSON:",
        lang = language_instruction(language),
        text = text,
    )
}

pub fn build_presentation_prompt(text: &str, language: &str) -> String {
    format!(
        "Create a structured presentation outline from the following document.\n\
         Return a JSON object with:\n\
         - \"title\": the presentation title\n\
         - \"slides\": an array of objects, each with:\n\
         \x20   - \"title\": slide title\n\
         \x20   - \"bullets\": list of 3-5 bullet points\n\
         \x20   - \"notes\": optional speaker notes (1-2 sentences)\n\n\
         Aim for 6-10 slides total.\n\
         {lang}\n\n\
         DOCUMENT:\n\"\"\"\n{text}\n\"\"\"\n\n\
         JSON:",
        lang = language_instruction(language),
        text = text,
    )
}

pub fn build_qa_prompt(context_chunks: &[String], question: &str) -> String {
    let context = context_chunks.join(CONTEXT_SEPARATOR);
    format!(
        "Answer the user's question using ONLY the information from the provided context.\n\
         If the answer is not in the context, say \"I don't have enough information to answer that.\"\n\n\
         CONTEXT:\n\"\"\"\n{context}\n\"\"\"\n\n\
         QUESTION: {question}\n\n\
         ANSWER:",
        context = context,
        question = question,
    )
}

/// Cut the middle out of text exceeding `max_chars`, replacing it with
/// [`TRUNCATION_MARKER`]. Returns the (possibly shortened) text and a
/// flag indicating whether truncation happened.
pub fn truncate_middle(text: &str, max_chars: usize) -> (String, bool) {
    if text.len() <= max_chars {
        return (text.to_string(), false);
    }

    let half = max_chars / 2;
    let head_end = floor_char_boundary(text, half);
    let tail_start = ceil_char_boundary(text, text.len() - half);

    let mut out = String::with_capacity(max_chars + TRUNCATION_MARKER.len());
    out.push_str(&text[..head_end]);
    out.push_str(TRUNCATION_MARKER);
    out.push_str(&text[tail_start..]);
    (out, true)
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
