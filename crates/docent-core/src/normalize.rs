//! Whitespace and hyphenation normalization applied to every extracted text.
//!
//! Extractors produce text with incidental line wrapping (PDF layout,
//! hard-wrapped plain text). Normalization rejoins words split across
//! lines, folds wrapped lines back into their paragraph, and keeps exactly
//! one blank line between paragraphs so the chunker can split on `"\n\n"`.

use std::sync::LazyLock;

use regex::Regex;

static HYPHENATED_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w)-\n(\w)").expect("hyphenation pattern is valid"));

/// A newline, optional whitespace-only lines, and a final newline.
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph pattern is valid"));

static LINE_WRAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").expect("line wrap pattern is valid"));

/// Normalize extracted text.
///
/// 1. Line endings become `\n`; the text is trimmed.
/// 2. `"exam-\nple"` becomes `"example"`.
/// 3. Single newlines inside a paragraph collapse to one space.
/// 4. Runs of blank lines become exactly one blank line.
///
/// ```rust
/// use docent_core::normalize::normalize_text;
///
/// let text = normalize_text("An exam-\nple of\nwrapping.\n\n\n\nNext one.");
/// assert_eq!(text, "An example of wrapping.\n\nNext one.");
/// ```
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let repaired = repair_hyphenation(unified.trim());

    PARAGRAPH_BREAK
        .split(&repaired)
        .map(|paragraph| LINE_WRAP.replace_all(paragraph.trim(), " ").into_owned())
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Join words split by a hyphen at a line end. Matches consume the first
/// letter of the next line, so one-letter lines need another pass.
fn repair_hyphenation(text: &str) -> String {
    let mut text = text.to_string();
    while HYPHENATED_BREAK.is_match(&text) {
        text = HYPHENATED_BREAK.replace_all(&text, "${1}${2}").into_owned();
    }
    text
}
