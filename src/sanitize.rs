//! Cleanup of formatting artifacts left in stored prompt text,
//! mostly produced by bulleted text-generation output.

use regex::Regex;
use std::sync::LazyLock;

static QUESTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Question \d+[:=]\s*").expect("question header pattern is valid")
});

/// Strip a leading `- ` bullet and a leading `Question N:` / `Question N=` header.
///
/// Returns `None` when nothing playable remains.
pub fn sanitize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let without_bullet = match trimmed.strip_prefix('-') {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => trimmed,
    };
    let cleaned = QUESTION_HEADER.replace(without_bullet, "");
    let cleaned = cleaned.trim();

    (!cleaned.is_empty()).then(|| cleaned.to_string())
}
