//! Deterministic cleanup of raw VLM output.
//!
//! Even well-prompted models occasionally wrap a table in
//! ` ```markdown … ``` ` fences despite the prompt saying not to, or emit
//! Windows line endings. Fixing those here, rather than escalating the
//! prompt, keeps the prompt focused on *what to extract* and makes each rule
//! independently testable.

use once_cell::sync::Lazy;
use regex::Regex;

/// Tidy a successful extraction.
///
/// Rules (applied in order):
/// 1. Strip one outer code fence (` ``` `, ` ```markdown `, ` ```latex `, …)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Trim leading/trailing blank lines
///
/// Content is never altered — an empty result stays empty, and interior
/// fenced blocks (e.g. a code listing inside a figure description) are left
/// alone because only a fence spanning the whole output is stripped.
pub fn tidy(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = s
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    s.trim_matches('\n').trim().to_string()
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence() {
        let raw = "```markdown\n| a | b |\n|---|---|\n| 1 | 2 |\n```";
        assert_eq!(tidy(raw), "| a | b |\n|---|---|\n| 1 | 2 |");
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(tidy("```\nhello\n```"), "hello");
    }

    #[test]
    fn strips_latex_fence() {
        assert_eq!(tidy("```latex\n$E = mc^2$\n```"), "$E = mc^2$");
    }

    #[test]
    fn leaves_interior_fences_alone() {
        let raw = "The figure shows code:\n\n```rust\nfn main() {}\n```\n\nand a caption.";
        assert_eq!(tidy(raw), raw);
    }

    #[test]
    fn normalises_crlf_and_trailing_whitespace() {
        assert_eq!(tidy("| a |  \r\n| 1 |\t\r\n"), "| a |\n| 1 |");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(tidy(""), "");
        assert_eq!(tidy("\n\n  \n"), "");
    }
}
