//! Default instruction templates for each extraction task.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — tuning how tables are transcribed or
//!    charts are summarised means editing exactly one place.
//!
//! 2. **Testability** — unit tests can assert on the templates directly
//!    without spinning up a real VLM.
//!
//! Callers override per request via
//! [`crate::client::ExtractionRequest::with_prompt`]; the constants here are
//! used only when no override is provided.

use crate::client::TaskKind;

/// Default prompt for table transcription.
pub const TABLE_PROMPT: &str = "\
This image is a table from a document.
Transcribe the entire table accurately as a Markdown table, including the \
header row and every data row and column.
Respond with the Markdown table only, without code fences or commentary.";

/// Default prompt for chart summarisation.
pub const CHART_PROMPT: &str = "\
This image is a chart from a document.
Summarise the chart's main content, the data trends it shows, and any \
notable insights.";

/// Default prompt for figure description.
pub const FIGURE_PROMPT: &str = "\
This image is a figure or diagram from a document.
Describe its content and purpose, summarising what it shows and what it means.";

/// Default prompt for plain embedded images.
pub const IMAGE_PROMPT: &str = "\
This image is embedded in a document.
Describe its main content and its significance within the document.";

/// Default prompt for formula transcription.
pub const FORMULA_PROMPT: &str = "\
This image is a mathematical formula from a document.
Transcribe the formula exactly as LaTeX.
Return only the LaTeX code, with no explanation or other text.
Example: $E = mc^2$ or \\[\\int_{0}^{\\infty} e^{-x^2} dx = \\frac{\\sqrt{\\pi}}{2}\\]";

/// The default instruction for a task kind.
///
/// Total over [`TaskKind`]: adding a variant without a template is a compile
/// error here, not a runtime surprise.
pub fn default_prompt(task: TaskKind) -> &'static str {
    match task {
        TaskKind::Table => TABLE_PROMPT,
        TaskKind::Chart => CHART_PROMPT,
        TaskKind::Figure => FIGURE_PROMPT,
        TaskKind::Image => IMAGE_PROMPT,
        TaskKind::Formula => FORMULA_PROMPT,
    }
}
