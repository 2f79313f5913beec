//! Markdown rendering of quiz results.
//!
//! The generated document has a summary table, the score band message and a
//! per-question review that marks each chosen and correct option.
//!
//! # Example
//!
//! ```rust
//! use mathdict_report::{MarkdownGenerator, Report};
//!
//! let report = Report::builder().quiz_title("Angles").build().unwrap();
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("| Score | 0% |"));
//! ```

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::{QuestionReview, Report};

/// Generates Markdown documents from quiz results.
pub struct MarkdownGenerator<'a> {
    report: &'a Report,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_review(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Quiz Results: {}\n",
            escape_markdown(&self.report.quiz_title)
        );
    }

    /// Writes the summary table and the band message.
    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Score | {}% |", summary.score_percent);
        let _ = writeln!(
            output,
            "| Correct | {} of {} |",
            summary.correct, summary.total
        );
        let _ = writeln!(output, "| Incorrect | {} |", summary.incorrect);
        let _ = writeln!(output, "| Unanswered | {} |", summary.unanswered);
        let ended = if summary.timed_out {
            "Time ran out"
        } else {
            "Finished"
        };
        let _ = writeln!(output, "| Ended | {ended} |");
        let _ = writeln!(output);

        let _ = writeln!(output, "> {}\n", summary.band.message());
    }

    fn write_review(&self, output: &mut String) {
        let _ = writeln!(output, "## Review\n");

        if self.report.questions.is_empty() {
            let _ = writeln!(output, "*This quiz had no questions.*\n");
            return;
        }

        for question in &self.report.questions {
            Self::write_question(output, question);
        }
    }

    fn write_question(output: &mut String, question: &QuestionReview) {
        let mark = if question.is_correct {
            "correct"
        } else if question.chosen.is_none() {
            "unanswered"
        } else {
            "incorrect"
        };
        let _ = writeln!(
            output,
            "### {}. {} ({mark})\n",
            question.number,
            escape_markdown(&question.question)
        );

        for (index, option) in question.options.iter().enumerate() {
            let mut tags = Vec::new();
            if question.chosen == Some(index) {
                tags.push("your answer");
            }
            if question.correct == index {
                tags.push("correct answer");
            }
            let option = escape_markdown(option);
            if tags.is_empty() {
                let _ = writeln!(output, "- {option}");
            } else {
                let _ = writeln!(output, "- **{option}** *({})*", tags.join(", "));
            }
        }

        let _ = writeln!(output);
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&self.report.generated_at);
        let _ = writeln!(output, "*Generated by mathdict at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes Markdown control characters.
///
/// Newlines become `<br>` so question text stays on one line.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}
