//! JSON rendering of quiz results.
//!
//! # Example
//!
//! ```rust
//! use mathdict_report::{json::JsonGenerator, Report};
//!
//! let report = Report::builder().quiz_title("Angles").build().unwrap();
//! let generator = JsonGenerator::new(&report);
//!
//! let compact = generator.generate().unwrap();
//! assert!(!compact.contains('\n'));
//!
//! let pretty = generator.generate_pretty().unwrap();
//! assert!(pretty.contains('\n'));
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{Report, ReportError, Result};

/// Serializes a [`Report`] to JSON.
#[derive(Debug)]
pub struct JsonGenerator<'a> {
    report: &'a Report,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates compact single-line JSON.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Generates indented JSON.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the JSON report to `path`, creating or truncating the file.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails and
    /// [`ReportError::Io`] if the file cannot be written.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::QuestionReview;
    use std::io::Read;

    fn sample_report() -> Report {
        Report::builder()
            .quiz_title("Percentages")
            .quiz_id("6f7c1c8e-4d0b-4f5e-8a53-0c9d3b1e2a77")
            .question(QuestionReview::new(
                1,
                "10% of 50?",
                vec!["5".to_string(), "10".to_string()],
                Some(0),
                0,
            ))
            .question(QuestionReview::new(
                2,
                "25% as a fraction?",
                vec!["1/5".to_string(), "1/4".to_string()],
                None,
                1,
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_generate_snapshot() {
        let report = sample_report();
        insta::assert_json_snapshot!(report, { ".generated_at" => "[timestamp]" }, @r###"
        {
          "quiz_title": "Percentages",
          "quiz_id": "6f7c1c8e-4d0b-4f5e-8a53-0c9d3b1e2a77",
          "generated_at": "[timestamp]",
          "summary": {
            "correct": 1,
            "incorrect": 0,
            "unanswered": 1,
            "total": 2,
            "score_percent": 50,
            "timed_out": false,
            "band": "fair",
            "message": "Not bad! There is still something to work on."
          },
          "questions": [
            {
              "number": 1,
              "question": "10% of 50?",
              "options": [
                "5",
                "10"
              ],
              "chosen": 0,
              "correct": 0,
              "is_correct": true
            },
            {
              "number": 2,
              "question": "25% as a fraction?",
              "options": [
                "1/5",
                "1/4"
              ],
              "chosen": null,
              "correct": 1,
              "is_correct": false
            }
          ]
        }
        "###);
    }

    #[test]
    fn test_generate_roundtrips() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate().unwrap();
        let parsed: Report = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.quiz_title, "Percentages");
        assert_eq!(parsed.summary, report.summary);
        assert_eq!(parsed.questions, report.questions);
    }

    #[test]
    fn test_write_to_file() {
        let report = sample_report();
        let path = std::env::temp_dir().join(format!(
            "mathdict-report-{}.json",
            std::process::id()
        ));

        JsonGenerator::new(&report)
            .write_to_file(&path, true)
            .unwrap();

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(contents.contains("\"score_percent\": 50"));
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let report = sample_report();
        let err = JsonGenerator::new(&report)
            .write_to_file(Path::new("/nonexistent-dir/mathdict/report.json"), false)
            .unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
