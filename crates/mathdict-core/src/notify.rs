//! User-facing notices for admin actions and session prompts.

use serde::{Deserialize, Serialize};

use crate::error::{DictError, ErrorCategory};

/// How a notice is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// The action succeeded.
    Success,
    /// The action failed.
    Error,
    /// Ordinary feedback that asks the user to do something.
    Prompt,
}

/// A short message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Presentation level.
    pub level: NoticeLevel,
    /// The message.
    pub message: String,
}

impl Notice {
    /// A success notice.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    /// A prompt.
    #[must_use]
    pub fn prompt(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Prompt,
            message: message.into(),
        }
    }

    /// The notice for an error. Session prompts stay prompts; everything
    /// else is an error notice showing the first line of the message.
    #[must_use]
    pub fn error(err: &DictError) -> Self {
        let text = err.to_string();
        let message = text.lines().next().unwrap_or_default().to_string();
        let level = if err.category() == ErrorCategory::Prompt {
            NoticeLevel::Prompt
        } else {
            NoticeLevel::Error
        };
        Self { level, message }
    }
}
