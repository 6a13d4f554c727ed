use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[default]
    Printscript,
    Java,
    Python,
    Go,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Printscript => "Printscript",
            Self::Java => "Java",
            Self::Python => "Python",
            Self::Go => "Go",
        };
        f.write_str(name)
    }
}

/// Outcome of one execution attempt.
///
/// `NeedsInput` is the suspension of an interactive session: the snippet asked
/// for a value that was not supplied. `partial_output` already ends with the
/// prompt, so it can be shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Completed {
        output: String,
    },
    NeedsInput {
        partial_output: String,
        prompt: String,
    },
}

impl ExecutionResult {
    pub fn output(&self) -> &str {
        match self {
            Self::Completed { output } => output,
            Self::NeedsInput { partial_output, .. } => partial_output,
        }
    }

    pub fn needs_input(&self) -> bool {
        matches!(self, Self::NeedsInput { .. })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnippetStatus {
    Compliant,
    NotCompliant,
}

/// Compliance outcome for one processing attempt of a snippet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: SnippetStatus,
    pub id: u64,
    pub owner_email: String,
}

impl StatusEvent {
    pub fn new(id: u64, status: SnippetStatus, owner_email: impl Into<String>) -> Self {
        Self {
            status,
            id,
            owner_email: owner_email.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_event_wire_shape() {
        let event = StatusEvent::new(7, SnippetStatus::NotCompliant, "dev@example.com");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "NOT_COMPLIANT",
                "id": 7,
                "ownerEmail": "dev@example.com"
            })
        );
    }

    #[test]
    fn test_language_defaults_to_printscript() {
        #[derive(Deserialize)]
        struct Job {
            #[serde(default)]
            language: Language,
        }

        let job: Job = serde_json::from_str("{}").unwrap();
        assert_eq!(job.language, Language::Printscript);

        let job: Job = serde_json::from_str(r#"{"language": "Go"}"#).unwrap();
        assert_eq!(job.language, Language::Go);
    }
}
