mod process;

pub use process::{EngineCommand, ProcessEngine};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::AnalysisError;
use crate::rules::RuleKind;

pub type EnvVars = BTreeMap<String, String>;

/// Answers input requests coming from a running snippet.
///
/// `None` means no value is available, which suspends the run.
pub trait InputSupplier: Send {
    fn next_input(&mut self, prompt: &str) -> Option<String>;
}

impl<F> InputSupplier for F
where
    F: FnMut(&str) -> Option<String> + Send,
{
    fn next_input(&mut self, prompt: &str) -> Option<String> {
        self(prompt)
    }
}

/// Supplier for operations that never read input.
pub struct NoInput;

impl InputSupplier for NoInput {
    fn next_input(&mut self, _prompt: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(String),
    /// The snippet asked for input nobody could supply. Output produced up to
    /// this point is kept by the engine until `take_output` is called.
    NeedsInput { prompt: String },
}

/// The black-box tokenizer, parser, formatter and analyzer for one language.
///
/// Rules must be configured before every invocation: an invocation consumes
/// the whole configuration, so a second call without `configure` fails with
/// [`AnalysisError::NotConfigured`].
pub trait AnalysisEngine: Send {
    /// Loads a rule file for the next invocation.
    fn configure(&mut self, kind: RuleKind, rules: &Path) -> Result<(), AnalysisError>;

    fn run(
        &mut self,
        source: &Path,
        env: &EnvVars,
        input: &mut dyn InputSupplier,
    ) -> Result<RunOutcome, AnalysisError>;

    fn format(&mut self, source: &Path) -> Result<String, AnalysisError>;

    /// Returns an empty string when no configured rule is violated.
    fn analyze(&mut self, source: &Path) -> Result<String, AnalysisError>;

    /// Checks that the configured rules of `kind` are acceptable.
    fn verify(&mut self, kind: RuleKind) -> Result<(), AnalysisError>;

    /// Output lines printed before the last suspension.
    fn take_output(&mut self) -> Vec<String>;
}

/// Rule files configured for the next engine invocation.
#[derive(Debug, Default)]
pub struct EngineConfig {
    lexer: Option<PathBuf>,
    format: Option<PathBuf>,
    sca: Option<PathBuf>,
}

impl EngineConfig {
    fn slot(&mut self, kind: RuleKind) -> &mut Option<PathBuf> {
        match kind {
            RuleKind::Lexer => &mut self.lexer,
            RuleKind::Format => &mut self.format,
            RuleKind::Sca => &mut self.sca,
        }
    }

    pub fn set(&mut self, kind: RuleKind, path: &Path) {
        *self.slot(kind) = Some(path.to_path_buf());
    }

    pub fn take(&mut self, kind: RuleKind) -> Result<PathBuf, AnalysisError> {
        self.slot(kind).take().ok_or(AnalysisError::NotConfigured(kind))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Joins output lines the way the snippet printed them.
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines.iter().fold(String::new(), |mut acc, line| {
        acc.push_str(line.as_ref());
        acc.push('\n');
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_is_consumed() {
        let mut config = EngineConfig::default();
        config.set(RuleKind::Lexer, Path::new("lexer.json"));

        assert_eq!(config.take(RuleKind::Lexer).unwrap(), PathBuf::from("lexer.json"));
        assert!(matches!(
            config.take(RuleKind::Lexer),
            Err(AnalysisError::NotConfigured(RuleKind::Lexer))
        ));
        assert!(matches!(
            config.take(RuleKind::Sca),
            Err(AnalysisError::NotConfigured(RuleKind::Sca))
        ));
    }

    #[test]
    fn test_closure_supplier() {
        let mut values = vec!["b".to_string(), "a".to_string()];
        let mut supplier = move |_: &str| values.pop();

        assert_eq!(supplier.next_input("x"), Some("a".to_string()));
        assert_eq!(supplier.next_input("x"), Some("b".to_string()));
        assert_eq!(supplier.next_input("x"), None);
        assert_eq!(NoInput.next_input("x"), None);
    }

    #[test]
    fn test_join_lines() {
        assert_eq!(join_lines::<&str>(&[]), "");
        assert_eq!(join_lines(&["Enter: ", "5"]), "Enter: \n5\n");
    }
}
