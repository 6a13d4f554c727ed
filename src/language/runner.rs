use std::path::Path;
use std::sync::Arc;

use crate::engine::{AnalysisEngine, EnvVars, InputSupplier, RunOutcome};
use crate::error::AnalysisError;
use crate::model::Language;
use crate::rules::RuleKind;

use super::LanguageProfile;

/// Trait for running snippets of one language against its analysis engine
///
/// A runner is built per request by the registry and owns the input supplier
/// for that request. Every call configures the engine from scratch.
pub trait LanguageRunner: Send {
    fn language(&self) -> Language;

    /// Runs the snippet, using `lexer_rules` instead of the language default when given
    fn execute(
        &mut self,
        source: &Path,
        lexer_rules: Option<&Path>,
        env: &EnvVars,
    ) -> Result<RunOutcome, AnalysisError>;

    /// Returns the canonical text of the snippet
    fn format(&mut self, source: &Path, rules: &Path) -> Result<String, AnalysisError>;

    /// Returns the violations found, or an empty string
    fn analyze(&mut self, source: &Path, rules: &Path) -> Result<String, AnalysisError>;

    /// Asks the engine to accept a rule file
    fn verify_rules(&mut self, kind: RuleKind, rules: &Path) -> Result<(), AnalysisError>;

    /// Output printed before the last suspension
    fn drain_buffered_output(&mut self) -> Vec<String>;
}

pub struct EngineRunner {
    language: Language,
    profile: Arc<LanguageProfile>,
    engine: Box<dyn AnalysisEngine>,
    input: Box<dyn InputSupplier>,
}

impl EngineRunner {
    pub fn new(
        language: Language,
        profile: Arc<LanguageProfile>,
        engine: Box<dyn AnalysisEngine>,
        input: Box<dyn InputSupplier>,
    ) -> Self {
        Self {
            language,
            profile,
            engine,
            input,
        }
    }
}

impl LanguageRunner for EngineRunner {
    fn language(&self) -> Language {
        self.language
    }

    fn execute(
        &mut self,
        source: &Path,
        lexer_rules: Option<&Path>,
        env: &EnvVars,
    ) -> Result<RunOutcome, AnalysisError> {
        let lexer = lexer_rules.unwrap_or(&self.profile.lexer_rules);
        self.engine.configure(RuleKind::Lexer, lexer)?;
        self.engine.run(source, env, self.input.as_mut())
    }

    fn format(&mut self, source: &Path, rules: &Path) -> Result<String, AnalysisError> {
        self.engine.configure(RuleKind::Lexer, &self.profile.lexer_rules)?;
        self.engine.configure(RuleKind::Format, rules)?;
        self.engine.format(source)
    }

    fn analyze(&mut self, source: &Path, rules: &Path) -> Result<String, AnalysisError> {
        self.engine.configure(RuleKind::Lexer, &self.profile.lexer_rules)?;
        self.engine.configure(RuleKind::Sca, rules)?;
        self.engine.analyze(source)
    }

    fn verify_rules(&mut self, kind: RuleKind, rules: &Path) -> Result<(), AnalysisError> {
        self.engine.configure(kind, rules)?;
        self.engine.verify(kind)
    }

    fn drain_buffered_output(&mut self) -> Vec<String> {
        self.engine.take_output()
    }
}
