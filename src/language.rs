mod registry;
mod runner;

pub use registry::{EngineFactory, RunnerRegistry};
pub use runner::{EngineRunner, LanguageRunner};

use std::path::{Path, PathBuf};

use crate::rules::RuleKind;

/// Default rule files of a language, used when a user has none stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageProfile {
    pub lexer_rules: PathBuf,
    pub format_rules: PathBuf,
    pub sca_rules: PathBuf,
}

impl LanguageProfile {
    pub fn default_rules(&self, kind: RuleKind) -> &Path {
        match kind {
            RuleKind::Lexer => &self.lexer_rules,
            RuleKind::Format => &self.format_rules,
            RuleKind::Sca => &self.sca_rules,
        }
    }
}
