use std::collections::VecDeque;
use std::path::Path;

use crate::engine::{EnvVars, InputSupplier, RunOutcome, join_lines};
use crate::error::AnalysisError;
use crate::language::LanguageRunner;
use crate::model::ExecutionResult;

/// Inputs handed out once each, in the order the request listed them.
#[derive(Debug, Default)]
pub struct InputQueue {
    inputs: VecDeque<String>,
}

impl InputQueue {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.inputs.len()
    }
}

impl InputSupplier for InputQueue {
    fn next_input(&mut self, prompt: &str) -> Option<String> {
        let value = self.inputs.pop_front();
        if value.is_none() {
            log::debug!("No input left for prompt {prompt:?}");
        }
        value
    }
}

/// Runs a snippet until it completes or asks for input nobody supplied.
///
/// A suspended session is never resumed in place. The caller replays it with
/// the previous inputs plus the new one.
pub fn run_interactive(
    runner: &mut dyn LanguageRunner,
    source: &Path,
    lexer_rules: Option<&Path>,
    env: &EnvVars,
) -> Result<ExecutionResult, AnalysisError> {
    match runner.execute(source, lexer_rules, env)? {
        RunOutcome::Completed(output) => Ok(ExecutionResult::Completed { output }),
        RunOutcome::NeedsInput { prompt } => {
            let mut partial_output = join_lines(&runner.drain_buffered_output());
            partial_output.push_str(&prompt);
            Ok(ExecutionResult::NeedsInput {
                partial_output,
                prompt,
            })
        }
    }
}

/// Runs a snippet whose inputs were all supplied upfront.
pub fn run_to_completion(
    runner: &mut dyn LanguageRunner,
    source: &Path,
    lexer_rules: Option<&Path>,
    env: &EnvVars,
) -> Result<String, AnalysisError> {
    match run_interactive(runner, source, lexer_rules, env)? {
        ExecutionResult::Completed { output } => Ok(output),
        ExecutionResult::NeedsInput { prompt, .. } => Err(AnalysisError::MissingInput { prompt }),
    }
}
