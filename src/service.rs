use std::fmt::Display;
use std::sync::Arc;

use crate::engine::{EnvVars, InputSupplier, NoInput};
use crate::error::{AnalysisError, ServiceError, ServiceResult};
use crate::identity::CallerIdentity;
use crate::interactive::{InputQueue, run_interactive, run_to_completion};
use crate::language::{LanguageRunner, RunnerRegistry};
use crate::model::{ExecutionResult, Language};
use crate::rules::{RuleKind, RuleSet, check_lexer_patterns, check_sca_values};
use crate::upstream::{AssetStore, RuleStore};
use crate::workfile::{WorkDir, WorkingFile};

/// Execute, format and analyze operations shared by the HTTP routes and the queue consumers.
///
/// Every operation follows the same order: fetch the snippet and rules,
/// materialize working files, invoke the runner on the blocking pool, and
/// release the working files when the runner task ends.
pub struct SnippetService {
    assets: Arc<dyn AssetStore>,
    rules: Arc<dyn RuleStore>,
    registry: Arc<RunnerRegistry>,
    work_dir: WorkDir,
}

impl SnippetService {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        rules: Arc<dyn RuleStore>,
        registry: RunnerRegistry,
        work_dir: WorkDir,
    ) -> Self {
        Self {
            assets,
            rules,
            registry: Arc::new(registry),
            work_dir,
        }
    }

    /// Runs a snippet with all of its inputs supplied upfront.
    pub async fn execute(
        &self,
        snippet_id: u64,
        language: Language,
        inputs: Vec<String>,
        envs: EnvVars,
        caller: &CallerIdentity,
    ) -> ServiceResult<String> {
        log::debug!("Executing snippet {snippet_id} with {} inputs", inputs.len());
        let result = async {
            let (source, lexer) = self.prepare_execution(snippet_id, language, caller).await?;
            self.invoke(language, Box::new(InputQueue::new(inputs)), move |runner| {
                run_to_completion(runner, source.path(), lexer.as_ref().map(WorkingFile::path), &envs)
            })
            .await
        }
        .await;
        log_outcome("Execution", snippet_id, &result);
        result
    }

    /// Runs a snippet until it completes or needs an input that was not supplied.
    pub async fn execute_live(
        &self,
        snippet_id: u64,
        language: Language,
        inputs: Vec<String>,
        caller: &CallerIdentity,
    ) -> ServiceResult<ExecutionResult> {
        log::debug!("Live execution of snippet {snippet_id} with {} inputs", inputs.len());
        let result = async {
            let (source, lexer) = self.prepare_execution(snippet_id, language, caller).await?;
            self.invoke(language, Box::new(InputQueue::new(inputs)), move |runner| {
                run_interactive(
                    runner,
                    source.path(),
                    lexer.as_ref().map(WorkingFile::path),
                    &EnvVars::new(),
                )
            })
            .await
        }
        .await;
        log_outcome("Live execution", snippet_id, &result);
        result
    }

    /// Formats a stored snippet with the caller's format rules.
    pub async fn format(
        &self,
        snippet_id: u64,
        language: Language,
        caller: &CallerIdentity,
    ) -> ServiceResult<String> {
        log::debug!("Formatting snippet {snippet_id}");
        let result = async {
            self.registry.profile(language)?;
            let text = self.assets.get_snippet(snippet_id).await?;
            let rules = self.rules.rules(RuleKind::Format, caller).await?;
            self.format_text(language, &text, &rules).await
        }
        .await;
        log_outcome("Formatting", snippet_id, &result);
        result
    }

    /// Formats a stored snippet with explicitly supplied rules.
    pub async fn format_with_rules(
        &self,
        snippet_id: u64,
        language: Language,
        rules: &RuleSet,
    ) -> ServiceResult<String> {
        log::debug!("Formatting snippet {snippet_id} with {} supplied rules", rules.len());
        let result = async {
            self.registry.profile(language)?;
            let text = self.assets.get_snippet(snippet_id).await?;
            self.format_text(language, &text, rules).await
        }
        .await;
        log_outcome("Formatting", snippet_id, &result);
        result
    }

    /// Formats source text that is not stored anywhere.
    pub async fn format_source(
        &self,
        source: &str,
        language: Language,
        caller: &CallerIdentity,
    ) -> ServiceResult<String> {
        log::debug!("Formatting {} bytes of posted source", source.len());
        let result = async {
            self.registry.profile(language)?;
            let rules = self.rules.rules(RuleKind::Format, caller).await?;
            self.format_text(language, source, &rules).await
        }
        .await;
        log_outcome("Formatting", "of posted source", &result);
        result
    }

    pub async fn save(&self, snippet_id: u64, content: &str) -> ServiceResult<()> {
        self.assets.save_snippet(snippet_id, content).await?;
        Ok(())
    }

    /// Analyzes a stored snippet with the caller's SCA rules.
    pub async fn analyze(
        &self,
        snippet_id: u64,
        language: Language,
        caller: &CallerIdentity,
    ) -> ServiceResult<String> {
        log::debug!("Analyzing snippet {snippet_id}");
        let result = async {
            self.registry.profile(language)?;
            let text = self.assets.get_snippet(snippet_id).await?;
            let rules = self.rules.rules(RuleKind::Sca, caller).await?;
            self.analyze_text(language, &text, &rules).await
        }
        .await;
        log_outcome("Analysis", snippet_id, &result);
        result
    }

    /// Analyzes a stored snippet with explicitly supplied rules.
    pub async fn analyze_with_rules(
        &self,
        snippet_id: u64,
        language: Language,
        rules: &RuleSet,
    ) -> ServiceResult<String> {
        log::debug!("Analyzing snippet {snippet_id} with {} supplied rules", rules.len());
        let result = async {
            self.registry.profile(language)?;
            let text = self.assets.get_snippet(snippet_id).await?;
            self.analyze_text(language, &text, rules).await
        }
        .await;
        log_outcome("Analysis", snippet_id, &result);
        result
    }

    /// Asks the engine whether it accepts `rules` as rules of `kind`.
    pub async fn verify_rules(
        &self,
        kind: RuleKind,
        rules: &RuleSet,
        language: Language,
    ) -> ServiceResult<bool> {
        log::debug!("Verifying {} {kind} rules", rules.len());
        let result = async {
            self.registry.profile(language)?;
            match kind {
                RuleKind::Sca => check_sca_values(rules)?,
                RuleKind::Lexer => check_lexer_patterns(rules)?,
                RuleKind::Format => {}
            }
            let file = self.work_dir.rules(kind, rules)?;
            self.invoke(language, Box::new(NoInput), move |runner| {
                runner.verify_rules(kind, file.path()).map(|()| true)
            })
            .await
        }
        .await;
        log_outcome("Verification", format!("of {kind} rules"), &result);
        result
    }

    async fn prepare_execution(
        &self,
        snippet_id: u64,
        language: Language,
        caller: &CallerIdentity,
    ) -> ServiceResult<(WorkingFile, Option<WorkingFile>)> {
        self.registry.profile(language)?;
        let text = self.assets.get_snippet(snippet_id).await?;
        let lint = self.rules.rules(RuleKind::Lexer, caller).await?;

        let source = self.work_dir.source(&text)?;
        let lexer = if lint.is_empty() {
            None
        } else {
            check_lexer_patterns(&lint)?;
            Some(self.work_dir.rules(RuleKind::Lexer, &lint)?)
        };
        Ok((source, lexer))
    }

    async fn format_text(&self, language: Language, text: &str, rules: &RuleSet) -> ServiceResult<String> {
        let profile = self.registry.profile(language)?;
        let source = self.work_dir.source(text)?;
        let rules = self
            .work_dir
            .rules_or_default(RuleKind::Format, rules, &profile.format_rules)?;

        self.invoke(language, Box::new(NoInput), move |runner| {
            runner.format(source.path(), rules.path())
        })
        .await
    }

    async fn analyze_text(&self, language: Language, text: &str, rules: &RuleSet) -> ServiceResult<String> {
        let profile = self.registry.profile(language)?;
        let source = self.work_dir.source(text)?;
        let rules = self
            .work_dir
            .rules_or_default(RuleKind::Sca, rules, &profile.sca_rules)?;

        self.invoke(language, Box::new(NoInput), move |runner| {
            runner.analyze(source.path(), rules.path())
        })
        .await
    }

    /// Hands a runner call to the blocking pool.
    ///
    /// Working files captured by `call` are dropped when the task ends, panics included.
    async fn invoke<T, F>(
        &self,
        language: Language,
        input: Box<dyn InputSupplier>,
        call: F,
    ) -> ServiceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LanguageRunner) -> Result<T, AnalysisError> + Send + 'static,
    {
        let mut runner = self.registry.runner(language, input)?;
        let handle = tokio::task::spawn_blocking(move || call(runner.as_mut()));

        match handle.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(ServiceError::Internal(format!("runner task failed: {e}"))),
        }
    }
}

fn log_outcome<T>(operation: &str, subject: impl Display, result: &ServiceResult<T>) {
    match result {
        Ok(_) => log::info!("{operation} {subject} finished"),
        Err(ServiceError::Analysis(e)) => log::warn!("{operation} {subject} rejected: {e}"),
        Err(e) => log::error!("{operation} {subject} failed: {e}"),
    }
}
