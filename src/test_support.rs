//! In-memory stand-ins for the analysis engine and the external services.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::engine::{AnalysisEngine, EngineConfig, EnvVars, InputSupplier, RunOutcome, join_lines};
use crate::error::{AnalysisError, UpstreamError};
use crate::identity::CallerIdentity;
use crate::language::{LanguageProfile, RunnerRegistry};
use crate::model::{Language, StatusEvent};
use crate::rules::{RuleKind, RuleSet, check_document_shape};
use crate::status::StatusReporter;
use crate::upstream::{AssetStore, RuleStore};

pub fn printscript_profile() -> LanguageProfile {
    let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/printscript");
    LanguageProfile {
        lexer_rules: data.join("lexer_rules.json"),
        format_rules: data.join("formatter_default.json"),
        sca_rules: data.join("sca_default.json"),
    }
}

/// A registry whose only language is Printscript, backed by `book`.
pub fn scripted_registry(book: ScriptBook) -> RunnerRegistry {
    let mut registry = RunnerRegistry::new();
    registry.register(Language::Printscript, printscript_profile(), move || {
        Box::new(ScriptedEngine::new(book.clone()))
    });
    registry
}

/// An unsigned-looking HS256 token carrying `email`.
pub fn token_for(email: &str) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let claims = serde_json::json!({ "sub": "auth0|test", "email": email });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-secret"))
        .unwrap_or_default()
}

pub fn caller(email: &str) -> CallerIdentity {
    CallerIdentity::from_token(token_for(email))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Print(String),
    Read { prompt: String },
    /// Prints the last value read.
    PrintInput,
    /// Prints every value read so far, concatenated.
    PrintInputs,
    PrintEnv(String),
    Fail(String),
}

impl Step {
    pub fn print(text: &str) -> Self {
        Self::Print(text.to_string())
    }

    pub fn read(prompt: &str) -> Self {
        Self::Read {
            prompt: prompt.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Script {
    steps: Vec<Step>,
    formatted: Option<String>,
    violations: Vec<(String, String)>,
    failure: Option<String>,
}

/// One engine invocation as observed by [`ScriptedEngine`].
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub operation: &'static str,
    pub source: String,
    pub lexer: Option<Value>,
    pub rules: Option<Value>,
}

/// Behavior of the fake engine, keyed by the exact snippet text.
///
/// Clones share the call log.
#[derive(Debug, Clone, Default)]
pub struct ScriptBook {
    scripts: HashMap<String, Script>,
    calls: Arc<Mutex<Vec<EngineCall>>>,
}

impl ScriptBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&mut self, source: &str) -> &mut Script {
        self.scripts.entry(source.to_string()).or_default()
    }

    pub fn with_output<I, S>(mut self, source: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.script(source)
            .steps
            .extend(lines.into_iter().map(|l| Step::print(l.as_ref())));
        self
    }

    pub fn with_steps(mut self, source: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script(source).steps.extend(steps);
        self
    }

    pub fn with_formatted(mut self, source: &str, formatted: &str) -> Self {
        self.script(source).formatted = Some(formatted.to_string());
        self
    }

    /// `message` is reported when the SCA rule `rule` is switched on.
    pub fn with_violation(mut self, source: &str, rule: &str, message: &str) -> Self {
        self.script(source)
            .violations
            .push((rule.to_string(), message.to_string()));
        self
    }

    /// Every operation on `source` fails with `message`.
    pub fn with_failure(mut self, source: &str, message: &str) -> Self {
        self.script(source).failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }
}

/// Canonical layout used by the fake formatter: one statement per line.
pub fn normalize(source: &str) -> String {
    source
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{s};\n"))
        .collect()
}

pub struct ScriptedEngine {
    book: ScriptBook,
    config: EngineConfig,
    output: Vec<String>,
}

impl ScriptedEngine {
    pub fn new(book: ScriptBook) -> Self {
        Self {
            book,
            config: EngineConfig::default(),
            output: Vec::new(),
        }
    }

    fn begin(
        &mut self,
        operation: &'static str,
        source: &Path,
        rules: Option<RuleKind>,
    ) -> Result<(String, Option<Value>), AnalysisError> {
        let lexer = self.config.take(RuleKind::Lexer);
        let rules = rules.map(|kind| self.config.take(kind));
        self.config.clear();

        let lexer = read_document(&lexer?)?;
        let rules = rules.transpose()?.map(|p| read_document(&p)).transpose()?;
        let text = std::fs::read_to_string(source)
            .map_err(|e| AnalysisError::Engine(format!("unable to read {}: {e}", source.display())))?;

        self.book.calls.lock().push(EngineCall {
            operation,
            source: text.clone(),
            lexer: Some(lexer),
            rules: rules.clone(),
        });

        if let Some(message) = self.book.scripts.get(&text).and_then(|s| s.failure.clone()) {
            return Err(AnalysisError::Diagnostic(message));
        }
        Ok((text, rules))
    }
}

fn read_document(path: &Path) -> Result<Value, AnalysisError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AnalysisError::Engine(format!("unable to read {}: {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| AnalysisError::Engine(e.to_string()))
}

impl AnalysisEngine for ScriptedEngine {
    fn configure(&mut self, kind: RuleKind, rules: &Path) -> Result<(), AnalysisError> {
        let text = std::fs::read_to_string(rules).map_err(|e| AnalysisError::InvalidRules {
            kind,
            reason: e.to_string(),
        })?;
        let document: Value = serde_json::from_str(&text).map_err(|e| AnalysisError::InvalidRules {
            kind,
            reason: e.to_string(),
        })?;
        check_document_shape(kind, &document)?;
        self.config.set(kind, rules);
        Ok(())
    }

    fn run(
        &mut self,
        source: &Path,
        env: &EnvVars,
        input: &mut dyn InputSupplier,
    ) -> Result<RunOutcome, AnalysisError> {
        self.output.clear();
        let (text, _) = self.begin("run", source, None)?;
        let Some(script) = self.book.scripts.get(&text) else {
            return Err(AnalysisError::Diagnostic(format!("Unexpected token in {text:?}")));
        };

        let mut read: Vec<String> = Vec::new();
        for step in &script.steps {
            match step {
                Step::Print(line) => self.output.push(line.clone()),
                Step::Read { prompt } => match input.next_input(prompt) {
                    Some(value) => {
                        self.output.push(prompt.clone());
                        read.push(value);
                    }
                    None => return Ok(RunOutcome::NeedsInput { prompt: prompt.clone() }),
                },
                Step::PrintInput => self.output.push(read.last().cloned().unwrap_or_default()),
                Step::PrintInputs => self.output.push(read.concat()),
                Step::PrintEnv(name) => self.output.push(env.get(name).cloned().unwrap_or_default()),
                Step::Fail(message) => {
                    self.output.clear();
                    return Err(AnalysisError::Diagnostic(message.clone()));
                }
            }
        }

        Ok(RunOutcome::Completed(join_lines(&std::mem::take(&mut self.output))))
    }

    fn format(&mut self, source: &Path) -> Result<String, AnalysisError> {
        let (text, _) = self.begin("format", source, Some(RuleKind::Format))?;
        let scripted = self.book.scripts.get(&text).and_then(|s| s.formatted.clone());
        Ok(scripted.unwrap_or_else(|| normalize(&text)))
    }

    fn analyze(&mut self, source: &Path) -> Result<String, AnalysisError> {
        let (text, rules) = self.begin("analyze", source, Some(RuleKind::Sca))?;
        let enabled = |rule: &str| {
            rules
                .as_ref()
                .and_then(|doc| doc.get(rule))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };

        let violations: Vec<&str> = self
            .book
            .scripts
            .get(&text)
            .map(|s| {
                s.violations
                    .iter()
                    .filter(|(rule, _)| enabled(rule))
                    .map(|(_, message)| message.as_str())
                    .collect()
            })
            .unwrap_or_default();
        Ok(violations.join("\n"))
    }

    fn verify(&mut self, kind: RuleKind) -> Result<(), AnalysisError> {
        let rules = self.config.take(kind);
        self.config.clear();
        let rules = read_document(&rules?)?;

        self.book.calls.lock().push(EngineCall {
            operation: "verify",
            source: String::new(),
            lexer: None,
            rules: Some(rules),
        });
        Ok(())
    }

    fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}

/// Asset Store backed by a map. Saves are recorded in order.
#[derive(Default)]
pub struct MemoryAssetStore {
    snippets: Mutex<HashMap<u64, String>>,
    saves: Mutex<Vec<(u64, String)>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snippet(self, id: u64, text: &str) -> Self {
        self.snippets.lock().insert(id, text.to_string());
        self
    }

    pub fn saves(&self) -> Vec<(u64, String)> {
        self.saves.lock().clone()
    }

    pub fn snippet(&self, id: u64) -> Option<String> {
        self.snippets.lock().get(&id).cloned()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn get_snippet(&self, id: u64) -> Result<String, UpstreamError> {
        self.snippet(id)
            .ok_or_else(|| UpstreamError::NotFound(format!("snippet {id}")))
    }

    async fn save_snippet(&self, id: u64, content: &str) -> Result<(), UpstreamError> {
        self.snippets.lock().insert(id, content.to_string());
        self.saves.lock().push((id, content.to_string()));
        Ok(())
    }
}

/// Rule Store returning the same rules for every caller.
#[derive(Default)]
pub struct StaticRuleStore {
    rules: HashMap<RuleKind, RuleSet>,
    requests: Mutex<Vec<(RuleKind, String)>>,
}

impl StaticRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(mut self, kind: RuleKind, rules: RuleSet) -> Self {
        self.rules.insert(kind, rules);
        self
    }

    /// Every `(kind, token)` pair requested so far.
    pub fn requests(&self) -> Vec<(RuleKind, String)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RuleStore for StaticRuleStore {
    async fn rules(&self, kind: RuleKind, caller: &CallerIdentity) -> Result<RuleSet, UpstreamError> {
        self.requests.lock().push((kind, caller.token().to_string()));
        Ok(self.rules.get(&kind).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn report(&self, event: StatusEvent) {
        self.events.lock().push(event);
    }
}
