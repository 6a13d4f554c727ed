use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use wait_timeout::ChildExt;

use crate::error::AnalysisError;
use crate::rules::{RuleKind, check_document_shape};

use super::{AnalysisEngine, EngineConfig, EnvVars, InputSupplier, RunOutcome, join_lines};

/// Marker line by which the engine asks for one line of input on stdin.
const INPUT_REQUEST: &str = "@input";

/// Command templates for one engine executable.
///
/// Placeholders: `%SOURCE%`, `%LEXER%`, `%RULES%` and `%KIND%`.
#[derive(Deserialize, Debug, Clone)]
pub struct EngineCommand {
    pub execute: Vec<String>,
    pub format: Vec<String>,
    pub analyze: Vec<String>,
    pub verify: Option<Vec<String>>,
}

/// Drives an external engine executable, one process per invocation.
///
/// Program output comes from stdout line by line. A stdout line
/// `@input <prompt>` is an input request answered with one stdin line.
/// Anything on stderr is a diagnostic, reported when the process exits
/// unsuccessfully.
pub struct ProcessEngine {
    command: EngineCommand,
    timeout: Duration,
    config: EngineConfig,
    output: Vec<String>,
}

impl ProcessEngine {
    pub fn new(command: EngineCommand, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
            config: EngineConfig::default(),
            output: Vec::new(),
        }
    }

    /// Generates a command by applying template substitutions
    fn generate_command(
        template: &[String],
        mapping: &HashMap<&str, String>,
    ) -> Result<Command, AnalysisError> {
        let args: Vec<String> = template
            .iter()
            .map(|s| {
                let mut t = s.clone();
                for (k, v) in mapping.iter() {
                    t = t.replace(k, v);
                }
                t
            })
            .collect();

        let Some((program, rest)) = args.split_first() else {
            return Err(AnalysisError::Engine("empty engine command".to_string()));
        };

        let mut cmd = Command::new(program);
        cmd.args(rest);
        Ok(cmd)
    }

    /// Runs a non-interactive command and returns its stdout.
    fn capture(&self, mut cmd: Command) -> Result<String, AnalysisError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(spawn_error)?;
        let stdout = child.stdout.take().ok_or_else(|| not_piped("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| not_piped("stderr"))?;

        let deadline = Instant::now() + self.timeout;
        let stdout = spawn_reader(stdout);
        let stderr = spawn_reader(stderr);

        let status = match child.wait_timeout(self.timeout).map_err(wait_error)? {
            Some(status) => status,
            None => {
                log::warn!("Engine exceeded {}ms, killing", self.timeout.as_millis());
                kill(&mut child);
                return Err(AnalysisError::TimedOut(self.timeout));
            }
        };

        // Descendants of the engine may still hold the pipes open.
        let stdout = self.collect(&stdout, deadline)?;
        let stderr = self.collect(&stderr, deadline)?;

        if !status.success() {
            return Err(diagnostic(&stderr, status));
        }
        Ok(stdout)
    }

    /// Waits for a reader until `deadline`.
    fn collect(&self, reader: &Receiver<io::Result<String>>, deadline: Instant) -> Result<String, AnalysisError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match reader.recv_timeout(remaining) {
            Ok(result) => {
                result.map_err(|e| AnalysisError::Engine(format!("failed to read engine output: {e}")))
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Engine output still open after {}ms, giving up",
                    self.timeout.as_millis()
                );
                Err(AnalysisError::TimedOut(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(AnalysisError::Engine("output reader thread panicked".to_string()))
            }
        }
    }

    /// Consumes the configuration for one invocation, even when it is incomplete.
    fn mapping(
        &mut self,
        source: &Path,
        rules: Option<RuleKind>,
    ) -> Result<HashMap<&'static str, String>, AnalysisError> {
        let lexer = self.config.take(RuleKind::Lexer);
        let rules = rules.map(|kind| (kind, self.config.take(kind)));
        self.config.clear();

        let mut mapping = HashMap::from([
            ("%SOURCE%", path_str(source)),
            ("%LEXER%", path_str(&lexer?)),
        ]);
        if let Some((kind, path)) = rules {
            mapping.insert("%RULES%", path_str(&path?));
            mapping.insert("%KIND%", kind.as_str().to_string());
        }
        Ok(mapping)
    }
}

impl AnalysisEngine for ProcessEngine {
    fn configure(&mut self, kind: RuleKind, rules: &Path) -> Result<(), AnalysisError> {
        let invalid = |reason: String| AnalysisError::InvalidRules { kind, reason };

        let text = std::fs::read_to_string(rules)
            .map_err(|e| invalid(format!("unable to read {}: {e}", rules.display())))?;
        let document: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;
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
        let mapping = self.mapping(source, None)?;
        let mut cmd = Self::generate_command(&self.command.execute, &mapping)?;
        cmd.envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(spawn_error)?;
        let mut stdin = child.stdin.take().ok_or_else(|| not_piped("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| not_piped("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| not_piped("stderr"))?;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        let stderr = spawn_reader(stderr);

        let deadline = Instant::now() + self.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = match rx.recv_timeout(remaining) {
                Ok(Ok(line)) => line,
                Ok(Err(e)) => {
                    kill(&mut child);
                    return Err(AnalysisError::Engine(format!("failed to read engine output: {e}")));
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("Execution exceeded {}ms, killing engine", self.timeout.as_millis());
                    kill(&mut child);
                    return Err(AnalysisError::TimedOut(self.timeout));
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let Some(prompt) = input_request(&line) else {
                self.output.push(line);
                continue;
            };

            match input.next_input(prompt) {
                Some(value) => {
                    self.output.push(prompt.to_string());
                    if let Err(e) = writeln!(stdin, "{value}").and_then(|_| stdin.flush()) {
                        kill(&mut child);
                        return Err(AnalysisError::Engine(format!("failed to send input: {e}")));
                    }
                }
                None => {
                    log::debug!("Execution suspended on prompt {prompt:?}");
                    let prompt = prompt.to_string();
                    // The process must not observe end of input.
                    kill(&mut child);
                    drop(stdin);
                    return Ok(RunOutcome::NeedsInput { prompt });
                }
            }
        }

        drop(stdin);
        let remaining = deadline.saturating_duration_since(Instant::now());
        let status = match child.wait_timeout(remaining).map_err(wait_error)? {
            Some(status) => status,
            None => {
                kill(&mut child);
                return Err(AnalysisError::TimedOut(self.timeout));
            }
        };
        let stderr = self.collect(&stderr, deadline)?;

        let output = std::mem::take(&mut self.output);
        if !status.success() {
            return Err(diagnostic(&stderr, status));
        }
        Ok(RunOutcome::Completed(join_lines(&output)))
    }

    fn format(&mut self, source: &Path) -> Result<String, AnalysisError> {
        let mapping = self.mapping(source, Some(RuleKind::Format))?;
        let cmd = Self::generate_command(&self.command.format, &mapping)?;
        self.capture(cmd)
    }

    fn analyze(&mut self, source: &Path) -> Result<String, AnalysisError> {
        let mapping = self.mapping(source, Some(RuleKind::Sca))?;
        let cmd = Self::generate_command(&self.command.analyze, &mapping)?;
        Ok(self.capture(cmd)?.trim().to_string())
    }

    fn verify(&mut self, kind: RuleKind) -> Result<(), AnalysisError> {
        let rules = self.config.take(kind)?;
        self.config.clear();

        let Some(template) = &self.command.verify else {
            return Ok(());
        };
        let mapping = HashMap::from([
            ("%RULES%", path_str(&rules)),
            ("%KIND%", kind.as_str().to_string()),
        ]);
        let cmd = Self::generate_command(template, &mapping)?;
        self.capture(cmd).map(|_| ())
    }

    fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}

fn input_request(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(INPUT_REQUEST)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix(' ')
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn read_all(mut stream: impl Read) -> io::Result<String> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn spawn_reader(stream: impl Read + Send + 'static) -> Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone once the invocation gave up on this stream.
        let _ = tx.send(read_all(stream));
    });
    rx
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("Unable to kill engine process {}: {e}", child.id());
    }
    if let Err(e) = child.wait() {
        log::warn!("Unable to reap engine process {}: {e}", child.id());
    }
}

fn diagnostic(stderr: &str, status: ExitStatus) -> AnalysisError {
    let text = stderr.trim();
    if text.is_empty() {
        AnalysisError::Diagnostic(format!("engine exited with {status}"))
    } else {
        AnalysisError::Diagnostic(text.to_string())
    }
}

fn spawn_error(e: io::Error) -> AnalysisError {
    AnalysisError::Engine(format!("failed to start engine: {e}"))
}

fn wait_error(e: io::Error) -> AnalysisError {
    AnalysisError::Engine(format!("failed to wait for engine: {e}"))
}

fn not_piped(stream: &str) -> AnalysisError {
    AnalysisError::Engine(format!("{stream} was not piped"))
}
