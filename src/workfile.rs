use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::error::ResourceError;
use crate::rules::{RuleKind, RuleSet, rule_document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingFileKind {
    Source,
    LexerRules,
    FormatRules,
    ScaRules,
}

impl WorkingFileKind {
    pub fn for_rules(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Lexer => Self::LexerRules,
            RuleKind::Format => Self::FormatRules,
            RuleKind::Sca => Self::ScaRules,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Source => "snippet-",
            Self::LexerRules => "lexer-",
            Self::FormatRules => "format-",
            Self::ScaRules => "sca-",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Source => ".ps",
            _ => ".json",
        }
    }
}

impl fmt::Display for WorkingFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::LexerRules => "lexer rules",
            Self::FormatRules => "format rules",
            Self::ScaRules => "sca rules",
        };
        f.write_str(name)
    }
}

/// A transient file owned by one operation. Removed when dropped.
#[derive(Debug)]
pub struct WorkingFile {
    path: PathBuf,
    kind: WorkingFileKind,
}

impl WorkingFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkingFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed {} working file {}", self.kind, self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Unable to remove {} working file {}: {e}",
                self.kind,
                self.path.display()
            ),
        }
    }
}

/// Either a rule file written for this request, or the language default on disk.
///
/// Default rule files belong to the deployment and are never removed.
#[derive(Debug)]
pub enum RuleFile {
    Working(WorkingFile),
    Default(PathBuf),
}

impl RuleFile {
    pub fn path(&self) -> &Path {
        match self {
            Self::Working(file) => file.path(),
            Self::Default(path) => path,
        }
    }
}

/// Directory where working files are created.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Uses `configured` when given, otherwise the platform cache directory.
    pub fn from_config(configured: Option<&str>) -> anyhow::Result<Self> {
        let root = match configured {
            Some(dir) => PathBuf::from(dir),
            None => {
                use directories::ProjectDirs;

                let proj_dirs = ProjectDirs::from("", "", "snippet-runner")
                    .ok_or_else(|| anyhow!("Unable to find user directory"))?;
                proj_dirs.cache_dir().join("work")
            }
        };

        let work_dir = Self::new(root)?;
        log::info!("Working files go to {}", work_dir.root.display());
        Ok(work_dir)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn create(&self, kind: WorkingFileKind, content: &str) -> Result<WorkingFile, ResourceError> {
        let create_err = |source| ResourceError::Create {
            kind,
            dir: self.root.clone(),
            source,
        };

        let mut file = tempfile::Builder::new()
            .prefix(kind.prefix())
            .suffix(kind.suffix())
            .tempfile_in(&self.root)
            .map_err(create_err)?;
        file.write_all(content.as_bytes()).map_err(create_err)?;
        file.flush().map_err(create_err)?;

        let (_, path) = file.keep().map_err(|e| create_err(e.error))?;
        log::debug!("Created {kind} working file {}", path.display());

        Ok(WorkingFile { path, kind })
    }

    pub fn source(&self, text: &str) -> Result<WorkingFile, ResourceError> {
        self.create(WorkingFileKind::Source, text)
    }

    pub fn rules(&self, kind: RuleKind, rules: &RuleSet) -> Result<WorkingFile, ResourceError> {
        let document = serde_json::to_string_pretty(&rule_document(kind, rules))
            .map_err(|source| ResourceError::Serialize { kind, source })?;
        self.create(WorkingFileKind::for_rules(kind), &document)
    }

    /// Writes `rules` unless the set is empty, in which case `default` is used as-is.
    pub fn rules_or_default(
        &self,
        kind: RuleKind,
        rules: &RuleSet,
        default: &Path,
    ) -> Result<RuleFile, ResourceError> {
        if rules.is_empty() {
            log::debug!("No {kind} rules supplied, using {}", default.display());
            return Ok(RuleFile::Default(default.to_path_buf()));
        }
        self.rules(kind, rules).map(RuleFile::Working)
    }
}
