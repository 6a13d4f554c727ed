use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;

use crate::config::LanguageConfig;
use crate::engine::{AnalysisEngine, InputSupplier, ProcessEngine};
use crate::error::ServiceError;
use crate::model::Language;

use super::{EngineRunner, LanguageProfile, LanguageRunner};

pub type EngineFactory = Arc<dyn Fn() -> Box<dyn AnalysisEngine> + Send + Sync>;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone)]
struct RegistryEntry {
    profile: Arc<LanguageProfile>,
    factory: EngineFactory,
}

/// Maps each configured language to its default rules and an engine factory.
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    entries: HashMap<Language, RegistryEntry>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, language: Language, profile: LanguageProfile, factory: F)
    where
        F: Fn() -> Box<dyn AnalysisEngine> + Send + Sync + 'static,
    {
        let entry = RegistryEntry {
            profile: Arc::new(profile),
            factory: Arc::new(factory),
        };
        if self.entries.insert(language, entry).is_some() {
            log::warn!("Runner for {language} registered twice, keeping the last one");
        }
    }

    /// Builds the registry from the `languages` section of the configuration
    pub fn from_config(languages: &[LanguageConfig]) -> anyhow::Result<Self> {
        let mut registry = Self::new();

        for language in languages {
            let profile = LanguageProfile {
                lexer_rules: PathBuf::from(&language.lexer_rules),
                format_rules: PathBuf::from(&language.format_rules),
                sca_rules: PathBuf::from(&language.sca_rules),
            };
            for path in [&profile.lexer_rules, &profile.format_rules, &profile.sca_rules] {
                if !path.is_file() {
                    bail!("Default rule file {} of {} not found", path.display(), language.name);
                }
            }

            let command = language.command.clone();
            let timeout = Duration::from_millis(language.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
            registry.register(language.name, profile, move || {
                Box::new(ProcessEngine::new(command.clone(), timeout))
            });
            log::info!("Registered runner for {}", language.name);
        }

        Ok(registry)
    }

    pub fn runner(
        &self,
        language: Language,
        input: Box<dyn InputSupplier>,
    ) -> Result<Box<dyn LanguageRunner>, ServiceError> {
        let entry = self.entry(language)?;
        Ok(Box::new(EngineRunner::new(
            language,
            entry.profile.clone(),
            (entry.factory)(),
            input,
        )))
    }

    pub fn profile(&self, language: Language) -> Result<Arc<LanguageProfile>, ServiceError> {
        self.entry(language).map(|entry| entry.profile.clone())
    }

    fn entry(&self, language: Language) -> Result<&RegistryEntry, ServiceError> {
        self.entries
            .get(&language)
            .ok_or(ServiceError::UnsupportedLanguage(language))
    }
}
