// Harness template registry
// Loads languages.json and the harness template each language points at

use crate::error::JudgeError;
use crate::injector::{self, InjectionError};
use anyhow::{bail, Context, Result};
use arbiter_common::types::LanguageId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageExecution {
    /// File the executable unit is written to inside the sandbox.
    pub file_name: String,
    /// Shell command producing a runnable artifact, for compiled languages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<String>,
    /// Shell command running the program; stdin is the test input.
    pub run: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub version: String,
    pub image: String,
    pub execution: LanguageExecution,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
    /// Language id understood by a Judge0-compatible remote sandbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_language_id: Option<u32>,
    /// Template path, relative to languages.json.
    pub template: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Harness template text, validated to hold exactly one placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessTemplate {
    text: String,
}

impl HarnessTemplate {
    pub fn new(text: impl Into<String>) -> Result<Self, InjectionError> {
        let text = text.into();
        injector::validate(&text)?;
        Ok(Self { text })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Build the executable unit for `user_code`.
    pub fn inject(&self, user_code: &str) -> Result<String, InjectionError> {
        injector::inject(&self.text, user_code)
    }
}

/// Everything the pipeline needs to know about one language.
#[derive(Debug, Clone)]
pub struct Harness {
    pub language: LanguageId,
    pub config: LanguageConfig,
    pub template: HarnessTemplate,
}

impl Harness {
    pub fn new(config: LanguageConfig, template: HarnessTemplate) -> Self {
        Self {
            language: LanguageId::new(&config.name),
            config,
            template,
        }
    }
}

/// Read-only map from language to harness, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct HarnessRegistry {
    harnesses: HashMap<LanguageId, Arc<Harness>>,
}

impl HarnessRegistry {
    /// Load languages.json and every template it references.
    ///
    /// Any malformed template fails the whole load: a template without exactly
    /// one placeholder is a configuration bug and must never reach a request.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let languages_json: LanguagesJson = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let mut harnesses = Vec::with_capacity(languages_json.languages.len());

        for lang in languages_json.languages {
            let template_path = base_dir.join(&lang.template);
            let text = fs::read_to_string(&template_path).with_context(|| {
                format!(
                    "Failed to read harness template for '{}': {}",
                    lang.name,
                    template_path.display()
                )
            })?;
            let template = HarnessTemplate::new(text).with_context(|| {
                format!("Malformed harness template for '{}'", lang.name)
            })?;
            debug!(language = %lang.name, template = %template_path.display(), "Loaded harness template");
            harnesses.push(Harness::new(lang, template));
        }

        let registry = Self::from_harnesses(harnesses)?;
        info!(languages = ?registry.languages(), "Harness registry ready");
        Ok(registry)
    }

    /// Build a registry from already validated harnesses.
    pub fn from_harnesses(harnesses: impl IntoIterator<Item = Harness>) -> Result<Self> {
        let mut map = HashMap::new();
        for harness in harnesses {
            let language = harness.language.clone();
            if map.insert(language.clone(), Arc::new(harness)).is_some() {
                bail!("Language '{}' is configured more than once", language);
            }
        }

        if map.is_empty() {
            bail!("No languages configured");
        }

        Ok(Self { harnesses: map })
    }

    /// Find the harness for `language`.
    pub fn lookup(&self, language: &LanguageId) -> Result<Arc<Harness>, JudgeError> {
        self.harnesses
            .get(language)
            .cloned()
            .ok_or_else(|| JudgeError::UnsupportedLanguage(language.clone()))
    }

    pub fn is_supported(&self, language: &LanguageId) -> bool {
        self.harnesses.contains_key(language)
    }

    /// Supported languages, sorted
    pub fn languages(&self) -> Vec<LanguageId> {
        let mut languages: Vec<LanguageId> = self.harnesses.keys().cloned().collect();
        languages.sort();
        languages
    }

    pub fn harnesses(&self) -> impl Iterator<Item = &Arc<Harness>> {
        self.harnesses.values()
    }
}

#[cfg(test)]
pub(crate) fn test_harness(name: &str, template: &str) -> Harness {
    Harness::new(
        LanguageConfig {
            name: name.to_string(),
            version: "test".to_string(),
            image: format!("arbiter-{}:test", name),
            execution: LanguageExecution {
                file_name: "main.txt".to_string(),
                compile: None,
                run: "cat /code/main.txt".to_string(),
            },
            memory_limit_mb: 64,
            cpu_limit: 0.5,
            remote_language_id: None,
            template: format!("harness/{}.txt", name),
        },
        HarnessTemplate::new(template).expect("test template must be valid"),
    )
}
