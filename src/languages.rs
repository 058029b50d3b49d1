//! Language configuration: boilerplate templates and export extensions

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Languages the execution backend accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Cpp,
    Java,
    Python,
    Javascript,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Cpp,
        Language::Java,
        Language::Python,
        Language::Javascript,
    ];

    /// Wire name sent to the backend and stored in the session file
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
            Language::Javascript => "javascript",
        }
    }

    /// Next language in selection order, wrapping around
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|l| *l == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Starter template shown when no code has been written for this language
    pub fn boilerplate(&self) -> &'static str {
        boilerplate_in(LANGUAGES.get(), *self)
    }

    /// File extension used when exporting `Solution.<ext>`
    pub fn extension(&self) -> &'static str {
        get_language_config(*self)
            .map(|c| c.extension.as_str())
            .unwrap_or(match self {
                Language::Cpp => "cpp",
                Language::Java => "java",
                Language::Python => "py",
                Language::Javascript => "js",
            })
    }

    pub fn label(&self) -> &'static str {
        get_language_config(*self)
            .map(|c| c.label.as_str())
            .unwrap_or(self.as_str())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        if let Some(lang) = Language::ALL.iter().find(|l| l.as_str() == name) {
            return Ok(*lang);
        }
        if let Some(langs) = LANGUAGES.get() {
            if let Some((lang, _)) = langs
                .iter()
                .find(|(_, cfg)| cfg.aliases.iter().any(|a| *a == name))
            {
                return Ok(*lang);
            }
        }
        anyhow::bail!("Unsupported language: {}", s)
    }
}

/// Configuration for a supported language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Human readable name (e.g., "C++")
    pub label: String,
    /// Extension of the exported solution file, without the dot
    pub extension: String,
    /// Template seeded into an empty session
    pub boilerplate: String,
    /// Lowercased alternative names accepted on the command line
    pub aliases: Vec<String>,
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    label: String,
    extension: String,
    boilerplate: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Global language configurations
static LANGUAGES: OnceLock<HashMap<Language, LanguageConfig>> = OnceLock::new();

const LANGUAGES_TOML: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));

/// Initialize language configurations from the embedded TOML file.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_languages() -> anyhow::Result<()> {
    if LANGUAGES.get().is_some() {
        return Ok(());
    }

    let languages = parse_languages(LANGUAGES_TOML)?;
    // A concurrent initializer may have won the race with identical data
    let _ = LANGUAGES.set(languages);

    Ok(())
}

fn boilerplate_in(
    configs: Option<&HashMap<Language, LanguageConfig>>,
    language: Language,
) -> &str {
    match configs.and_then(|c| c.get(&language)) {
        Some(config) => &config.boilerplate,
        None => {
            warn!(
                "Language table not initialized, no boilerplate for {}",
                language
            );
            ""
        }
    }
}

fn parse_languages(content: &str) -> anyhow::Result<HashMap<Language, LanguageConfig>> {
    let raw_configs: HashMap<String, RawLanguageConfig> =
        toml::from_str(content).context("Invalid language configuration")?;

    let mut languages = HashMap::new();

    for (name, raw) in raw_configs {
        let language = Language::ALL
            .into_iter()
            .find(|l| l.as_str() == name.to_lowercase())
            .ok_or_else(|| anyhow::anyhow!("Unknown language section: {}", name))?;

        if raw.extension.is_empty() || raw.extension.starts_with('.') {
            anyhow::bail!("Invalid extension for {}: {:?}", name, raw.extension);
        }

        languages.insert(
            language,
            LanguageConfig {
                label: raw.label,
                extension: raw.extension,
                boilerplate: raw.boilerplate,
                aliases: raw.aliases.iter().map(|a| a.to_lowercase()).collect(),
            },
        );
    }

    for language in Language::ALL {
        if !languages.contains_key(&language) {
            anyhow::bail!("Missing configuration for language: {}", language);
        }
    }

    Ok(languages)
}

/// Get language configuration, if languages were initialized
pub fn get_language_config(language: Language) -> Option<&'static LanguageConfig> {
    LANGUAGES.get()?.get(&language)
}
