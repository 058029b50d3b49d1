//! Session model - the user's editable state
//!
//! A `Session` is owned by the `SessionStore`; everything else receives
//! snapshots of it (by value or through a `watch` receiver).

pub mod store;

use crate::languages::Language;

pub use store::SessionStore;

pub const MIN_FONT_SIZE: u8 = 10;
pub const MAX_FONT_SIZE: u8 = 24;
pub const DEFAULT_FONT_SIZE: u8 = 14;

/// The user's current language, code, stdin and editor font size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub language: Language,
    pub code: String,
    pub input: String,
    pub font_size: u8,
}

impl Session {
    /// Fresh session for a language, seeded with its boilerplate
    pub fn seeded(language: Language) -> Self {
        Self {
            language,
            code: language.boilerplate().to_string(),
            input: String::new(),
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::seeded(Language::default())
    }
}

/// Clamp a requested font size into the supported range
pub fn clamp_font_size(size: i64) -> u8 {
    size.clamp(MIN_FONT_SIZE as i64, MAX_FONT_SIZE as i64) as u8
}

/// Partial update merged into the session by `SessionStore::save`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub language: Option<Language>,
    pub code: Option<String>,
    pub input: Option<String>,
    pub font_size: Option<i64>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_font_size(mut self, size: i64) -> Self {
        self.font_size = Some(size);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_font_size() {
        assert_eq!(clamp_font_size(3), MIN_FONT_SIZE);
        assert_eq!(clamp_font_size(10), 10);
        assert_eq!(clamp_font_size(18), 18);
        assert_eq!(clamp_font_size(99), MAX_FONT_SIZE);
        assert_eq!(clamp_font_size(-4), MIN_FONT_SIZE);
    }

    #[test]
    fn test_patch_builder() {
        let patch = SessionPatch::new()
            .with_language(Language::Python)
            .with_code("print(1)");
        assert!(!patch.is_empty());
        assert_eq!(patch.language, Some(Language::Python));
        assert_eq!(patch.input, None);
        assert!(SessionPatch::new().is_empty());
    }
}
