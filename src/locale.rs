//! Locales and the localized message catalog.
//!
//! Message tables are plain JSON objects (`key -> template`) embedded at
//! build time. Lookups fall back from the requested locale to the default
//! locale, then to a generic placeholder, so a missing key never aborts a
//! conversation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Returned when a key is missing from every table.
pub const PLACEHOLDER_MESSAGE: &str = "Message not available.";

/// Supported conversation languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    En,
    Ms,
    Zh,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::En, Locale::Ms, Locale::Zh];

    /// Map a language-menu digit to a locale.
    pub fn from_menu_choice(choice: &str) -> Option<Locale> {
        match choice.trim() {
            "1" => Some(Locale::En),
            "2" => Some(Locale::Ms),
            "3" => Some(Locale::Zh),
            _ => None,
        }
    }

    /// Short code used for storage and table lookup.
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ms => "ms",
            Self::Zh => "zh",
        }
    }

    /// Parse a stored locale code.
    pub fn from_code(code: &str) -> Option<Locale> {
        match code {
            "en" => Some(Self::En),
            "ms" => Some(Self::Ms),
            "zh" => Some(Self::Zh),
            _ => None,
        }
    }

    /// Language name for AI instructions.
    pub fn language_name(&self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Ms => "Bahasa Melayu",
            Self::Zh => "Simplified Chinese",
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Localized message lookup: `(key, locale) -> string`.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    tables: HashMap<Locale, HashMap<String, String>>,
}

impl MessageCatalog {
    /// Catalog built from the tables embedded in the binary.
    pub fn builtin() -> Result<Self, ConfigError> {
        let mut catalog = Self::default();
        catalog.load_json(Locale::En, include_str!("../locales/en.json"))?;
        catalog.load_json(Locale::Ms, include_str!("../locales/ms.json"))?;
        catalog.load_json(Locale::Zh, include_str!("../locales/zh.json"))?;
        Ok(catalog)
    }

    /// Add (or replace) the table for a locale from a JSON object.
    pub fn load_json(&mut self, locale: Locale, json: &str) -> Result<(), ConfigError> {
        let table: HashMap<String, String> = serde_json::from_str(json).map_err(|e| {
            ConfigError::ParseError(format!("message table for {locale}: {e}"))
        })?;
        self.tables.insert(locale, table);
        Ok(())
    }

    /// Insert a single message. Mostly for tests.
    pub fn insert(&mut self, locale: Locale, key: &str, text: &str) {
        self.tables
            .entry(locale)
            .or_default()
            .insert(key.to_string(), text.to_string());
    }

    fn lookup(&self, key: &str, locale: Locale) -> Option<&str> {
        self.tables
            .get(&locale)
            .and_then(|t| t.get(key))
            .map(String::as_str)
    }

    /// Whether the key exists for the locale or the default locale.
    pub fn contains(&self, key: &str, locale: Locale) -> bool {
        self.lookup(key, locale).is_some() || self.lookup(key, Locale::default()).is_some()
    }

    /// Fetch a message, falling back to the default locale, then to a placeholder.
    pub fn get(&self, key: &str, locale: Locale) -> String {
        if let Some(text) = self.lookup(key, locale) {
            return text.to_string();
        }
        if let Some(text) = self.lookup(key, Locale::default()) {
            warn!(key, locale = %locale, "Missing message key, using default locale");
            return text.to_string();
        }
        warn!(key, locale = %locale, "Missing message key in every locale");
        PLACEHOLDER_MESSAGE.to_string()
    }

    /// Fetch `key`, or `fallback_key` when `key` is absent.
    ///
    /// The user's language wins over the more specific key: a fallback in
    /// the locale is preferred to `key` in the default locale.
    pub fn get_or(&self, key: &str, fallback_key: &str, locale: Locale) -> String {
        if let Some(text) = self
            .lookup(key, locale)
            .or_else(|| self.lookup(fallback_key, locale))
        {
            return text.to_string();
        }
        if self.contains(key, locale) {
            self.get(key, locale)
        } else {
            self.get(fallback_key, locale)
        }
    }

    /// Fetch a message and substitute `{name}` placeholders.
    pub fn render(&self, key: &str, locale: Locale, vars: &[(&str, String)]) -> String {
        fill_placeholders(&self.get(key, locale), vars)
    }

    /// All keys starting with `prefix` that exist for the locale (or default).
    pub fn keys_with_prefix(&self, prefix: &str, locale: Locale) -> Vec<String> {
        let table = self
            .tables
            .get(&locale)
            .filter(|t| t.keys().any(|k| k.starts_with(prefix)))
            .or_else(|| self.tables.get(&Locale::default()));
        let mut keys: Vec<String> = table
            .map(|t| t.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

/// Replace every `{name}` in `template` with its value.
pub fn fill_placeholders(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}
