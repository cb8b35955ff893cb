//! Keyword answers: a topic word anywhere in the question picks a canned reply.
//!
//! Checked after the FAQ presets, which only match whole questions, and
//! before the AI.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::inquiry::presets::normalize;
use crate::locale::Locale;

#[derive(Debug, Deserialize)]
struct RawRule {
    keyword: String,
    answer: String,
}

/// Ordered keyword rules per locale. The first rule that matches wins.
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    rules: HashMap<Locale, Vec<(String, String)>>,
}

impl KeywordTable {
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json(include_str!("../../presets/keywords.json"))
    }

    /// Parse `{"en": [{"keyword": "...", "answer": "..."}], ...}`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, Vec<RawRule>> = serde_json::from_str(json)
            .map_err(|e| ConfigError::ParseError(format!("keywords: {e}")))?;

        let mut table = Self::default();
        for (code, rules) in raw {
            let Some(locale) = Locale::from_code(&code) else {
                tracing::warn!(locale = %code, "Ignoring keywords for unknown locale");
                continue;
            };
            for rule in rules {
                table.insert(locale, &rule.keyword, &rule.answer);
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, locale: Locale, keyword: &str, answer: &str) {
        let keyword = normalize(keyword);
        if keyword.is_empty() {
            return;
        }
        self.rules
            .entry(locale)
            .or_default()
            .push((keyword, answer.to_string()));
    }

    /// First rule whose keyword appears in the normalized question.
    pub fn find(&self, question: &str, locale: Locale) -> Option<(&str, &str)> {
        let normalized = normalize(question);
        self.rules
            .get(&locale)?
            .iter()
            .find(|(keyword, _)| normalized.contains(keyword.as_str()))
            .map(|(keyword, answer)| (keyword.as_str(), answer.as_str()))
    }
}
