//! Canned FAQ answers matched before any AI call.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::locale::Locale;

/// Minimum `normalized_levenshtein` score for a fuzzy hit.
pub const FUZZY_THRESHOLD: f64 = 0.7;

/// A preset that matched a question.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetMatch<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    /// 1.0 for an exact match.
    pub score: f64,
}

/// Locale-specific question → answer tables.
#[derive(Debug, Clone, Default)]
pub struct PresetTable {
    tables: HashMap<Locale, Vec<(String, String)>>,
}

impl PresetTable {
    /// Table embedded in the binary.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json(include_str!("../../presets/faq.json"))
    }

    /// Parse `{"en": {"question": "answer", ...}, "ms": {...}}`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, HashMap<String, String>> = serde_json::from_str(json)
            .map_err(|e| ConfigError::ParseError(format!("presets: {e}")))?;

        let mut table = Self::default();
        for (code, entries) in raw {
            let Some(locale) = Locale::from_code(&code) else {
                tracing::warn!(locale = %code, "Ignoring presets for unknown locale");
                continue;
            };
            for (question, answer) in entries {
                table.insert(locale, &question, &answer);
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, locale: Locale, question: &str, answer: &str) {
        self.tables
            .entry(locale)
            .or_default()
            .push((normalize(question), answer.to_string()));
    }

    pub fn len(&self, locale: Locale) -> usize {
        self.tables.get(&locale).map_or(0, Vec::len)
    }

    /// Exact match on the normalized question, then the closest fuzzy match.
    pub fn find(&self, question: &str, locale: Locale) -> Option<PresetMatch<'_>> {
        let entries = self.tables.get(&locale)?;
        let normalized = normalize(question);
        if normalized.is_empty() {
            return None;
        }

        if let Some((q, a)) = entries.iter().find(|(q, _)| *q == normalized) {
            return Some(PresetMatch {
                question: q,
                answer: a,
                score: 1.0,
            });
        }

        entries
            .iter()
            .map(|(q, a)| (q, a, strsim::normalized_levenshtein(&normalized, q)))
            .filter(|(_, _, score)| *score >= FUZZY_THRESHOLD)
            .max_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(q, a, score)| PresetMatch {
                question: q,
                answer: a,
                score,
            })
    }
}

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
