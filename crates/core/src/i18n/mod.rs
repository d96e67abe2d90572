//! Localized string tables.
//!
//! Each table maps a message key (`edit`, `block`, `board-1201`, ...) to a
//! template string understood by [`crate::template`]. English is built in and
//! backs every other table, so a partial translation still renders every event.

use std::collections::HashMap;

use log::warn;

use crate::errors::{RelayError, Result};

const EN: &str = include_str!("en.json");

/// Languages with a built-in table.
const BUILT_IN: [(&str, &str); 1] = [("en", EN)];

#[derive(Clone, Debug, Default)]
pub struct MessageTable {
    language: String,
    strings: HashMap<String, String>,
}

impl MessageTable {
    /// The built-in English table.
    pub fn english() -> Self {
        Self {
            language: "en".to_string(),
            strings: serde_json::from_str(EN).unwrap_or_default(),
        }
    }

    /// Look a built-in language up, falling back to English when it is unknown.
    pub fn for_language(language: &str) -> Self {
        let found = BUILT_IN
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(language));

        match found {
            Some((code, json)) => Self::from_json(code, json).unwrap_or_else(|e| {
                warn!("String table '{}' is invalid ({}), using English", code, e);
                Self::english()
            }),
            None => {
                warn!("No string table for language '{}', using English", language);
                Self::english()
            }
        }
    }

    /// Build a table from a JSON object of key -> template. Keys it lacks are
    /// taken from English.
    pub fn from_json(language: &str, json: &str) -> Result<Self> {
        let overrides: HashMap<String, String> = serde_json::from_str(json)?;
        let mut table = Self::english();
        table.language = language.to_string();
        table.strings.extend(overrides);
        Ok(table)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }

    /// Like [`get`](Self::get), but a missing key is an error.
    pub fn message(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| RelayError::UnknownMessage(key.to_string()))
    }

    /// A plain label: the string for `key`, or `key` itself when it is missing.
    pub fn label<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key).unwrap_or(key)
    }
}
