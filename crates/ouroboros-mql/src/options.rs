//! Translation options

use serde::{Deserialize, Serialize};

use ouroboros_common::Result;

use crate::registry::DEFAULT_DISCRIMINATOR_ELEMENT;

/// How string lengths, offsets and substrings are measured on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringTranslationMode {
    /// UTF-8 bytes (`$strLenBytes`, `$substr`, `$indexOfBytes`)
    #[default]
    Bytes,
    /// Unicode code points (`$strLenCP`, `$substrCP`, `$indexOfCP`)
    CodePoints,
}

impl StringTranslationMode {
    pub fn str_len(&self) -> &'static str {
        match self {
            StringTranslationMode::Bytes => "$strLenBytes",
            StringTranslationMode::CodePoints => "$strLenCP",
        }
    }

    pub fn substr(&self) -> &'static str {
        match self {
            StringTranslationMode::Bytes => "$substr",
            StringTranslationMode::CodePoints => "$substrCP",
        }
    }

    pub fn index_of(&self) -> &'static str {
        match self {
            StringTranslationMode::Bytes => "$indexOfBytes",
            StringTranslationMode::CodePoints => "$indexOfCP",
        }
    }
}

/// Options applied to every translation made by a [`crate::Translator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationOptions {
    /// String measurement used by aggregation expressions
    pub string_translation_mode: StringTranslationMode,
    /// Element holding type discriminators when a document map does not name one
    pub discriminator_element: String,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            string_translation_mode: StringTranslationMode::Bytes,
            discriminator_element: DEFAULT_DISCRIMINATOR_ELEMENT.to_string(),
        }
    }
}

impl TranslationOptions {
    /// Parses options from JSON; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn string_translation_mode(mut self, mode: StringTranslationMode) -> Self {
        self.string_translation_mode = mode;
        self
    }

    pub fn discriminator_element(mut self, element: impl Into<String>) -> Self {
        self.discriminator_element = element.into();
        self
    }
}
