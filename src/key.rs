// 🔑 Key Normalizer - Supplier code → numeric join key
//
// "SP_4309"     → 4309
// "SP4309"      → absent (no separator)
// "SP-4320-100" → absent (wrong separator)
// "SP_4320-100" → absent; remainder "4320-100" is compound, not a key

use crate::config::SyncConfig;
use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNormalizer {
    prefix: String,
    separator: char,
}

impl KeyNormalizer {
    pub fn new(prefix: impl Into<String>, separator: char) -> Self {
        KeyNormalizer {
            prefix: prefix.into(),
            separator,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.supplier_prefix.clone(), config.key_separator)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Does the code belong to this supplier at all?
    pub fn has_prefix(&self, code: &str) -> bool {
        code.trim().starts_with(self.prefix.as_str())
    }

    /// Everything after prefix + separator, verbatim.
    ///
    /// `"SP_4320-100"` yields `"4320-100"`; no further splitting happens here.
    pub fn remainder<'a>(&self, code: &'a str) -> Option<&'a str> {
        code.trim()
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix(self.separator)
    }

    /// Extract the numeric key, explaining why a code was rejected
    pub fn parse(&self, code: &str) -> Result<u64, SyncError> {
        let malformed = |reason: String| SyncError::MalformedKey {
            code: code.to_string(),
            reason,
        };

        if !self.has_prefix(code) {
            return Err(malformed(format!("does not start with '{}'", self.prefix)));
        }

        let rest = self.remainder(code).ok_or_else(|| {
            malformed(format!(
                "expected '{}' after prefix '{}'",
                self.separator, self.prefix
            ))
        })?;

        if rest.is_empty() {
            return Err(malformed("no digits after separator".to_string()));
        }

        // Compound remainders ("4320-100") are rejected outright
        if !rest.chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed(format!("remainder '{}' is not a plain number", rest)));
        }

        rest.parse::<u64>()
            .map_err(|e| malformed(format!("remainder '{}': {}", rest, e)))
    }

    /// Numeric key, or `None` when the row must be excluded
    pub fn normalize(&self, code: &str) -> Option<u64> {
        self.parse(code).ok()
    }
}

impl Default for KeyNormalizer {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
