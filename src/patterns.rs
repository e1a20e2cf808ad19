//! Compiled per-locale field matchers.
//!
//! Built once at start-up from [`LocalePatternConfig`] data and shared
//! read-only behind an `Arc`. A field with no matcher for a locale simply
//! never gets populated for that locale.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{FieldPattern, LocalePatternConfig, Normalize};
use crate::error::PatternError;
use crate::locale::LocaleTag;

/// Address/contact attribute a matcher extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Name,
    Phone,
    Email,
    PostalCode,
    Region,
    City,
    Street,
    House,
    Block,
    Apartment,
    Birthday,
}

impl FieldKind {
    pub const ALL: [FieldKind; 11] = [
        FieldKind::Name,
        FieldKind::Phone,
        FieldKind::Email,
        FieldKind::PostalCode,
        FieldKind::Region,
        FieldKind::City,
        FieldKind::Street,
        FieldKind::House,
        FieldKind::Block,
        FieldKind::Apartment,
        FieldKind::Birthday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::PostalCode => "postal_code",
            Self::Region => "region",
            Self::City => "city",
            Self::Street => "street",
            Self::House => "house",
            Self::Block => "block",
            Self::Apartment => "apartment",
            Self::Birthday => "birthday",
        }
    }
}

/// A single compiled field matcher.
#[derive(Debug)]
pub struct FieldMatcher {
    regex: Regex,
    strip_prefix: Option<Regex>,
    normalize: Option<Normalize>,
}

impl FieldMatcher {
    pub fn compile(pattern: &FieldPattern) -> Result<Self, PatternError> {
        let regex = Regex::new(&pattern.pattern).map_err(|e| PatternError::InvalidRegex {
            field: pattern.field,
            source: e,
        })?;

        let strip_prefix = pattern
            .strip_prefix
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| PatternError::InvalidRegex {
                field: pattern.field,
                source: e,
            })?;

        Ok(Self {
            regex,
            strip_prefix,
            normalize: pattern.normalize,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// First match in `text`, post-processed. `None` if nothing usable matched.
    pub fn find(&self, text: &str) -> Option<String> {
        let caps = self.regex.captures(text)?;

        // First participating group, else the whole match
        let raw = caps
            .iter()
            .skip(1)
            .flatten()
            .next()
            .or_else(|| caps.get(0))
            .map(|m| m.as_str())?;

        let mut value = raw.trim().to_string();

        if let Some(prefix) = &self.strip_prefix {
            let stripped = prefix.replace(&value, "").trim().to_string();
            value = stripped;
        }

        let value = match self.normalize {
            Some(Normalize::PhoneDigits) => normalize_phone(&value)?,
            Some(Normalize::DottedDate) => value.replace('/', "."),
            None => value,
        };

        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

/// Digits only, prefixed with `'` so spreadsheet tools keep leading zeros.
pub fn normalize_phone(value: &str) -> Option<String> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("'{}", digits))
    }
}

/// All matchers for one locale family.
#[derive(Debug)]
pub struct LocalePatternSet {
    locale: LocaleTag,
    matchers: HashMap<FieldKind, FieldMatcher>,
}

impl LocalePatternSet {
    /// Compile a locale config. Invalid patterns are skipped with a warning,
    /// leaving that field unset.
    pub fn compile(config: &LocalePatternConfig) -> Self {
        let mut matchers = HashMap::new();
        for p in &config.patterns {
            match FieldMatcher::compile(p) {
                Ok(matcher) => {
                    matchers.insert(p.field, matcher);
                }
                Err(e) => {
                    warn!(
                        "Skipping invalid {} pattern ({}): {}",
                        config.locale.as_str(),
                        p.pattern,
                        e
                    );
                }
            }
        }
        debug!(
            "Compiled {} field matchers for {}",
            matchers.len(),
            config.locale.as_str()
        );
        Self {
            locale: config.locale,
            matchers,
        }
    }

    pub fn locale(&self) -> LocaleTag {
        self.locale
    }

    pub fn matcher(&self, field: FieldKind) -> Option<&FieldMatcher> {
        self.matchers.get(&field)
    }

    /// Fields this set can populate, in canonical order.
    pub fn fields(&self) -> Vec<FieldKind> {
        FieldKind::ALL
            .into_iter()
            .filter(|f| self.matchers.contains_key(f))
            .collect()
    }
}

/// The three compiled locale families.
#[derive(Debug)]
pub struct PatternLibrary {
    russian: LocalePatternSet,
    european: LocalePatternSet,
    global: LocalePatternSet,
}

impl PatternLibrary {
    #[cfg(test)]
    pub fn builtin() -> Self {
        Self::from_configs(&crate::config::builtin_locale_configs())
    }

    /// Compile from configs. A locale missing from `configs` gets an empty set.
    pub fn from_configs(configs: &[LocalePatternConfig]) -> Self {
        let compile = |locale: LocaleTag| {
            configs
                .iter()
                .find(|c| c.locale == locale)
                .map(LocalePatternSet::compile)
                .unwrap_or_else(|| {
                    warn!("No pattern config for {}", locale.as_str());
                    LocalePatternSet {
                        locale,
                        matchers: HashMap::new(),
                    }
                })
        };

        Self {
            russian: compile(LocaleTag::Russian),
            european: compile(LocaleTag::European),
            global: compile(LocaleTag::Global),
        }
    }

    pub fn get(&self, locale: LocaleTag) -> &LocalePatternSet {
        match locale {
            LocaleTag::Russian => &self.russian,
            LocaleTag::European => &self.european,
            LocaleTag::Global => &self.global,
        }
    }
}
