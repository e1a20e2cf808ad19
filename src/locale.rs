//! Script-based locale routing.
//!
//! A text sample is routed to one of three pattern families by the scripts
//! it contains. The check is deliberately coarse: one Cyrillic character is
//! enough to send the whole text to the Russian patterns.

use serde::{Deserialize, Serialize};

/// Address format family used to pick a pattern set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocaleTag {
    Russian,
    European,
    Global,
}

impl LocaleTag {
    pub const ALL: [LocaleTag; 3] = [LocaleTag::Russian, LocaleTag::European, LocaleTag::Global];

    /// Parse a query/body hint into a locale tag.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "russian" | "ru" => Some(Self::Russian),
            "european" | "eu" => Some(Self::European),
            "global" => Some(Self::Global),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Russian => "russian",
            Self::European => "european",
            Self::Global => "global",
        }
    }
}

/// Classify text by script. Cyrillic wins over Latin, anything else is `Global`.
pub fn detect(text: &str) -> LocaleTag {
    if text.chars().any(is_cyrillic) {
        LocaleTag::Russian
    } else if text.chars().any(is_latin_letter) {
        LocaleTag::European
    } else {
        LocaleTag::Global
    }
}

pub fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{052F}')
}

fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
        || (matches!(c, '\u{00C0}'..='\u{024F}') && c != '\u{00D7}' && c != '\u{00F7}')
}
