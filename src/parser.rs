//! Freeform address parsing.
//!
//! Pure functions over an immutable [`PatternLibrary`]; safe to call from any
//! number of handlers at once. Missing fields are expected and never an error.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::locale::{self, LocaleTag};
use crate::patterns::{FieldKind, PatternLibrary};
use crate::schema::AddressRecord;

/// Priority used when labelling single lines. Narrow shapes come first so a
/// broad matcher (name) cannot claim a line that a precise one would.
const LINE_PRIORITY: [FieldKind; 11] = [
    FieldKind::Email,
    FieldKind::Phone,
    FieldKind::Birthday,
    FieldKind::PostalCode,
    FieldKind::Apartment,
    FieldKind::Block,
    FieldKind::House,
    FieldKind::Street,
    FieldKind::City,
    FieldKind::Region,
    FieldKind::Name,
];

/// A line of input with the field it most likely holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedLine {
    pub line: String,
    pub field: Option<FieldKind>,
}

/// Freeform text -> [`AddressRecord`] using locale pattern sets.
#[derive(Debug, Clone)]
pub struct AddressParser {
    library: Arc<PatternLibrary>,
}

impl AddressParser {
    pub fn new(library: Arc<PatternLibrary>) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    /// Extract every field the locale's pattern set knows about.
    pub fn parse(&self, raw: &str, locale: LocaleTag) -> AddressRecord {
        let buffer = search_buffer(raw);
        let patterns = self.library.get(locale);
        let mut record = AddressRecord::new(raw);

        for field in FieldKind::ALL {
            if let Some(matcher) = patterns.matcher(field) {
                *record.field_mut(field) = matcher.find(&buffer);
            }
        }

        debug!(
            "Parsed {} chars as {}: {} fields found",
            raw.len(),
            locale.as_str(),
            record.filled_count()
        );
        record
    }

    /// Detect the locale from the text, then parse.
    pub fn parse_auto(&self, raw: &str) -> (LocaleTag, AddressRecord) {
        let locale = locale::detect(raw);
        (locale, self.parse(raw, locale))
    }

    /// Label each input line with the first field whose matcher accepts it.
    pub fn classify_lines(&self, raw: &str, locale: LocaleTag) -> Vec<ClassifiedLine> {
        let patterns = self.library.get(locale);

        split_lines(raw)
            .map(|line| {
                let field = LINE_PRIORITY.into_iter().find(|field| {
                    patterns
                        .matcher(*field)
                        .map(|m| m.is_match(line))
                        .unwrap_or(false)
                });
                ClassifiedLine {
                    line: line.to_string(),
                    field,
                }
            })
            .collect()
    }
}

/// Non-empty trimmed segments split on newlines, carriage returns and commas.
fn split_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.trim()
        .split(['\n', '\r', ','])
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

/// Collapse multi-line input into one space-separated scanning target.
pub fn search_buffer(raw: &str) -> String {
    split_lines(raw).collect::<Vec<_>>().join(" ")
}
