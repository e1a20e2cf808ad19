//! Service configuration and locale pattern definitions.
//!
//! Runtime settings come from the environment (after `.env` is loaded).
//! Pattern sets are plain data: the three built-in families live here and can
//! be overridden field-by-field from `*.json` files in a directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::locale::LocaleTag;
use crate::patterns::{FieldKind, FieldMatcher};

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Runtime settings for the HTTP service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub llm_api_url: String,
    pub llm_model: String,
    /// Name of the env var holding the LLM key when Supabase is not configured.
    pub llm_key_env: String,
    pub supabase: Option<SupabaseSettings>,
    pub pattern_overrides_dir: Option<PathBuf>,
}

/// Where the LLM key lives when it is kept in a Supabase settings table.
#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub base_url: String,
    pub service_role_key: String,
    pub table: String,
    pub key_name: String,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let supabase = match (
            std::env::var("SUPABASE_URL").ok(),
            std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
        ) {
            (Some(base_url), Some(service_role_key)) => Some(SupabaseSettings {
                base_url: base_url.trim_end_matches('/').to_string(),
                service_role_key,
                table: env_or("SUPABASE_SETTINGS_TABLE", "app_settings"),
                key_name: env_or("SUPABASE_SETTINGS_KEY", "openai_api_key"),
            }),
            _ => None,
        };

        Self {
            bind_addr: env_or("ADDRESS_SERVICE_ADDR", DEFAULT_ADDR),
            llm_api_url: env_or("LLM_API_URL", DEFAULT_LLM_URL),
            llm_model: env_or("LLM_MODEL", DEFAULT_LLM_MODEL),
            llm_key_env: env_or("LLM_API_KEY_ENV", "OPENAI_API_KEY"),
            supabase,
            pattern_overrides_dir: std::env::var("PATTERN_OVERRIDES_DIR").ok().map(PathBuf::from),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Post-processing applied to a captured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalize {
    /// Keep digits only and prefix an apostrophe so spreadsheets keep it as text.
    PhoneDigits,
    /// `dd/mm/yyyy` -> `dd.mm.yyyy`
    DottedDate,
}

/// One field matcher definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldPattern {
    pub field: FieldKind,
    /// Regex; the first participating capture group is the value, else the whole match.
    pub pattern: String,
    /// Regex removed from the start of the captured value (e.g. `ул.`).
    #[serde(default)]
    pub strip_prefix: Option<String>,
    #[serde(default)]
    pub normalize: Option<Normalize>,
}

impl FieldPattern {
    fn new(field: FieldKind, pattern: &str) -> Self {
        Self {
            field,
            pattern: pattern.to_string(),
            strip_prefix: None,
            normalize: None,
        }
    }

    fn strip(mut self, prefix: &str) -> Self {
        self.strip_prefix = Some(prefix.to_string());
        self
    }

    fn normalized(mut self, normalize: Normalize) -> Self {
        self.normalize = Some(normalize);
        self
    }
}

/// All field matchers for one locale family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalePatternConfig {
    pub locale: LocaleTag,
    pub patterns: Vec<FieldPattern>,
}

impl LocalePatternConfig {
    /// Replace (or add) matchers with the ones from `other`, keyed by field.
    pub fn merge(&mut self, other: LocalePatternConfig) {
        for pattern in other.patterns {
            match self.patterns.iter_mut().find(|p| p.field == pattern.field) {
                Some(existing) => *existing = pattern,
                None => self.patterns.push(pattern),
            }
        }
    }
}

const EMAIL: &str = r"([A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,})";
const BIRTHDAY: &str = r"\b(\d{2}[./]\d{2}[./]\d{4})\b";

const RU_CITY_PREFIX: &str = r"(?:г\.|город|пос\.|посёлок|пгт\.?|рп\.?|с\.|село|д\.|деревня)";
const RU_STREET_PREFIX: &str =
    r"(?:ул\.|улица|просп\.|проспект|пр-т|пер\.|переулок|ш\.|шоссе|б-р|бульвар|наб\.|набережная|пл\.|площадь)";

/// Words that open a two-word street name (`Большая Садовая`, `Маршала Жукова`).
const RU_STREET_QUALIFIER: &str = r"(?:(?:Больш|Мал|Нов|Стар|Верхн|Нижн|Средн|Красн)(?:ая|яя|ой|ий|ый|ое|ее)|Маршала|Генерала|Адмирала|Академика|Героя|Карла|Розы)";
/// Endings of a patronymic, the optional third word of a full name.
const RU_PATRONYMIC_END: &str = r"(?:ич|вна|ична|оглы|кызы)";

const EU_STREET_SUFFIX: &str =
    r"(?:straße|strasse|str\.|weg|gasse|platz|allee|ring|damm|laan|straat|gracht|vej|gatan)";
const EN_STREET_TYPE: &str =
    r"(?:Street|St\.|Road|Rd\.|Avenue|Ave\.|Lane|Ln\.|Drive|Dr\.|Boulevard|Blvd\.)";
const EU_UPPER: &str = r"[A-ZÀ-ÖØ-Þ]";
const EU_LOWER: &str = r"[a-zß-öø-ÿ]";

fn russian() -> LocalePatternConfig {
    let city = format!(r"\b({RU_CITY_PREFIX}\s*[А-ЯЁ][а-яё]+(?:-[А-ЯЁа-яё][а-яё]*)*)");
    // One capitalized word, two only after a qualifier: the buffer has no line
    // breaks, so a name on the next line would otherwise be swallowed
    let street = format!(
        r"\b({RU_STREET_PREFIX}\s*(?:\d+-?[а-я]*\s+)?(?:{RU_STREET_QUALIFIER}\s+)?[А-ЯЁ][а-яё\-]*)"
    );
    // Surname and given name, plus a patronymic when the third word looks like
    // one. Words right after an abbreviation (`г. `, `ул. `) are never a name.
    let name = format!(
        r"(?:^|[^.\s]\s+)([А-ЯЁ][а-яё]+(?:-[А-ЯЁ][а-яё]+)?\s+[А-ЯЁ][а-яё]+(?:\s+[А-ЯЁ][а-яё]*{RU_PATRONYMIC_END})?)\b"
    );

    LocalePatternConfig {
        locale: LocaleTag::Russian,
        patterns: vec![
            FieldPattern::new(FieldKind::Name, &name),
            FieldPattern::new(
                FieldKind::Phone,
                r"(\+?[78][\s\-(]*\d{3}[\s\-)]*\d{3}[\s\-]*\d{2}[\s\-]*\d{2})",
            )
            .normalized(Normalize::PhoneDigits),
            FieldPattern::new(FieldKind::Email, EMAIL),
            FieldPattern::new(FieldKind::PostalCode, r"\b(\d{6})\b"),
            FieldPattern::new(
                FieldKind::Region,
                r"([А-ЯЁ][а-яё\-]+\s+(?:обл\.|область|край)|(?:респ\.|[Рр]еспублика)\s+[А-ЯЁ][а-яё\-]+)",
            ),
            FieldPattern::new(FieldKind::City, &city).strip(&format!(r"^{RU_CITY_PREFIX}\s*")),
            FieldPattern::new(FieldKind::Street, &street)
                .strip(&format!(r"^{RU_STREET_PREFIX}\s*")),
            FieldPattern::new(FieldKind::House, r"\b(?:д\.|дом)\s*(\d+[а-яА-Я]?(?:/\d+)?)"),
            FieldPattern::new(
                FieldKind::Block,
                r"\b(?:корп\.|корпус|корп|стр\.|строение|к\.)\s*(\d+[а-яА-Я]?)",
            ),
            FieldPattern::new(
                FieldKind::Apartment,
                r"\b(?:кв\.|квартира|кв|офис|оф\.)\s*(\d+[а-яА-Я]?)",
            ),
            FieldPattern::new(FieldKind::Birthday, BIRTHDAY).normalized(Normalize::DottedDate),
        ],
    }
}

fn european() -> LocalePatternConfig {
    let word = format!(r"{EU_UPPER}{EU_LOWER}+(?:-{EU_UPPER}{EU_LOWER}+)?");
    let postal = r"\d{4,5}|[A-Z]{1,2}\d[A-Z\d]?\s\d[A-Z]{2}";

    LocalePatternConfig {
        locale: LocaleTag::European,
        patterns: vec![
            FieldPattern::new(FieldKind::Name, &format!(r"\b({word}\s+{word})\b")),
            FieldPattern::new(
                FieldKind::Phone,
                r"(\+\d{1,3}[\s\-.]?\(?\d{1,4}\)?(?:[\s\-.]?\d{2,4}){2,4}|\b0\d{2,4}[\s\-/]?\d{3,}(?:[\s\-]?\d{2,})*)",
            )
            .normalized(Normalize::PhoneDigits),
            FieldPattern::new(FieldKind::Email, EMAIL),
            FieldPattern::new(FieldKind::PostalCode, &format!(r"(?:^|\s)({postal})(?:\s|$)")),
            FieldPattern::new(
                FieldKind::City,
                &format!(
                    r"(?:^|\s)(?:{postal})\s+({EU_UPPER}{EU_LOWER}+(?:-{EU_UPPER}?{EU_LOWER}+)*)"
                ),
            ),
            FieldPattern::new(
                FieldKind::Street,
                &format!(
                    r"\b({EU_UPPER}{EU_LOWER}+\s+{EN_STREET_TYPE}|{EU_UPPER}{EU_LOWER}*{EU_STREET_SUFFIX}|(?i:rue|via|calle|avenida|avenue|boulevard|piazza|plaza|ulica)\s+(?:(?i:de|del|della|des|du|la|le)\s+)?{EU_UPPER}[A-Za-zß-öø-ÿ'\-]*)"
                ),
            ),
            FieldPattern::new(
                FieldKind::House,
                &format!(
                    r"(?:{EU_STREET_SUFFIX}|{EN_STREET_TYPE})\s+(\d{{1,4}}[a-zA-Z]?)\b|\b(\d{{1,4}}[a-zA-Z]?)\s+(?:[A-Z][a-z]+\s+{EN_STREET_TYPE}|(?i:rue|avenue|boulevard|via|calle)\b)"
                ),
            ),
            FieldPattern::new(
                FieldKind::Block,
                r"\b(?i:building|bldg\.?|block|blk\.?|haus|geb\.|gebäude|bâtiment|bat\.|escalera|esc\.|stiege)\s*([A-Za-z]?\d+[A-Za-z]?|[A-Z])\b",
            ),
            FieldPattern::new(
                FieldKind::Apartment,
                r"\b(?i:apt\.?|apartment|flat|unit|suite|ste\.|wohnung|whg\.?|appartement|app\.|apto\.?|piso)\s*#?\s*([A-Za-z]?\d+[A-Za-z]?)\b",
            ),
            FieldPattern::new(FieldKind::Birthday, BIRTHDAY).normalized(Normalize::DottedDate),
        ],
    }
}

fn global() -> LocalePatternConfig {
    LocalePatternConfig {
        locale: LocaleTag::Global,
        patterns: vec![
            FieldPattern::new(
                FieldKind::Name,
                r"(\p{L}[\p{L}\p{M}]*(?:\s+\p{L}[\p{L}\p{M}]*){0,2})",
            ),
            FieldPattern::new(FieldKind::Phone, r"(\+?\d[\d\s\-().]{7,}\d)")
                .normalized(Normalize::PhoneDigits),
            FieldPattern::new(FieldKind::Email, EMAIL),
            FieldPattern::new(FieldKind::PostalCode, r"\b(\d{3}-\d{4}|\d{5,6})\b"),
            FieldPattern::new(FieldKind::Birthday, BIRTHDAY).normalized(Normalize::DottedDate),
        ],
    }
}

/// The three built-in pattern families.
pub fn builtin_locale_configs() -> Vec<LocalePatternConfig> {
    vec![russian(), european(), global()]
}

/// Built-in configs with any `*.json` overrides from `dir` merged on top.
pub fn load_locale_configs(dir: Option<&Path>) -> Result<Vec<LocalePatternConfig>> {
    let mut configs = builtin_locale_configs();

    let Some(dir) = dir else {
        return Ok(configs);
    };

    if !dir.exists() {
        warn!("Pattern override directory does not exist: {:?}", dir);
        return Ok(configs);
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.extension().map(|e| e == "json").unwrap_or(false) {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read pattern override: {:?}", path))?;

            let mut overrides: LocalePatternConfig = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse pattern override: {:?}", path))?;

            // A broken override must not displace the built-in matcher
            overrides.patterns.retain(|p| match FieldMatcher::compile(p) {
                Ok(_) => true,
                Err(e) => {
                    warn!("Ignoring override in {:?}, keeping built-in: {}", path, e);
                    false
                }
            });

            info!(
                "Loaded {} {} pattern overrides from {:?}",
                overrides.patterns.len(),
                overrides.locale.as_str(),
                path
            );

            if let Some(base) = configs.iter_mut().find(|c| c.locale == overrides.locale) {
                base.merge(overrides);
            }
        }
    }

    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_all_locales() {
        let configs = builtin_locale_configs();
        for locale in LocaleTag::ALL {
            assert!(configs.iter().any(|c| c.locale == locale));
        }
    }

    #[test]
    fn test_global_has_no_apartment() {
        let global = global();
        assert!(!global.patterns.iter().any(|p| p.field == FieldKind::Apartment));
    }

    #[test]
    fn test_merge_replaces_by_field() {
        let mut base = global();
        let count = base.patterns.len();
        base.merge(LocalePatternConfig {
            locale: LocaleTag::Global,
            patterns: vec![
                FieldPattern::new(FieldKind::PostalCode, r"\b(\d{4})\b"),
                FieldPattern::new(FieldKind::Apartment, r"#(\d+)"),
            ],
        });

        assert_eq!(base.patterns.len(), count + 1);
        let postal = base
            .patterns
            .iter()
            .find(|p| p.field == FieldKind::PostalCode)
            .unwrap();
        assert_eq!(postal.pattern, r"\b(\d{4})\b");
    }

    #[test]
    fn test_override_json_shape() {
        let json = r#"{
            "locale": "european",
            "patterns": [
                {"field": "phone", "pattern": "(\\+\\d+)", "normalize": "phone_digits"}
            ]
        }"#;
        let parsed: LocalePatternConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.locale, LocaleTag::European);
        assert_eq!(parsed.patterns[0].field, FieldKind::Phone);
        assert_eq!(parsed.patterns[0].normalize, Some(Normalize::PhoneDigits));
        assert!(parsed.patterns[0].strip_prefix.is_none());
    }

    #[test]
    fn test_load_without_dir_is_builtin() {
        let configs = load_locale_configs(None).unwrap();
        assert_eq!(configs.len(), 3);
    }

    #[test]
    fn test_load_missing_dir_falls_back() {
        let configs = load_locale_configs(Some(Path::new("/nonexistent/patterns"))).unwrap();
        assert_eq!(configs.len(), 3);
    }

    fn pattern_for(configs: &[LocalePatternConfig], locale: LocaleTag, field: FieldKind) -> String {
        configs
            .iter()
            .find(|c| c.locale == locale)
            .and_then(|c| c.patterns.iter().find(|p| p.field == field))
            .map(|p| p.pattern.clone())
            .unwrap()
    }

    #[test]
    fn test_load_overrides_from_dir() {
        let dir = std::env::temp_dir().join(format!("pattern-overrides-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("ru.json"),
            r#"{
                "locale": "russian",
                "patterns": [
                    {"field": "postal_code", "pattern": "\\b(\\d{3}-\\d{3})\\b"},
                    {"field": "apartment", "pattern": "[broken"}
                ]
            }"#,
        )
        .unwrap();
        std::fs::write(dir.join("notes.txt"), "not a pattern file").unwrap();

        let configs = load_locale_configs(Some(&dir));
        std::fs::remove_dir_all(&dir).unwrap();
        let configs = configs.unwrap();

        let builtin = builtin_locale_configs();
        assert_eq!(
            pattern_for(&configs, LocaleTag::Russian, FieldKind::PostalCode),
            r"\b(\d{3}-\d{3})\b"
        );
        assert_eq!(
            pattern_for(&configs, LocaleTag::Russian, FieldKind::Apartment),
            pattern_for(&builtin, LocaleTag::Russian, FieldKind::Apartment)
        );
        assert_eq!(
            pattern_for(&configs, LocaleTag::European, FieldKind::PostalCode),
            pattern_for(&builtin, LocaleTag::European, FieldKind::PostalCode)
        );

        let library = crate::patterns::PatternLibrary::from_configs(&configs);
        let russian = library.get(LocaleTag::Russian);
        assert!(russian.matcher(FieldKind::Apartment).is_some());
        assert_eq!(
            russian.matcher(FieldKind::PostalCode).unwrap().find("индекс 101-000").as_deref(),
            Some("101-000")
        );
    }
}
