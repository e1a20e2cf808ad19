//! Cyrillic to Latin transliteration.
//!
//! Two phases: locality prefixes like `г.` are rewritten as whole units first,
//! then the remaining text is mapped character by character.

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::schema::AddressRecord;

fn prefix_regex() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| {
        // Longest alternatives first so `пгт.` is not read as `п` + `гт.`
        Regex::new(r"(?i)\b(пгт|пос|рп|г|д|с)\.").expect("locality prefix regex is valid")
    })
}

fn latin_prefix(prefix: &str) -> Option<&'static str> {
    match prefix.to_lowercase().as_str() {
        "г" => Some("G."),
        "д" => Some("D."),
        "с" => Some("S."),
        "пгт" => Some("Pgt."),
        "пос" => Some("Pos."),
        "рп" => Some("Rp."),
        _ => None,
    }
}

/// Latin form of a lowercase Cyrillic letter. Soft and hard signs map to "".
fn latin_for(c: char) -> Option<&'static str> {
    let latin = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "yo",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' => "",
        'ы' => "y",
        'ь' => "",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        // Ukrainian / Belarusian letters seen in addresses
        'і' => "i",
        'ї' => "yi",
        'є' => "ye",
        'ґ' => "g",
        'ў' => "u",
        _ => return None,
    };
    Some(latin)
}

/// Transliterate Cyrillic text to Latin.
///
/// Characters without a mapping pass through unchanged, so Latin input comes
/// back as-is. An uppercase source letter capitalizes only the first output
/// letter: `Щ` becomes `Shch`.
pub fn transliterate(text: &str) -> String {
    let prefixed = prefix_regex().replace_all(text, |caps: &Captures| {
        latin_prefix(&caps[1])
            .map(str::to_string)
            .unwrap_or_else(|| caps[0].to_string())
    });

    let mut out = String::with_capacity(prefixed.len());
    for c in prefixed.chars() {
        let lower = c.to_lowercase().next().unwrap_or(c);
        match latin_for(lower) {
            Some(latin) if c != lower => {
                let mut chars = latin.chars();
                if let Some(first) = chars.next() {
                    out.extend(first.to_uppercase());
                    out.push_str(chars.as_str());
                }
            }
            Some(latin) => out.push_str(latin),
            None => out.push(c),
        }
    }
    out
}

/// Copy of `record` with every free-text field transliterated.
///
/// Phone, email, postal code, birthday and `raw` are left untouched.
pub fn transliterate_record(record: &AddressRecord) -> AddressRecord {
    let t = |v: &Option<String>| v.as_deref().map(transliterate);
    AddressRecord {
        full_name: t(&record.full_name),
        region: t(&record.region),
        city: t(&record.city),
        street: t(&record.street),
        house: t(&record.house),
        block: t(&record.block),
        apartment: t(&record.apartment),
        ..record.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_words() {
        assert_eq!(transliterate("Москва"), "Moskva");
        assert_eq!(transliterate("Щука"), "Shchuka");
        assert_eq!(transliterate("ёлка"), "yolka");
        assert_eq!(transliterate("Юрий Жуков"), "Yuriy Zhukov");
    }

    #[test]
    fn test_signs_dropped() {
        assert_eq!(transliterate("Ильич"), "Ilich");
        assert_eq!(transliterate("подъезд"), "podezd");
        assert_eq!(transliterate("ЪЬ"), "");
    }

    #[test]
    fn test_digraph_capitalization() {
        assert_eq!(transliterate("Щ"), "Shch");
        assert_eq!(transliterate("ЩИ"), "ShchI");
    }

    #[test]
    fn test_locality_prefix() {
        assert_eq!(transliterate("г. Москва"), "G. Moskva");
        assert_eq!(transliterate("Г. Тула"), "G. Tula");
        assert_eq!(transliterate("пгт. Лесной"), "Pgt. Lesnoy");
        assert_eq!(transliterate("с.Ивановка"), "S.Ivanovka");
    }

    #[test]
    fn test_prefix_needs_word_boundary() {
        // `г.` at the end of a word is a plain letter
        assert_eq!(transliterate("Ленинг."), "Lening.");
    }

    #[test]
    fn test_latin_passthrough() {
        let latin = "Hauptstraße 12, 10115 Berlin";
        assert_eq!(transliterate(latin), latin);
        assert_eq!(transliterate(&transliterate("Москва")), "Moskva");
    }

    #[test]
    fn test_transliterate_record() {
        let record = AddressRecord {
            full_name: Some("Иванов Иван".to_string()),
            city: Some("Москва".to_string()),
            phone: Some("'79123456789".to_string()),
            raw: "Иванов Иван, г. Москва".to_string(),
            ..Default::default()
        };
        let latin = transliterate_record(&record);
        assert_eq!(latin.full_name.as_deref(), Some("Ivanov Ivan"));
        assert_eq!(latin.city.as_deref(), Some("Moskva"));
        assert_eq!(latin.phone, record.phone);
        assert_eq!(latin.raw, record.raw);
    }
}
