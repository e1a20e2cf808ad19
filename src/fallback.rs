//! Best-effort LLM address parsing.
//!
//! Used when the caller decides freeform parsing found too little. Every
//! failure (no key, network, bad status, unparseable reply) is logged and
//! collapsed into `None`; nothing crosses back into the caller as an error.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::credentials::CredentialSource;
use crate::error::FallbackError;
use crate::llm_client::{ChatBackend, Message};
use crate::json_path::str_at;
use crate::locale::{self, LocaleTag};
use crate::patterns::FieldKind;
use crate::schema::AddressRecord;

const REPLY_FORMAT: &str = r#"Reply with ONLY a JSON object, no commentary, using exactly these keys
(use null for anything not present in the text):
{
  "full_name": "string or null",
  "phone": "string or null",
  "email": "string or null",
  "postal_code": "string or null",
  "region": "string or null",
  "city": "string or null",
  "street": "string or null",
  "house": "string or null",
  "block": "string or null",
  "apartment": "string or null",
  "birthday": "dd.mm.yyyy or null"
}"#;

/// System prompt for a locale family.
pub fn instruction_prompt(locale: LocaleTag) -> String {
    let rules = match locale {
        LocaleTag::Russian => {
            "The text is a Russian address and contact details, possibly with typos.\n\
             Transliterate every textual value into the Latin alphabet.\n\
             Omit the soft sign (ь) and hard sign (ъ) entirely.\n\
             Drop prefixes such as \"г.\", \"ул.\", \"д.\", \"кв.\" from the values they introduce."
        }
        LocaleTag::European => {
            "The text is a European address and contact details, possibly with typos.\n\
             Keep values in their original Latin spelling, including diacritics.\n\
             Street goes in \"street\" without the house number."
        }
        LocaleTag::Global => {
            "The text is an address and contact details in a non-Latin script.\n\
             Transliterate every textual value into the Latin alphabet.\n\
             Omit characters that have no Latin equivalent."
        }
    };

    format!(
        "You extract structured shipping addresses from freeform messages.\n{}\n\
         Phone numbers: digits only, keep the country code.\n\n{}",
        rules, REPLY_FORMAT
    )
}

/// LLM-backed address extraction with a uniform `None` failure signal.
pub struct LlmAddressFallback {
    credentials: Arc<dyn CredentialSource>,
    backend: Arc<dyn ChatBackend>,
}

impl LlmAddressFallback {
    pub fn new(credentials: Arc<dyn CredentialSource>, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            credentials,
            backend,
        }
    }

    /// Parse `text` with the LLM. `None` means the fallback is unavailable.
    pub async fn parse_via_llm(
        &self,
        text: &str,
        locale_hint: Option<LocaleTag>,
    ) -> Option<AddressRecord> {
        match self.try_parse(text, locale_hint).await {
            Ok(record) => {
                info!("LLM fallback filled {} fields", record.filled_count());
                Some(record)
            }
            Err(FallbackError::NoCredential) => {
                warn!("LLM fallback skipped: no API key configured");
                None
            }
            Err(e) => {
                warn!("LLM fallback failed: {}", e);
                None
            }
        }
    }

    async fn try_parse(
        &self,
        text: &str,
        locale_hint: Option<LocaleTag>,
    ) -> Result<AddressRecord, FallbackError> {
        let api_key = self
            .credentials
            .api_key()
            .await
            .ok_or(FallbackError::NoCredential)?;

        let locale = locale_hint.unwrap_or_else(|| locale::detect(text));
        debug!("LLM fallback for {} chars as {}", text.len(), locale.as_str());

        let messages = vec![
            Message::system(instruction_prompt(locale)),
            Message::user(text),
        ];

        let reply = self.backend.complete(&api_key, messages).await?;
        debug!("LLM reply length: {} chars", reply.len());

        let reply: Value = serde_json::from_str(unwrap_code_fence(&reply))?;
        Ok(record_from_reply(&reply, text))
    }
}

/// Reply key carrying `field`.
fn reply_key(field: FieldKind) -> &'static str {
    match field {
        FieldKind::Name => "full_name",
        other => other.as_str(),
    }
}

/// Copy reply keys onto a record. Strings and numbers are taken as text;
/// anything else (null, bool, nested values) leaves the field unset.
fn record_from_reply(reply: &Value, raw: &str) -> AddressRecord {
    let mut record = AddressRecord::new(raw);
    for field in FieldKind::ALL {
        *record.field_mut(field) = str_at(reply, &[reply_key(field)]);
    }
    record
}

/// Body of a fenced code block if the reply has one, else the trimmed reply.
pub fn unwrap_code_fence(reply: &str) -> &str {
    let Some((_, rest)) = reply.split_once("```") else {
        return reply.trim();
    };
    let body = rest.split("```").next().unwrap_or(rest);

    // Opening line may carry a language tag in any case: `json`, `JSON`
    match body.split_once('\n') {
        Some((tag, content)) if !tag.trim_start().starts_with(['{', '[']) => content.trim(),
        _ => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedKey(Option<&'static str>);

    #[async_trait]
    impl CredentialSource for FixedKey {
        async fn api_key(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    enum Reply {
        Text(&'static str),
        Status(u16),
        Empty,
    }

    struct FakeBackend {
        reply: Reply,
        calls: AtomicUsize,
        last_messages: Mutex<Vec<Message>>,
    }

    impl FakeBackend {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                last_messages: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn complete(
            &self,
            _api_key: &str,
            messages: Vec<Message>,
        ) -> Result<String, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_messages.lock().unwrap() = messages;
            match &self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Status(status) => Err(ChatError::Status {
                    status: *status,
                    body: "boom".to_string(),
                }),
                Reply::Empty => Err(ChatError::EmptyReply),
            }
        }
    }

    fn fallback(key: Option<&'static str>, backend: Arc<FakeBackend>) -> LlmAddressFallback {
        LlmAddressFallback::new(Arc::new(FixedKey(key)), backend)
    }

    #[tokio::test]
    async fn test_no_credential_skips_network() {
        let backend = FakeBackend::new(Reply::Text("{}"));
        let result = fallback(None, backend.clone())
            .parse_via_llm("г. Москва", None)
            .await;
        assert!(result.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_maps_fields() {
        let backend = FakeBackend::new(Reply::Text(
            r#"{"full_name": "Ivanov Ivan", "city": "Moskva", "street": "Lenina", "house": "5", "apartment": null}"#,
        ));
        let record = fallback(Some("sk"), backend.clone())
            .parse_via_llm("Иванов Иван, г. Москва, ул. Ленина, д. 5", None)
            .await
            .unwrap();

        assert_eq!(record.full_name.as_deref(), Some("Ivanov Ivan"));
        assert_eq!(record.city.as_deref(), Some("Moskva"));
        assert_eq!(record.house.as_deref(), Some("5"));
        assert!(record.apartment.is_none());
        assert_eq!(record.raw, "Иванов Иван, г. Москва, ул. Ленина, д. 5");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prompt_follows_locale() {
        let backend = FakeBackend::new(Reply::Text("{}"));
        let fb = fallback(Some("sk"), backend.clone());

        fb.parse_via_llm("ул. Мира", None).await.unwrap();
        let messages = backend.last_messages.lock().unwrap().clone();
        assert_eq!(messages[0], Message::system(instruction_prompt(LocaleTag::Russian)));
        assert_eq!(messages[1], Message::user("ул. Мира"));

        fb.parse_via_llm("ул. Мира", Some(LocaleTag::Global)).await.unwrap();
        let messages = backend.last_messages.lock().unwrap().clone();
        assert_eq!(messages[0], Message::system(instruction_prompt(LocaleTag::Global)));
    }

    #[tokio::test]
    async fn test_fenced_reply() {
        let backend = FakeBackend::new(Reply::Text(
            "Here you go:\n```json\n{\"city\": \"Berlin\"}\n```",
        ));
        let record = fallback(Some("sk"), backend)
            .parse_via_llm("Berlin", None)
            .await
            .unwrap();
        assert_eq!(record.city.as_deref(), Some("Berlin"));
    }

    #[tokio::test]
    async fn test_failures_collapse_to_none() {
        for reply in [Reply::Text("not json at all"), Reply::Status(500), Reply::Empty] {
            let backend = FakeBackend::new(reply);
            let result = fallback(Some("sk"), backend.clone())
                .parse_via_llm("text", None)
                .await;
            assert!(result.is_none());
            assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_numeric_reply_values_kept() {
        let backend = FakeBackend::new(Reply::Text(
            r#"{"city": "Moskva", "house": 5, "postal_code": 101000, "phone": 79123456789, "block": true, "street": null}"#,
        ));
        let record = fallback(Some("sk"), backend)
            .parse_via_llm("Москва, д. 5", None)
            .await
            .unwrap();

        assert_eq!(record.city.as_deref(), Some("Moskva"));
        assert_eq!(record.house.as_deref(), Some("5"));
        assert_eq!(record.postal_code.as_deref(), Some("101000"));
        assert_eq!(record.phone.as_deref(), Some("79123456789"));
        assert!(record.block.is_none());
        assert!(record.street.is_none());
        assert_eq!(record.raw, "Москва, д. 5");
    }

    #[test]
    fn test_unwrap_code_fence() {
        assert_eq!(unwrap_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(unwrap_code_fence("```JSON\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(unwrap_code_fence("Result:\n```Json\n{}\n```\nDone"), "{}");
        assert_eq!(unwrap_code_fence("```\n{}\n```"), "{}");
        assert_eq!(unwrap_code_fence("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(unwrap_code_fence("  {}  "), "{}");
    }

    #[test]
    fn test_prompts_differ_by_locale() {
        let ru = instruction_prompt(LocaleTag::Russian);
        assert!(ru.contains("Latin"));
        assert!(ru.contains("ь"));
        assert!(ru.contains("\"birthday\""));
        assert_ne!(ru, instruction_prompt(LocaleTag::European));
    }
}
