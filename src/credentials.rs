//! LLM credential lookup.
//!
//! A missing credential is a normal state (the fallback is simply disabled),
//! so lookups return `Option` and log failures instead of raising them.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SupabaseSettings;

/// Source of the LLM API key.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn api_key(&self) -> Option<String>;
}

/// Key read from an environment variable on every lookup.
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialSource for EnvCredentials {
    async fn api_key(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Key stored as a row in a Supabase settings table (`key`, `value` columns).
#[derive(Clone)]
pub struct SupabaseCredentials {
    client: Client,
    settings: SupabaseSettings,
}

#[derive(Deserialize)]
struct SettingRow {
    value: Option<String>,
}

impl SupabaseCredentials {
    pub fn new(settings: SupabaseSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    async fn fetch(&self) -> anyhow::Result<Option<String>> {
        let url = format!("{}/rest/v1/{}", self.settings.base_url, self.settings.table);

        debug!(
            "Looking up {} in Supabase table {}",
            self.settings.key_name, self.settings.table
        );

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("key", format!("eq.{}", self.settings.key_name)),
                ("select", "value".to_string()),
                ("limit", "1".to_string()),
            ])
            .header("apikey", &self.settings.service_role_key)
            .header(
                "Authorization",
                format!("Bearer {}", self.settings.service_role_key),
            )
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Supabase settings lookup failed: {} - {}", status, text);
        }

        let rows: Vec<SettingRow> = resp.json().await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.value)
            .filter(|key| !key.trim().is_empty()))
    }
}

#[async_trait]
impl CredentialSource for SupabaseCredentials {
    async fn api_key(&self) -> Option<String> {
        match self.fetch().await {
            Ok(key) => key,
            Err(e) => {
                warn!("Credential lookup failed: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_env_credentials_missing() {
        let creds = EnvCredentials::new("ADDRESS_NORMALIZER_TEST_UNSET_KEY");
        assert!(creds.api_key().await.is_none());
    }

    #[tokio::test]
    async fn test_env_credentials_present() {
        std::env::set_var("ADDRESS_NORMALIZER_TEST_KEY", "sk-test");
        let creds = EnvCredentials::new("ADDRESS_NORMALIZER_TEST_KEY");
        assert_eq!(creds.api_key().await.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_setting_row_null_value() {
        let rows: Vec<SettingRow> = serde_json::from_str(r#"[{"value": null}]"#).unwrap();
        assert!(rows[0].value.is_none());
    }
}
