//! DeepL HTTP translator

use super::{CredentialSource, Translator};
use crate::config::TranslationConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sepsight_core::{Error, Result, TranslationErrorKind};
use serde::{Deserialize, Serialize};

const FREE_API_URL: &str = "https://api-free.deepl.com";
const PRO_API_URL: &str = "https://api.deepl.com";

/// DeepL quota-exhausted status
const QUOTA_EXCEEDED: u16 = 456;

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: [&'a str; 1],
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(default)]
    #[allow(dead_code)]
    detected_source_language: Option<String>,
    text: String,
}

/// Remote translator backed by the DeepL v2 API
pub struct DeepLTranslator {
    client: Client,
    credentials: CredentialSource,
    base_url: Option<String>,
    source_lang: String,
    target_lang: String,
}

impl DeepLTranslator {
    pub fn new(config: &TranslationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials: CredentialSource::from_config(config),
            base_url: config.base_url.clone(),
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
        })
    }

    /// Override the credential lookup
    pub fn with_credentials(mut self, credentials: CredentialSource) -> Self {
        self.credentials = credentials;
        self
    }

    /// Send requests to a fixed base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Free-tier keys end in ":fx" and use a separate host
    fn endpoint(&self, key: &str) -> String {
        let base = match &self.base_url {
            Some(url) => url.trim_end_matches('/'),
            None if key.ends_with(":fx") => FREE_API_URL,
            None => PRO_API_URL,
        };
        format!("{base}/v2/translate")
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let kind = match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => TranslationErrorKind::Authentication,
        StatusCode::TOO_MANY_REQUESTS => TranslationErrorKind::RateLimited,
        s if s.as_u16() == QUOTA_EXCEEDED => TranslationErrorKind::QuotaExceeded,
        _ => TranslationErrorKind::Api,
    };
    Error::translation(kind, format!("DeepL returned {}: {}", status, body.trim()))
}

#[async_trait]
impl Translator for DeepLTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        let key = self.credentials.resolve().ok_or_else(|| {
            Error::translation(TranslationErrorKind::MissingCredential, "no DeepL API key configured")
        })?;

        let request = TranslateRequest {
            text: [text],
            source_lang: &self.source_lang,
            target_lang: &self.target_lang,
        };

        let response = self
            .client
            .post(self.endpoint(&key))
            .header("Authorization", format!("DeepL-Auth-Key {key}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    TranslationErrorKind::Timeout
                } else {
                    TranslationErrorKind::Network
                };
                Error::translation(kind, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body: TranslateResponse = response.json().await.map_err(|e| {
            Error::translation(TranslationErrorKind::Api, format!("Malformed DeepL response: {}", e))
        })?;

        body.translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| Error::translation(TranslationErrorKind::Api, "DeepL returned no translations"))
    }

    fn name(&self) -> &str {
        "deepl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> DeepLTranslator {
        DeepLTranslator::new(&TranslationConfig::default()).unwrap()
    }

    #[test]
    fn test_endpoint_by_key_type() {
        let t = translator();
        assert_eq!(t.endpoint("abc:fx"), "https://api-free.deepl.com/v2/translate");
        assert_eq!(t.endpoint("abc"), "https://api.deepl.com/v2/translate");

        let t = translator().with_base_url("http://127.0.0.1:9000/");
        assert_eq!(t.endpoint("abc:fx"), "http://127.0.0.1:9000/v2/translate");
    }

    #[test]
    fn test_status_mapping() {
        let kind = |code: u16| {
            status_error(StatusCode::from_u16(code).unwrap(), "")
                .translation_kind()
                .unwrap()
        };
        assert_eq!(kind(403), TranslationErrorKind::Authentication);
        assert_eq!(kind(456), TranslationErrorKind::QuotaExceeded);
        assert_eq!(kind(429), TranslationErrorKind::RateLimited);
        assert_eq!(kind(500), TranslationErrorKind::Api);
    }
}
