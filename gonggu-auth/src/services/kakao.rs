//! Kakao OAuth client: authorize URL, code exchange, and user lookup.

use std::time::Duration;

use axum::http::HeaderMap;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use thiserror::Error;

use crate::config::KakaoConfig;

pub const CALLBACK_PATH: &str = "/api/auth/kakao/callback";
const MAX_DESCRIPTION_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct KakaoEndpoints {
    pub authorize: String,
    pub token: String,
    pub user_info: String,
}

impl Default for KakaoEndpoints {
    fn default() -> Self {
        Self {
            authorize: "https://kauth.kakao.com/oauth/authorize".to_string(),
            token: "https://kauth.kakao.com/oauth/token".to_string(),
            user_info: "https://kapi.kakao.com/v2/user/me".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum KakaoError {
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("User info request failed: {0}")]
    UserInfo(String),
}

impl KakaoError {
    /// Error code carried back to the login page.
    pub fn code(&self) -> &'static str {
        match self {
            KakaoError::TokenExchange(_) => "token_exchange_failed",
            KakaoError::UserInfo(_) => "user_info_failed",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            KakaoError::TokenExchange(desc) | KakaoError::UserInfo(desc) => desc,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KakaoToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct KakaoErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KakaoProfile {
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
    pub thumbnail_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KakaoAccount {
    pub email: Option<String>,
    pub profile: Option<KakaoProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KakaoProperties {
    pub nickname: Option<String>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KakaoUser {
    pub id: i64,
    #[serde(default)]
    pub kakao_account: Option<KakaoAccount>,
    #[serde(default)]
    pub properties: Option<KakaoProperties>,
}

impl KakaoUser {
    pub fn email(&self) -> Option<&str> {
        self.kakao_account.as_ref()?.email.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        let from_profile = self
            .kakao_account
            .as_ref()
            .and_then(|a| a.profile.as_ref())
            .and_then(|p| p.nickname.as_deref());
        from_profile.or_else(|| self.properties.as_ref()?.nickname.as_deref())
    }

    pub fn photo_url(&self) -> Option<&str> {
        let from_profile = self
            .kakao_account
            .as_ref()
            .and_then(|a| a.profile.as_ref())
            .and_then(|p| p.profile_image_url.as_deref().or(p.thumbnail_image_url.as_deref()));
        from_profile.or_else(|| self.properties.as_ref()?.profile_image.as_deref())
    }
}

pub struct KakaoClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: Option<Secret<String>>,
    redirect_uri: Option<String>,
    endpoints: KakaoEndpoints,
}

impl KakaoClient {
    pub fn new(config: &KakaoConfig, endpoints: KakaoEndpoints) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            endpoints,
        })
    }

    /// Configured redirect URI, or one derived from the forwarded scheme and
    /// host of the incoming request.
    pub fn redirect_uri(&self, headers: &HeaderMap) -> String {
        if let Some(uri) = &self.redirect_uri {
            return uri.clone();
        }

        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let scheme = header("x-forwarded-proto").unwrap_or_else(|| "http".to_string());
        let host = header("x-forwarded-host")
            .or_else(|| header("host"))
            .unwrap_or_else(|| "localhost".to_string());

        format!("{}://{}{}", scheme, host, CALLBACK_PATH)
    }

    pub fn authorize_url(&self, redirect_uri: &str, state: &str, switch_account: bool) -> String {
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&state={}",
            self.endpoints.authorize,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
        );
        if switch_account {
            url.push_str("&prompt=select_account");
        }
        url
    }

    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<KakaoToken, KakaoError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("code", code),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose_secret().as_str()));
        }

        let response = self
            .http
            .post(&self.endpoints.token)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Kakao token endpoint unreachable");
                KakaoError::TokenExchange("Token endpoint unreachable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %raw, "Kakao token exchange error");
            return Err(KakaoError::TokenExchange(describe_failure(&raw)));
        }

        response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Kakao token response");
            KakaoError::TokenExchange("Malformed token response".to_string())
        })
    }

    pub async fn fetch_user(&self, access_token: &str) -> Result<KakaoUser, KakaoError> {
        let response = self
            .http
            .get(&self.endpoints.user_info)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Kakao user endpoint unreachable");
                KakaoError::UserInfo("User endpoint unreachable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %raw, "Kakao user info error");
            return Err(KakaoError::UserInfo(truncate(&raw)));
        }

        response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Kakao user info");
            KakaoError::UserInfo("Malformed user response".to_string())
        })
    }
}

/// Provider description of a failed call: `error_description`, else
/// `error`, else the raw body cut to a safe length.
fn describe_failure(raw: &str) -> String {
    match serde_json::from_str::<KakaoErrorBody>(raw) {
        Ok(KakaoErrorBody {
            error_description: Some(desc),
            ..
        }) => truncate(&desc),
        Ok(KakaoErrorBody {
            error: Some(error), ..
        }) => truncate(&error),
        _ => truncate(raw),
    }
}

fn truncate(raw: &str) -> String {
    raw.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn client(redirect_uri: Option<&str>) -> KakaoClient {
        KakaoClient::new(
            &KakaoConfig {
                client_id: "kakao-client".to_string(),
                client_secret: None,
                redirect_uri: redirect_uri.map(str::to_string),
                webhook_audience: None,
            },
            KakaoEndpoints::default(),
        )
        .unwrap()
    }

    #[test]
    fn redirect_uri_falls_back_to_forwarded_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers.insert("host", HeaderValue::from_static("gonggu.example.com"));

        assert_eq!(
            client(None).redirect_uri(&headers),
            "https://gonggu.example.com/api/auth/kakao/callback"
        );
        assert_eq!(
            client(Some("https://fixed/cb")).redirect_uri(&headers),
            "https://fixed/cb"
        );
    }

    #[test]
    fn switch_account_adds_prompt() {
        let kakao = client(None);
        let url = kakao.authorize_url("http://localhost/cb", "s1", true);
        assert!(url.starts_with("https://kauth.kakao.com/oauth/authorize?client_id=kakao-client"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%2Fcb"));
        assert!(url.ends_with("&prompt=select_account"));
        assert!(!kakao.authorize_url("http://localhost/cb", "s1", false).contains("prompt"));
    }

    #[test]
    fn failure_description_prefers_provider_fields() {
        assert_eq!(
            describe_failure(r#"{"error":"invalid_grant","error_description":"authorization code not found"}"#),
            "authorization code not found"
        );
        assert_eq!(describe_failure(r#"{"error":"invalid_client"}"#), "invalid_client");
        assert_eq!(describe_failure(&"x".repeat(500)).len(), 200);
    }

    #[test]
    fn user_fields_fall_back_to_properties() {
        let user: KakaoUser = serde_json::from_value(serde_json::json!({
            "id": 42,
            "properties": { "nickname": "민지", "profile_image": "https://img/p.jpg" }
        }))
        .unwrap();

        assert_eq!(user.display_name(), Some("민지"));
        assert_eq!(user.photo_url(), Some("https://img/p.jpg"));
        assert_eq!(user.email(), None);
    }
}
