//! Firebase Authentication and Firestore over their REST APIs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::config::FirebaseConfig;
use crate::models::{NewUser, Profile, ProfileUpdate, UserRecord, UserUpdate, VerifiedToken};
use crate::services::backend::{AuthBackend, NicknameClaim};
use crate::services::error::AuthError;
use crate::services::firestore::{self, NICKNAMES_COLLECTION, USERS_COLLECTION};
use crate::services::keys::{KeySetCache, KeySetFormat};

const GOOGLE_KEYS_TTL: Duration = Duration::from_secs(60 * 60);
const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";
const SERVICE_ACCOUNT_SCOPES: &str = "https://www.googleapis.com/auth/cloud-platform \
     https://www.googleapis.com/auth/datastore \
     https://www.googleapis.com/auth/identitytoolkit \
     https://www.googleapis.com/auth/userinfo.email";
/// Refresh the service-account token this long before it expires.
const ACCESS_TOKEN_MARGIN_SECS: i64 = 60;

/// Base URLs of every Google endpoint the backend talks to.
#[derive(Debug, Clone)]
pub struct FirebaseEndpoints {
    pub identity_toolkit: String,
    pub firestore: String,
    pub oauth_token: String,
    pub id_token_keys: String,
    pub session_keys: String,
}

impl Default for FirebaseEndpoints {
    fn default() -> Self {
        Self {
            identity_toolkit: "https://identitytoolkit.googleapis.com".to_string(),
            firestore: "https://firestore.googleapis.com".to_string(),
            oauth_token: "https://oauth2.googleapis.com/token".to_string(),
            id_token_keys:
                "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com"
                    .to_string(),
            session_keys: "https://www.googleapis.com/identitytoolkit/v3/relyingparty/publicKeys"
                .to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ServiceAccountClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Serialize)]
struct CustomTokenClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    uid: &'a str,
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    exp: i64,
    #[serde(default)]
    auth_time: Option<i64>,
    #[serde(default)]
    iat: i64,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_in: i64,
}

struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    #[serde(default)]
    disabled: bool,
    valid_since: Option<String>,
}

impl From<AccountInfo> for UserRecord {
    fn from(info: AccountInfo) -> Self {
        UserRecord {
            uid: info.local_id,
            email: info.email,
            display_name: info.display_name,
            photo_url: info.photo_url,
            disabled: info.disabled,
            tokens_valid_after: info.valid_since.and_then(|s| s.parse().ok()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountWrite<'a> {
    local_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionCookieResponse {
    session_cookie: String,
}

pub struct FirebaseBackend {
    http: reqwest::Client,
    project_id: String,
    client_email: String,
    signing_key: EncodingKey,
    endpoints: FirebaseEndpoints,
    id_token_keys: KeySetCache,
    session_keys: KeySetCache,
    access_token: Mutex<Option<AccessToken>>,
}

impl FirebaseBackend {
    pub fn new(config: &FirebaseConfig, endpoints: FirebaseEndpoints) -> Result<Self, anyhow::Error> {
        let signing_key = EncodingKey::from_rsa_pem(config.private_key.expose_secret().as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse FIREBASE_PRIVATE_KEY: {}", e))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        tracing::info!(project_id = %config.project_id, "Firebase backend initialized");

        Ok(Self {
            id_token_keys: KeySetCache::new(
                http.clone(),
                endpoints.id_token_keys.clone(),
                KeySetFormat::X509,
                GOOGLE_KEYS_TTL,
            ),
            session_keys: KeySetCache::new(
                http.clone(),
                endpoints.session_keys.clone(),
                KeySetFormat::X509,
                GOOGLE_KEYS_TTL,
            ),
            http,
            project_id: config.project_id.clone(),
            client_email: config.client_email.clone(),
            signing_key,
            endpoints,
            access_token: Mutex::new(None),
        })
    }

    fn accounts_url(&self, action: &str) -> String {
        format!(
            "{}/v1/projects/{}/accounts{}",
            self.endpoints.identity_toolkit, self.project_id, action
        )
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents",
            self.endpoints.firestore, self.project_id
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_url(), collection, urlencoding::encode(id))
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!(
            "projects/{}/databases/(default)/documents/{}/{}",
            self.project_id, collection, id
        )
    }

    /// OAuth access token for the service account, cached until shortly
    /// before expiry.
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - chrono::Duration::seconds(ACCESS_TOKEN_MARGIN_SECS) > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = ServiceAccountClaims {
            iss: &self.client_email,
            scope: SERVICE_ACCOUNT_SCOPES,
            aud: &self.endpoints.oauth_token,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| anyhow::anyhow!("Failed to sign service account assertion: {}", e))?;

        let response = self
            .http
            .post(&self.endpoints.oauth_token)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Token endpoint unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(upstream_error("Service account token exchange", response).await);
        }

        let body: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Invalid token response: {}", e)))?;

        let value = body.access_token.clone();
        *cached = Some(AccessToken {
            value: body.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(body.expires_in),
        });

        Ok(value)
    }

    async fn verify_firebase_jwt(
        &self,
        token: &str,
        keys: &KeySetCache,
        issuer: &str,
    ) -> Result<VerifiedToken, String> {
        let header = decode_header(token).map_err(|e| format!("Malformed token: {}", e))?;
        if header.alg != Algorithm::RS256 {
            return Err(format!("Unexpected algorithm {:?}", header.alg));
        }
        let kid = header.kid.ok_or_else(|| "Token has no kid".to_string())?;

        let key = keys
            .get(&kid)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url = %keys.url(), "Failed to load verification keys");
                "Verification keys unavailable".to_string()
            })?
            .ok_or_else(|| format!("Unknown signing key {}", kid))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[&self.project_id]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let data = decode::<FirebaseClaims>(token, &key, &validation)
            .map_err(|e| format!("Token rejected: {}", e))?;
        let claims = data.claims;

        if claims.sub.is_empty() || claims.sub.len() > 128 {
            return Err("Token subject is invalid".to_string());
        }

        Ok(VerifiedToken {
            auth_time: claims.auth_time.unwrap_or(claims.iat),
            uid: claims.sub,
            email: claims.email,
            expires_at: claims.exp,
        })
    }

    async fn lookup_account(&self, uid: &str) -> Result<Option<UserRecord>, AuthError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.accounts_url(":lookup"))
            .bearer_auth(token)
            .json(&json!({ "localId": [uid] }))
            .send()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Account lookup failed: {}", e)))?;

        if !response.status().is_success() {
            let err = upstream_error("Account lookup", response).await;
            // Unknown uids come back as USER_NOT_FOUND on some project setups.
            if err.to_string().contains("USER_NOT_FOUND") {
                return Ok(None);
            }
            return Err(err);
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Invalid lookup response: {}", e)))?;

        Ok(body.users.into_iter().next().map(UserRecord::from))
    }

    async fn commit(&self, writes: Vec<Value>) -> Result<reqwest::Response, AuthError> {
        let token = self.access_token().await?;
        self.http
            .post(format!("{}:commit", self.documents_url()))
            .bearer_auth(token)
            .json(&json!({ "writes": writes }))
            .send()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Firestore commit failed: {}", e)))
    }
}

async fn upstream_error(context: &str, response: reqwest::Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, body = %body, "{} failed", context);
    AuthError::UpstreamFailure(format!("{} returned {}: {}", context, status, body))
}

#[async_trait]
impl AuthBackend for FirebaseBackend {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedToken, AuthError> {
        let issuer = format!("https://securetoken.google.com/{}", self.project_id);
        self.verify_firebase_jwt(id_token, &self.id_token_keys, &issuer)
            .await
            .map_err(AuthError::InvalidToken)
    }

    async fn verify_session(
        &self,
        cookie: &str,
        check_revoked: bool,
    ) -> Result<VerifiedToken, AuthError> {
        let issuer = format!("https://session.firebase.google.com/{}", self.project_id);
        let verified = self
            .verify_firebase_jwt(cookie, &self.session_keys, &issuer)
            .await
            .map_err(AuthError::Unauthenticated)?;

        if check_revoked {
            let user = self
                .lookup_account(&verified.uid)
                .await?
                .ok_or_else(|| AuthError::Unauthenticated("Account no longer exists".to_string()))?;

            if user.disabled {
                return Err(AuthError::Unauthenticated("Account disabled".to_string()));
            }
            if user
                .tokens_valid_after
                .is_some_and(|valid_since| verified.auth_time < valid_since)
            {
                return Err(AuthError::Unauthenticated("Session revoked".to_string()));
            }
        }

        Ok(verified)
    }

    async fn mint_session(
        &self,
        id_token: &str,
        expires_in: chrono::Duration,
    ) -> Result<String, AuthError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/v1/projects/{}:createSessionCookie",
                self.endpoints.identity_toolkit, self.project_id
            ))
            .bearer_auth(token)
            .json(&json!({
                "idToken": id_token,
                "validDuration": expires_in.num_seconds().to_string(),
            }))
            .send()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Session cookie request failed: {}", e)))?;

        if !response.status().is_success() {
            let err = upstream_error("Session cookie creation", response).await;
            if err.to_string().contains("INVALID_ID_TOKEN") {
                return Err(AuthError::InvalidToken("ID token rejected".to_string()));
            }
            return Err(err);
        }

        let body: SessionCookieResponse = response
            .json()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Invalid session cookie response: {}", e)))?;

        Ok(body.session_cookie)
    }

    async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>, AuthError> {
        self.lookup_account(uid).await
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserRecord, AuthError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.accounts_url(""))
            .bearer_auth(token)
            .json(&AccountWrite {
                local_id: &user.uid,
                email: user.email.as_deref(),
                display_name: user.display_name.as_deref(),
                photo_url: user.photo_url.as_deref(),
            })
            .send()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Account creation failed: {}", e)))?;

        if !response.status().is_success() {
            let err = upstream_error("Account creation", response).await;
            if err.to_string().contains("DUPLICATE_LOCAL_ID") {
                return Err(AuthError::Conflict(format!("User {} already exists", user.uid)));
            }
            return Err(err);
        }

        Ok(UserRecord {
            uid: user.uid.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            photo_url: user.photo_url.clone(),
            disabled: false,
            tokens_valid_after: None,
        })
    }

    async fn update_user(&self, uid: &str, update: &UserUpdate) -> Result<(), AuthError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.accounts_url(":update"))
            .bearer_auth(token)
            .json(&AccountWrite {
                local_id: uid,
                email: update.email.as_deref(),
                display_name: update.display_name.as_deref(),
                photo_url: update.photo_url.as_deref(),
            })
            .send()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Account update failed: {}", e)))?;

        if !response.status().is_success() {
            let err = upstream_error("Account update", response).await;
            if err.to_string().contains("USER_NOT_FOUND") {
                return Err(AuthError::NotFound(format!("No user {}", uid)));
            }
            return Err(err);
        }

        Ok(())
    }

    async fn create_custom_token(&self, uid: &str) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = CustomTokenClaims {
            iss: &self.client_email,
            sub: &self.client_email,
            aud: CUSTOM_TOKEN_AUDIENCE,
            iat: now,
            exp: now + 3600,
            uid,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| AuthError::Backend(anyhow::anyhow!("Failed to sign custom token: {}", e)))
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<Profile>, AuthError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.document_url(USERS_COLLECTION, uid))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Profile read failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(upstream_error("Profile read", response).await);
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Invalid profile document: {}", e)))?;

        Ok(Some(firestore::decode_profile(&document)?))
    }

    async fn create_profile(&self, profile: &Profile) -> Result<Profile, AuthError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/{}", self.documents_url(), USERS_COLLECTION))
            .query(&[("documentId", profile.uid.as_str())])
            .bearer_auth(token)
            .json(&json!({ "fields": firestore::encode_profile(profile) }))
            .send()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Profile creation failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            tracing::debug!(uid = %profile.uid, "Profile already exists");
            return self.get_profile(&profile.uid).await?.ok_or_else(|| {
                AuthError::Backend(anyhow::anyhow!("Profile {} vanished after conflict", profile.uid))
            });
        }
        if !response.status().is_success() {
            return Err(upstream_error("Profile creation", response).await);
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Invalid profile document: {}", e)))?;

        Ok(firestore::decode_profile(&document)?)
    }

    async fn update_profile(
        &self,
        uid: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, AuthError> {
        let (fields, mask) = firestore::encode_update(update, Utc::now());
        let mut query: Vec<(&str, &str)> = mask
            .iter()
            .map(|path| ("updateMask.fieldPaths", path.as_str()))
            .collect();
        query.push(("currentDocument.exists", "true"));

        let token = self.access_token().await?;
        let response = self
            .http
            .patch(self.document_url(USERS_COLLECTION, uid))
            .query(&query)
            .bearer_auth(token)
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Profile update failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(upstream_error("Profile update", response).await);
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Invalid profile document: {}", e)))?;

        Ok(Some(firestore::decode_profile(&document)?))
    }

    async fn claim_nickname(&self, uid: &str, nickname: &str) -> Result<NicknameClaim, AuthError> {
        let profile = self
            .get_profile(uid)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("No profile for {}", uid)))?;

        let owner = self.nickname_owner(nickname).await?;
        match owner.as_deref() {
            Some(owner) if owner != uid => return Ok(NicknameClaim::Unavailable),
            Some(_) if profile.nickname.as_deref() == Some(nickname) => {
                return Ok(NicknameClaim::Claimed);
            }
            _ => {}
        }

        let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        let mut reservation = json!({
            "update": {
                "name": self.document_name(NICKNAMES_COLLECTION, nickname),
                "fields": { "uid": { "stringValue": uid } }
            }
        });
        if owner.is_none() {
            // Fails the whole commit if someone reserved it since the read.
            reservation["currentDocument"] = json!({ "exists": false });
        }

        let mut writes = vec![
            reservation,
            json!({
                "update": {
                    "name": self.document_name(USERS_COLLECTION, uid),
                    "fields": {
                        "nickname": { "stringValue": nickname },
                        "updatedAt": { "timestampValue": now }
                    }
                },
                "updateMask": { "fieldPaths": ["nickname", "updatedAt"] },
                "currentDocument": { "exists": true }
            }),
        ];
        if let Some(previous) = profile.nickname.as_deref().filter(|p| *p != nickname) {
            writes.push(json!({ "delete": self.document_name(NICKNAMES_COLLECTION, previous) }));
        }

        let response = self.commit(writes).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(NicknameClaim::Claimed);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AuthError::NotFound(format!("No profile for {}", uid)));
        }

        let err = upstream_error("Nickname reservation", response).await;
        if status == reqwest::StatusCode::CONFLICT || err.to_string().contains("FAILED_PRECONDITION") {
            tracing::info!(uid = %uid, nickname = %nickname, "Nickname reserved concurrently");
            return Ok(NicknameClaim::Unavailable);
        }
        Err(err)
    }

    async fn nickname_owner(&self, nickname: &str) -> Result<Option<String>, AuthError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.document_url(NICKNAMES_COLLECTION, nickname))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Nickname read failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(upstream_error("Nickname read", response).await);
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| AuthError::UpstreamFailure(format!("Invalid nickname document: {}", e)))?;

        Ok(firestore::decode_reservation(&document))
    }

    async fn health_check(&self) -> Result<(), AuthError> {
        self.access_token().await.map(|_| ())
    }
}
