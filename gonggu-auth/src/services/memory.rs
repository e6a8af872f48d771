//! In-process backend used by tests and local runs without Firebase.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{NewUser, Profile, ProfileUpdate, UserRecord, UserUpdate, VerifiedToken};
use crate::services::backend::{AuthBackend, NicknameClaim};
use crate::services::error::AuthError;

const ID_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Clone)]
struct IssuedToken {
    uid: String,
    auth_time: i64,
}

#[derive(Debug, Clone)]
struct StoredSession {
    uid: String,
    auth_time: i64,
    expires_at: i64,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, UserRecord>,
    profiles: HashMap<String, Profile>,
    nicknames: HashMap<String, String>,
    id_tokens: HashMap<String, IssuedToken>,
    sessions: HashMap<String, StoredSession>,
    counter: u64,
    profile_writes: usize,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{}-{}", prefix, self.counter)
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, AuthError> {
        self.state
            .lock()
            .map_err(|e| AuthError::Backend(anyhow::anyhow!("Memory backend mutex poisoned: {}", e)))
    }

    /// Issue an ID token the backend will accept for `uid`.
    pub fn issue_id_token(&self, uid: &str) -> Result<String, AuthError> {
        let mut state = self.lock()?;
        let valid_after = state
            .users
            .get(uid)
            .and_then(|u| u.tokens_valid_after)
            .unwrap_or(0);
        let token = state.next_id("id-token");
        state.id_tokens.insert(
            token.clone(),
            IssuedToken {
                uid: uid.to_string(),
                auth_time: Utc::now().timestamp().max(valid_after),
            },
        );
        Ok(token)
    }

    pub fn insert_user(&self, user: UserRecord) -> Result<(), AuthError> {
        self.lock()?.users.insert(user.uid.clone(), user);
        Ok(())
    }

    pub fn insert_profile(&self, profile: Profile) -> Result<(), AuthError> {
        let mut state = self.lock()?;
        if let Some(nickname) = &profile.nickname {
            state.nicknames.insert(nickname.clone(), profile.uid.clone());
        }
        state.profiles.insert(profile.uid.clone(), profile);
        Ok(())
    }

    pub fn profile(&self, uid: &str) -> Option<Profile> {
        self.state.lock().ok()?.profiles.get(uid).cloned()
    }

    pub fn user(&self, uid: &str) -> Option<UserRecord> {
        self.state.lock().ok()?.users.get(uid).cloned()
    }

    /// Number of profile writes performed so far.
    pub fn profile_writes(&self) -> usize {
        self.state.lock().map(|s| s.profile_writes).unwrap_or(0)
    }

    /// Revoke every session and token issued to `uid` up to now.
    pub fn revoke_sessions(&self, uid: &str) -> Result<(), AuthError> {
        let mut state = self.lock()?;
        let user = state
            .users
            .get_mut(uid)
            .ok_or_else(|| AuthError::NotFound(format!("No user {}", uid)))?;
        user.tokens_valid_after = Some(Utc::now().timestamp() + 1);
        Ok(())
    }

    pub fn disable_user(&self, uid: &str) -> Result<(), AuthError> {
        let mut state = self.lock()?;
        let user = state
            .users
            .get_mut(uid)
            .ok_or_else(|| AuthError::NotFound(format!("No user {}", uid)))?;
        user.disabled = true;
        Ok(())
    }

    pub fn expire_session(&self, cookie: &str) -> Result<(), AuthError> {
        let mut state = self.lock()?;
        if let Some(session) = state.sessions.get_mut(cookie) {
            session.expires_at = 0;
        }
        Ok(())
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedToken, AuthError> {
        let state = self.lock()?;
        let issued = state
            .id_tokens
            .get(id_token)
            .ok_or_else(|| AuthError::InvalidToken("Unknown ID token".to_string()))?;

        let expires_at = issued.auth_time + ID_TOKEN_LIFETIME_SECS;
        if expires_at <= Utc::now().timestamp() {
            return Err(AuthError::InvalidToken("ID token expired".to_string()));
        }

        Ok(VerifiedToken {
            uid: issued.uid.clone(),
            email: state.users.get(&issued.uid).and_then(|u| u.email.clone()),
            auth_time: issued.auth_time,
            expires_at,
        })
    }

    async fn verify_session(
        &self,
        cookie: &str,
        check_revoked: bool,
    ) -> Result<VerifiedToken, AuthError> {
        let state = self.lock()?;
        let session = state
            .sessions
            .get(cookie)
            .ok_or_else(|| AuthError::Unauthenticated("Unknown session".to_string()))?;

        if session.expires_at <= Utc::now().timestamp() {
            return Err(AuthError::Unauthenticated("Session expired".to_string()));
        }

        let user = state.users.get(&session.uid);
        if check_revoked {
            let user = user.ok_or_else(|| AuthError::Unauthenticated("Account missing".to_string()))?;
            if user.disabled {
                return Err(AuthError::Unauthenticated("Account disabled".to_string()));
            }
            if user.tokens_valid_after.is_some_and(|t| session.auth_time < t) {
                return Err(AuthError::Unauthenticated("Session revoked".to_string()));
            }
        }

        Ok(VerifiedToken {
            uid: session.uid.clone(),
            email: user.and_then(|u| u.email.clone()),
            auth_time: session.auth_time,
            expires_at: session.expires_at,
        })
    }

    async fn mint_session(
        &self,
        id_token: &str,
        expires_in: chrono::Duration,
    ) -> Result<String, AuthError> {
        let verified = self.verify_id_token(id_token).await?;

        let mut state = self.lock()?;
        let cookie = state.next_id("session");
        state.sessions.insert(
            cookie.clone(),
            StoredSession {
                uid: verified.uid,
                auth_time: verified.auth_time,
                expires_at: Utc::now().timestamp() + expires_in.num_seconds(),
            },
        );
        Ok(cookie)
    }

    async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.lock()?.users.get(uid).cloned())
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserRecord, AuthError> {
        let mut state = self.lock()?;
        if state.users.contains_key(&user.uid) {
            return Err(AuthError::Conflict(format!("User {} already exists", user.uid)));
        }

        let record = UserRecord {
            uid: user.uid.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            photo_url: user.photo_url.clone(),
            disabled: false,
            tokens_valid_after: None,
        };
        state.users.insert(record.uid.clone(), record.clone());
        Ok(record)
    }

    async fn update_user(&self, uid: &str, update: &UserUpdate) -> Result<(), AuthError> {
        let mut state = self.lock()?;
        let user = state
            .users
            .get_mut(uid)
            .ok_or_else(|| AuthError::NotFound(format!("No user {}", uid)))?;

        if let Some(email) = &update.email {
            user.email = Some(email.clone());
        }
        if let Some(display_name) = &update.display_name {
            user.display_name = Some(display_name.clone());
        }
        if let Some(photo_url) = &update.photo_url {
            user.photo_url = Some(photo_url.clone());
        }
        Ok(())
    }

    async fn create_custom_token(&self, uid: &str) -> Result<String, AuthError> {
        Ok(format!("custom-token:{}", uid))
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<Profile>, AuthError> {
        Ok(self.lock()?.profiles.get(uid).cloned())
    }

    async fn create_profile(&self, profile: &Profile) -> Result<Profile, AuthError> {
        let mut state = self.lock()?;
        if let Some(existing) = state.profiles.get(&profile.uid) {
            return Ok(existing.clone());
        }
        state.profile_writes += 1;
        state.profiles.insert(profile.uid.clone(), profile.clone());
        Ok(profile.clone())
    }

    async fn update_profile(
        &self,
        uid: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, AuthError> {
        let mut state = self.lock()?;
        let Some(profile) = state.profiles.get_mut(uid) else {
            return Ok(None);
        };
        update.apply_to(profile, Utc::now());
        let updated = profile.clone();
        state.profile_writes += 1;
        Ok(Some(updated))
    }

    async fn claim_nickname(&self, uid: &str, nickname: &str) -> Result<NicknameClaim, AuthError> {
        let mut state = self.lock()?;
        if !state.profiles.contains_key(uid) {
            return Err(AuthError::NotFound(format!("No profile for {}", uid)));
        }
        if state.nicknames.get(nickname).is_some_and(|owner| owner != uid) {
            return Ok(NicknameClaim::Unavailable);
        }

        let previous = state
            .profiles
            .get_mut(uid)
            .and_then(|p| {
                p.updated_at = Utc::now();
                p.nickname.replace(nickname.to_string())
            });
        if let Some(previous) = previous.filter(|p| p != nickname) {
            state.nicknames.remove(&previous);
        }
        state.nicknames.insert(nickname.to_string(), uid.to_string());
        state.profile_writes += 1;
        Ok(NicknameClaim::Claimed)
    }

    async fn nickname_owner(&self, nickname: &str) -> Result<Option<String>, AuthError> {
        Ok(self.lock()?.nicknames.get(nickname).cloned())
    }

    async fn health_check(&self) -> Result<(), AuthError> {
        self.lock().map(|_| ())
    }
}
