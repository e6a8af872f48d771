use async_trait::async_trait;

use crate::models::{NewUser, Profile, ProfileUpdate, UserRecord, UserUpdate, VerifiedToken};
use crate::services::error::AuthError;

/// Outcome of a nickname reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicknameClaim {
    Claimed,
    Unavailable,
}

/// Credential store and profile store capabilities.
///
/// Constructed once at startup and shared behind `Arc<dyn AuthBackend>`.
/// Verification failures are reported as `Unauthenticated` or `InvalidToken`;
/// store outages as `UpstreamFailure` or `Backend`.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Verify a client ID token (signature, issuer, audience, expiry).
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedToken, AuthError>;

    /// Verify a session cookie. With `check_revoked`, sessions of disabled,
    /// missing, or revoked accounts are rejected too.
    async fn verify_session(
        &self,
        cookie: &str,
        check_revoked: bool,
    ) -> Result<VerifiedToken, AuthError>;

    /// Exchange a verified ID token for a session cookie value.
    async fn mint_session(
        &self,
        id_token: &str,
        expires_in: chrono::Duration,
    ) -> Result<String, AuthError>;

    async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>, AuthError>;

    async fn create_user(&self, user: &NewUser) -> Result<UserRecord, AuthError>;

    async fn update_user(&self, uid: &str, update: &UserUpdate) -> Result<(), AuthError>;

    /// Token the client SDK signs in with.
    async fn create_custom_token(&self, uid: &str) -> Result<String, AuthError>;

    async fn get_profile(&self, uid: &str) -> Result<Option<Profile>, AuthError>;

    /// Create the profile unless one exists; returns the stored profile.
    async fn create_profile(&self, profile: &Profile) -> Result<Profile, AuthError>;

    /// Field-scoped update of an existing profile. `None` when the profile
    /// does not exist, in which case nothing is written.
    async fn update_profile(
        &self,
        uid: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, AuthError>;

    /// Atomically reserve `nickname` for `uid` and set it on the profile,
    /// releasing the previous reservation.
    async fn claim_nickname(&self, uid: &str, nickname: &str) -> Result<NicknameClaim, AuthError>;

    async fn nickname_owner(&self, nickname: &str) -> Result<Option<String>, AuthError>;

    async fn health_check(&self) -> Result<(), AuthError>;
}
