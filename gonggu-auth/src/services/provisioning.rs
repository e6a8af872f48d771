//! Keeps credential-store accounts and profiles in step with an identity.

use crate::models::{NewUser, Profile, ProfileUpdate, UserUpdate};
use crate::services::backend::AuthBackend;
use crate::services::error::AuthError;

pub const KAKAO_PROVIDER: &str = "kakao";
pub const KAKAO_DISPLAY_NAME_PLACEHOLDER: &str = "카카오 사용자";

/// Identity asserted by an external provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalIdentity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub provider: &'static str,
}

/// Upsert the account and the profile for `identity`.
///
/// Existing records only receive the identity fields that actually changed;
/// nickname, role, and terms flags on the profile are never touched.
pub async fn link_external_identity(
    backend: &dyn AuthBackend,
    identity: &ExternalIdentity,
) -> Result<Profile, AuthError> {
    let incoming = NewUser {
        uid: identity.uid.clone(),
        email: identity.email.clone(),
        display_name: identity.display_name.clone(),
        photo_url: identity.photo_url.clone(),
    };

    match backend.get_user(&identity.uid).await? {
        Some(existing) => {
            let update = UserUpdate::diff(&existing, &incoming);
            if !update.is_empty() {
                backend.update_user(&identity.uid, &update).await?;
                tracing::debug!(uid = %identity.uid, "Account identity fields refreshed");
            }
        }
        None => {
            let new_user = NewUser {
                display_name: incoming
                    .display_name
                    .clone()
                    .or_else(|| Some(KAKAO_DISPLAY_NAME_PLACEHOLDER.to_string())),
                ..incoming
            };
            match backend.create_user(&new_user).await {
                Ok(_) => tracing::info!(uid = %identity.uid, provider = identity.provider, "Account created"),
                // Concurrent first login for the same identity.
                Err(AuthError::Conflict(_)) => {
                    tracing::debug!(uid = %identity.uid, "Account created concurrently");
                }
                Err(e) => return Err(e),
            }
        }
    }

    match backend.get_profile(&identity.uid).await? {
        Some(profile) => {
            let update = ProfileUpdate::identity_metadata(
                &profile,
                identity.email.as_deref(),
                identity.display_name.as_deref(),
                identity.photo_url.as_deref(),
            );
            if update.is_empty() {
                return Ok(profile);
            }
            Ok(backend
                .update_profile(&identity.uid, &update)
                .await?
                .unwrap_or(profile))
        }
        None => {
            let profile = Profile::new(
                identity.uid.clone(),
                identity.email.clone(),
                identity
                    .display_name
                    .clone()
                    .or_else(|| Some(KAKAO_DISPLAY_NAME_PLACEHOLDER.to_string())),
                identity.photo_url.clone(),
            )
            .with_provider(identity.provider);
            backend.create_profile(&profile).await
        }
    }
}

/// Profile for `uid`, created from the credential-store account on first
/// use. Existing profiles are returned unchanged.
pub async fn ensure_profile(backend: &dyn AuthBackend, uid: &str) -> Result<Profile, AuthError> {
    if let Some(profile) = backend.get_profile(uid).await? {
        return Ok(profile);
    }

    let user = backend
        .get_user(uid)
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("No account for {}", uid)))?;

    let profile = Profile::new(uid, user.email, user.display_name, user.photo_url);
    let stored = backend.create_profile(&profile).await?;
    tracing::info!(uid = %uid, "Profile provisioned");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{kakao_uid, Role};
    use crate::services::memory::MemoryBackend;

    fn identity(display_name: Option<&str>) -> ExternalIdentity {
        ExternalIdentity {
            uid: kakao_uid("77"),
            email: Some("minji@example.com".to_string()),
            display_name: display_name.map(str::to_string),
            photo_url: None,
            provider: KAKAO_PROVIDER,
        }
    }

    #[tokio::test]
    async fn first_login_creates_account_and_profile() {
        let backend = MemoryBackend::new();
        let profile = link_external_identity(&backend, &identity(None)).await.unwrap();

        assert_eq!(profile.role, Role::User);
        assert_eq!(profile.provider.as_deref(), Some("kakao"));
        assert_eq!(
            backend.user("kakao:77").unwrap().display_name.as_deref(),
            Some(KAKAO_DISPLAY_NAME_PLACEHOLDER)
        );
    }

    #[tokio::test]
    async fn relogin_keeps_nickname_and_role() {
        let backend = MemoryBackend::new();
        link_external_identity(&backend, &identity(Some("Minji"))).await.unwrap();
        backend.claim_nickname("kakao:77", "minji").await.unwrap();
        backend
            .update_profile("kakao:77", &ProfileUpdate { role: Some(Role::Organizer), ..Default::default() })
            .await
            .unwrap();

        let profile = link_external_identity(&backend, &identity(Some("Minji Kim")))
            .await
            .unwrap();

        assert_eq!(profile.display_name.as_deref(), Some("Minji Kim"));
        assert_eq!(profile.nickname.as_deref(), Some("minji"));
        assert_eq!(profile.role, Role::Organizer);
    }

    #[tokio::test]
    async fn unchanged_identity_writes_nothing() {
        let backend = MemoryBackend::new();
        link_external_identity(&backend, &identity(Some("Minji"))).await.unwrap();
        let writes = backend.profile_writes();

        link_external_identity(&backend, &identity(Some("Minji"))).await.unwrap();
        assert_eq!(backend.profile_writes(), writes);
    }

    #[tokio::test]
    async fn ensure_profile_is_idempotent() {
        let backend = MemoryBackend::new();
        backend
            .create_user(&NewUser { uid: "u1".to_string(), ..Default::default() })
            .await
            .unwrap();

        let first = ensure_profile(&backend, "u1").await.unwrap();
        let second = ensure_profile(&backend, "u1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.profile_writes(), 1);
    }
}
