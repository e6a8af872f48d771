//! Profile model - one document per identity in the profile store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Role;

/// Account lifecycle state reported by the Kakao security-event webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Enabled,
    Disabled,
    Deleted,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Enabled => "enabled",
            AccountStatus::Disabled => "disabled",
            AccountStatus::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(AccountStatus::Enabled),
            "disabled" => Ok(AccountStatus::Disabled),
            "deleted" => Ok(AccountStatus::Deleted),
            _ => Err(format!("Invalid account status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub nickname: Option<String>,
    pub role: Role,
    pub user_terms_agreed: bool,
    pub organizer_terms_agreed: bool,
    pub account_status: Option<AccountStatus>,
    pub account_status_updated_at: Option<DateTime<Utc>>,
    pub identifier_changed_at: Option<DateTime<Utc>>,
    pub provider: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Minimal profile for a first sign-in: role `user`, no nickname, no terms.
    pub fn new(
        uid: impl Into<String>,
        email: Option<String>,
        display_name: Option<String>,
        photo_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            uid: uid.into(),
            email,
            display_name,
            photo_url,
            nickname: None,
            role: Role::User,
            user_terms_agreed: false,
            organizer_terms_agreed: false,
            account_status: None,
            account_status_updated_at: None,
            identifier_changed_at: None,
            provider: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Absent status means the account was never reported otherwise.
    pub fn is_enabled(&self) -> bool {
        matches!(self.account_status, None | Some(AccountStatus::Enabled))
    }
}

/// Field-scoped profile update. Only fields set to `Some` are written;
/// nickname changes go through the nickname reservation instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    /// Drop the stored email. Ignored when `email` is set.
    pub clear_email: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub role: Option<Role>,
    pub user_terms_agreed: Option<bool>,
    pub organizer_terms_agreed: Option<bool>,
    pub account_status: Option<AccountStatus>,
    pub account_status_updated_at: Option<DateTime<Utc>>,
    pub identifier_changed_at: Option<DateTime<Utc>>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ProfileUpdate::default()
    }

    /// Identity metadata changes between the stored profile and fresh
    /// provider data. Missing provider values never clear stored ones.
    pub fn identity_metadata(
        profile: &Profile,
        email: Option<&str>,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Self {
        fn changed(current: Option<&String>, incoming: Option<&str>) -> Option<String> {
            match incoming {
                Some(value) if current.map(String::as_str) != Some(value) => {
                    Some(value.to_string())
                }
                _ => None,
            }
        }

        Self {
            email: changed(profile.email.as_ref(), email),
            display_name: changed(profile.display_name.as_ref(), display_name),
            photo_url: changed(profile.photo_url.as_ref(), photo_url),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, profile: &mut Profile, now: DateTime<Utc>) {
        if let Some(email) = &self.email {
            profile.email = Some(email.clone());
        } else if self.clear_email {
            profile.email = None;
        }
        if let Some(display_name) = &self.display_name {
            profile.display_name = Some(display_name.clone());
        }
        if let Some(photo_url) = &self.photo_url {
            profile.photo_url = Some(photo_url.clone());
        }
        if let Some(role) = self.role {
            profile.role = role;
        }
        if let Some(agreed) = self.user_terms_agreed {
            profile.user_terms_agreed = agreed;
        }
        if let Some(agreed) = self.organizer_terms_agreed {
            profile.organizer_terms_agreed = agreed;
        }
        if let Some(status) = self.account_status {
            profile.account_status = Some(status);
        }
        if let Some(at) = self.account_status_updated_at {
            profile.account_status_updated_at = Some(at);
        }
        if let Some(at) = self.identifier_changed_at {
            profile.identifier_changed_at = Some(at);
        }
        profile.updated_at = now;
    }
}
