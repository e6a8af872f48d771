//! Identities held by the credential store.

use serde::Serialize;

/// Prefix of identities derived from a Kakao user id.
pub const KAKAO_UID_PREFIX: &str = "kakao:";

/// Local identity for a Kakao user. Deterministic, so repeated logins and
/// webhook deliveries resolve to the same uid without a mapping table.
pub fn kakao_uid(kakao_id: &str) -> String {
    format!("{}{}", KAKAO_UID_PREFIX, kakao_id.trim())
}

/// Account as seen by the credential store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub disabled: bool,
    /// Sessions and tokens issued before this unix time are revoked.
    pub tokens_valid_after: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Changed credential-store fields. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.display_name.is_none() && self.photo_url.is_none()
    }

    /// Fields where `incoming` carries a value different from `existing`.
    pub fn diff(existing: &UserRecord, incoming: &NewUser) -> Self {
        fn changed(current: &Option<String>, incoming: &Option<String>) -> Option<String> {
            match incoming {
                Some(value) if current.as_ref() != Some(value) => Some(value.clone()),
                _ => None,
            }
        }

        Self {
            email: changed(&existing.email, &incoming.email),
            display_name: changed(&existing.display_name, &incoming.display_name),
            photo_url: changed(&existing.photo_url, &incoming.photo_url),
        }
    }
}

/// Claims extracted from a verified ID token or session cookie.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedToken {
    pub uid: String,
    pub email: Option<String>,
    pub auth_time: i64,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kakao_uid_is_deterministic() {
        assert_eq!(kakao_uid("12345"), "kakao:12345");
        assert_eq!(kakao_uid("12345"), kakao_uid(" 12345 "));
    }

    #[test]
    fn diff_ignores_missing_and_unchanged_fields() {
        let existing = UserRecord {
            uid: "kakao:1".to_string(),
            email: Some("a@example.com".to_string()),
            display_name: Some("Kim".to_string()),
            photo_url: Some("https://img/1".to_string()),
            disabled: false,
            tokens_valid_after: None,
        };
        let incoming = NewUser {
            uid: "kakao:1".to_string(),
            email: None,
            display_name: Some("Kim".to_string()),
            photo_url: Some("https://img/2".to_string()),
        };

        let update = UserUpdate::diff(&existing, &incoming);
        assert_eq!(update.email, None);
        assert_eq!(update.display_name, None);
        assert_eq!(update.photo_url.as_deref(), Some("https://img/2"));
        assert!(!update.is_empty());
    }
}
