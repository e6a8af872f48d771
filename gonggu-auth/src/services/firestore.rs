//! Firestore REST value codec for profile documents.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::models::{AccountStatus, Profile, ProfileUpdate, Role};

pub const USERS_COLLECTION: &str = "users";
pub const NICKNAMES_COLLECTION: &str = "nicknames";

fn string_value(value: Option<&str>) -> Value {
    match value {
        Some(s) => json!({ "stringValue": s }),
        None => json!({ "nullValue": null }),
    }
}

fn bool_value(value: bool) -> Value {
    json!({ "booleanValue": value })
}

fn timestamp_value(value: Option<DateTime<Utc>>) -> Value {
    match value {
        Some(at) => json!({ "timestampValue": at.to_rfc3339_opts(SecondsFormat::Micros, true) }),
        None => json!({ "nullValue": null }),
    }
}

pub fn encode_profile(profile: &Profile) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("uid".into(), string_value(Some(&profile.uid)));
    fields.insert("email".into(), string_value(profile.email.as_deref()));
    fields.insert("displayName".into(), string_value(profile.display_name.as_deref()));
    fields.insert("photoURL".into(), string_value(profile.photo_url.as_deref()));
    fields.insert("nickname".into(), string_value(profile.nickname.as_deref()));
    fields.insert("role".into(), string_value(Some(profile.role.as_str())));
    fields.insert("userTermsAgreed".into(), bool_value(profile.user_terms_agreed));
    fields.insert("organizerTermsAgreed".into(), bool_value(profile.organizer_terms_agreed));
    if let Some(status) = profile.account_status {
        fields.insert("accountStatus".into(), string_value(Some(status.as_str())));
    }
    if profile.account_status_updated_at.is_some() {
        fields.insert(
            "accountStatusUpdatedAt".into(),
            timestamp_value(profile.account_status_updated_at),
        );
    }
    if profile.identifier_changed_at.is_some() {
        fields.insert(
            "identifierChangedAt".into(),
            timestamp_value(profile.identifier_changed_at),
        );
    }
    if let Some(provider) = &profile.provider {
        fields.insert("provider".into(), string_value(Some(provider)));
    }
    fields.insert("createdAt".into(), timestamp_value(Some(profile.created_at)));
    fields.insert("updatedAt".into(), timestamp_value(Some(profile.updated_at)));
    fields
}

/// Fields and update mask for a field-scoped PATCH. `updatedAt` is always
/// part of the write.
pub fn encode_update(update: &ProfileUpdate, now: DateTime<Utc>) -> (Map<String, Value>, Vec<String>) {
    let mut fields = Map::new();

    if let Some(email) = &update.email {
        fields.insert("email".into(), string_value(Some(email)));
    } else if update.clear_email {
        fields.insert("email".into(), string_value(None));
    }
    if let Some(display_name) = &update.display_name {
        fields.insert("displayName".into(), string_value(Some(display_name)));
    }
    if let Some(photo_url) = &update.photo_url {
        fields.insert("photoURL".into(), string_value(Some(photo_url)));
    }
    if let Some(role) = update.role {
        fields.insert("role".into(), string_value(Some(role.as_str())));
    }
    if let Some(agreed) = update.user_terms_agreed {
        fields.insert("userTermsAgreed".into(), bool_value(agreed));
    }
    if let Some(agreed) = update.organizer_terms_agreed {
        fields.insert("organizerTermsAgreed".into(), bool_value(agreed));
    }
    if let Some(status) = update.account_status {
        fields.insert("accountStatus".into(), string_value(Some(status.as_str())));
    }
    if let Some(at) = update.account_status_updated_at {
        fields.insert("accountStatusUpdatedAt".into(), timestamp_value(Some(at)));
    }
    if let Some(at) = update.identifier_changed_at {
        fields.insert("identifierChangedAt".into(), timestamp_value(Some(at)));
    }
    fields.insert("updatedAt".into(), timestamp_value(Some(now)));

    let mask = fields.keys().cloned().collect();
    (fields, mask)
}

fn get_string(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)?
        .get("stringValue")?
        .as_str()
        .map(str::to_string)
}

fn get_bool(fields: &Map<String, Value>, name: &str) -> bool {
    fields
        .get(name)
        .and_then(|v| v.get("booleanValue"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn get_timestamp(fields: &Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
    let raw = fields.get(name)?.get("timestampValue")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Decode a Firestore document (`{name, fields, createTime, updateTime}`).
pub fn decode_profile(document: &Value) -> Result<Profile, anyhow::Error> {
    let empty = Map::new();
    let fields = document
        .get("fields")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let uid = get_string(fields, "uid")
        .or_else(|| {
            document
                .get("name")
                .and_then(Value::as_str)
                .and_then(|name| name.rsplit('/').next())
                .map(str::to_string)
        })
        .ok_or_else(|| anyhow::anyhow!("Profile document without uid"))?;

    let role = match get_string(fields, "role") {
        Some(raw) => raw.parse::<Role>().unwrap_or_else(|e| {
            tracing::warn!(uid = %uid, error = %e, "Unknown stored role, treating as user");
            Role::User
        }),
        None => Role::User,
    };

    let account_status = get_string(fields, "accountStatus").and_then(|raw| {
        raw.parse::<AccountStatus>()
            .map_err(|e| tracing::warn!(uid = %uid, error = %e, "Unknown stored account status"))
            .ok()
    });

    let document_time = |key: &str| {
        document
            .get(key)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc))
    };
    let created_at = get_timestamp(fields, "createdAt")
        .or_else(|| document_time("createTime"))
        .unwrap_or_else(Utc::now);
    let updated_at = get_timestamp(fields, "updatedAt")
        .or_else(|| document_time("updateTime"))
        .unwrap_or(created_at);

    Ok(Profile {
        email: get_string(fields, "email"),
        display_name: get_string(fields, "displayName"),
        photo_url: get_string(fields, "photoURL"),
        nickname: get_string(fields, "nickname"),
        role,
        user_terms_agreed: get_bool(fields, "userTermsAgreed"),
        organizer_terms_agreed: get_bool(fields, "organizerTermsAgreed"),
        account_status,
        account_status_updated_at: get_timestamp(fields, "accountStatusUpdatedAt"),
        identifier_changed_at: get_timestamp(fields, "identifierChangedAt"),
        provider: get_string(fields, "provider"),
        created_at,
        updated_at,
        uid,
    })
}

/// Owner uid stored on a `nicknames/<nickname>` reservation.
pub fn decode_reservation(document: &Value) -> Option<String> {
    document
        .get("fields")
        .and_then(Value::as_object)
        .and_then(|fields| get_string(fields, "uid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_sparse_documents_with_defaults() {
        let document = json!({
            "name": "projects/p/databases/(default)/documents/users/kakao:42",
            "fields": {
                "email": { "nullValue": null },
                "role": { "stringValue": "organizer" },
                "accountStatus": { "stringValue": "disabled" }
            },
            "createTime": "2024-05-01T10:00:00.000000Z",
            "updateTime": "2024-05-02T10:00:00.000000Z"
        });

        let profile = decode_profile(&document).unwrap();
        assert_eq!(profile.uid, "kakao:42");
        assert_eq!(profile.email, None);
        assert_eq!(profile.role, Role::Organizer);
        assert!(!profile.user_terms_agreed);
        assert_eq!(profile.account_status, Some(AccountStatus::Disabled));
        assert!(profile.updated_at > profile.created_at);
    }

    #[test]
    fn update_mask_lists_only_written_fields() {
        let update = ProfileUpdate {
            account_status: Some(AccountStatus::Deleted),
            ..Default::default()
        };
        let (fields, mask) = encode_update(&update, Utc::now());

        assert_eq!(mask, vec!["accountStatus".to_string(), "updatedAt".to_string()]);
        assert_eq!(fields["accountStatus"]["stringValue"], "deleted");
        assert!(!mask.contains(&"nickname".to_string()));
    }

    #[test]
    fn cleared_email_is_written_as_null() {
        let update = ProfileUpdate {
            clear_email: true,
            ..Default::default()
        };
        let (fields, mask) = encode_update(&update, Utc::now());

        assert_eq!(mask, vec!["email".to_string(), "updatedAt".to_string()]);
        assert!(fields["email"].get("nullValue").is_some());
        assert!(fields["email"].get("stringValue").is_none());
    }

    #[test]
    fn encoded_profile_decodes_to_same_role_and_flags() {
        let mut profile = Profile::new("u1", Some("a@example.com".into()), None, None);
        profile.role = Role::Admin;
        profile.user_terms_agreed = true;

        let document = json!({ "fields": Value::Object(encode_profile(&profile)) });
        let decoded = decode_profile(&document).unwrap();

        assert_eq!(decoded.role, Role::Admin);
        assert!(decoded.user_terms_agreed);
        assert_eq!(decoded.email.as_deref(), Some("a@example.com"));
    }
}
