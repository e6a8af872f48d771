use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::profile::{NicknameAvailability, NicknameQuery, SetNicknameRequest, TermsRequest},
    middleware::Caller,
    models::{Profile, ProfileUpdate, Role},
    services::{provisioning::ensure_profile, NicknameClaim},
    utils::{validate_nickname, ValidatedJson},
    AppState,
};

async fn load_profile(state: &AppState, uid: &str) -> Result<Profile, AppError> {
    state
        .backend
        .get_profile(uid)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Profile not found")))
}

pub async fn ensure(State(state): State<AppState>, caller: Caller) -> Result<Json<Profile>, AppError> {
    let profile = ensure_profile(state.backend.as_ref(), &caller.uid).await?;
    Ok(Json(profile))
}

pub async fn me(State(state): State<AppState>, caller: Caller) -> Result<Json<Profile>, AppError> {
    Ok(Json(load_profile(&state, &caller.uid).await?))
}

/// Availability for the caller; their own current nickname counts as available.
pub async fn check_nickname(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<NicknameQuery>,
) -> Result<Json<NicknameAvailability>, AppError> {
    let nickname = query.nickname.trim();
    validate_nickname(nickname)?;

    let owner = state.backend.nickname_owner(nickname).await?;
    let available = owner.map_or(true, |owner| owner == caller.uid);

    Ok(Json(NicknameAvailability { available }))
}

pub async fn set_nickname(
    State(state): State<AppState>,
    caller: Caller,
    ValidatedJson(payload): ValidatedJson<SetNicknameRequest>,
) -> Result<Json<Profile>, AppError> {
    let nickname = payload.nickname.trim();
    validate_nickname(nickname)?;

    match state.backend.claim_nickname(&caller.uid, nickname).await? {
        NicknameClaim::Claimed => {
            tracing::info!(uid = %caller.uid, nickname = %nickname, "Nickname set");
            Ok(Json(load_profile(&state, &caller.uid).await?))
        }
        NicknameClaim::Unavailable => Err(AppError::Conflict(anyhow::anyhow!(
            "Nickname unavailable"
        ))),
    }
}

pub async fn agree_terms(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<TermsRequest>,
) -> Result<Json<Profile>, AppError> {
    if payload.user_terms.is_none() && payload.organizer_terms.is_none() {
        return Err(AppError::BadRequest(anyhow::anyhow!("No terms given")));
    }

    let update = ProfileUpdate {
        user_terms_agreed: payload.user_terms,
        organizer_terms_agreed: payload.organizer_terms,
        ..Default::default()
    };

    let profile = state
        .backend
        .update_profile(&caller.uid, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Profile not found")))?;

    Ok(Json(profile))
}

/// `user` to `organizer_pending`, once the organizer terms are accepted.
pub async fn apply_organizer(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Profile>, AppError> {
    let profile = load_profile(&state, &caller.uid).await?;

    if !profile.organizer_terms_agreed {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Organizer terms must be accepted first"
        )));
    }
    if profile.role != Role::User {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Application not possible with role {}",
            profile.role
        )));
    }

    let update = ProfileUpdate {
        role: Some(Role::OrganizerPending),
        ..Default::default()
    };
    let profile = state
        .backend
        .update_profile(&caller.uid, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Profile not found")))?;

    tracing::info!(uid = %caller.uid, "Organizer application submitted");
    Ok(Json(profile))
}
